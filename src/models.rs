// Data models for the trip store
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data_url: Option<String>,
    pub created_at: i64,
}

/// Input for `add_waypoint`; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWaypoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub notes: Option<String>,
    pub image_data_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: i64,
    pub name: String,
    pub geometry: Vec<TrackPoint>,
    pub created_at: i64,
}

/// One position on a route path. Serializes as a GeoJSON position array:
/// `[longitude, latitude]` or `[longitude, latitude, altitude]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: Option<f64>,
}

impl TrackPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude: None,
        }
    }

    pub fn with_altitude(longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude: Some(altitude),
        }
    }

    /// Build a `[lon, lat]` or `[lon, lat, alt]` position array.
    pub fn to_position(&self) -> Vec<f64> {
        match self.altitude {
            Some(alt) if alt.is_finite() => vec![self.longitude, self.latitude, alt],
            _ => vec![self.longitude, self.latitude],
        }
    }

    /// Read a position array; needs at least two finite coordinates.
    /// A non-finite third element is treated as no altitude.
    pub fn from_position(coords: &[f64]) -> Option<Self> {
        match coords {
            [lon, lat, rest @ ..] if lon.is_finite() && lat.is_finite() => Some(Self {
                longitude: *lon,
                latitude: *lat,
                altitude: rest.first().copied().filter(|alt| alt.is_finite()),
            }),
            _ => None,
        }
    }
}

impl Serialize for TrackPoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_position().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TrackPoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let coords = Vec::<f64>::deserialize(deserializer)?;
        TrackPoint::from_position(&coords).ok_or_else(|| {
            serde::de::Error::invalid_length(coords.len(), &"a [longitude, latitude] position")
        })
    }
}

/// Tri-state field update: keep the stored value, clear it, or set a new one.
#[derive(Debug, Clone)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Keep => current,
            Patch::Clear => None,
            Patch::Set(value) => Some(value),
        }
    }
}

/// Partial update for a waypoint's mutable fields. Fields left at their
/// defaults keep the stored values; `id`, position and `created_at` can
/// never be changed.
#[derive(Debug, Clone, Default)]
pub struct WaypointPatch {
    pub name: Option<String>,
    pub altitude: Patch<f64>,
    pub notes: Patch<String>,
    pub image_data_url: Patch<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_apply() {
        assert_eq!(Patch::Keep.apply(Some(1.5)), Some(1.5));
        assert_eq!(Patch::<f64>::Keep.apply(None), None);
        assert_eq!(Patch::Clear.apply(Some(1.5)), None);
        assert_eq!(Patch::Set(2.5).apply(Some(1.5)), Some(2.5));
        assert_eq!(Patch::Set(2.5).apply(None), Some(2.5));
    }

    #[test]
    fn test_track_point_serde() {
        let flat = TrackPoint::new(-74.0445, 40.6892);
        assert_eq!(serde_json::to_string(&flat).unwrap(), "[-74.0445,40.6892]");

        let with_alt = TrackPoint::with_altitude(-74.0445, 40.6892, 93.0);
        assert_eq!(
            serde_json::to_string(&with_alt).unwrap(),
            "[-74.0445,40.6892,93.0]"
        );

        let parsed: TrackPoint = serde_json::from_str("[-74.0445,40.6892,93.0]").unwrap();
        assert_eq!(parsed, with_alt);
    }

    #[test]
    fn test_track_point_needs_two_coordinates() {
        assert!(serde_json::from_str::<TrackPoint>("[]").is_err());
        assert!(serde_json::from_str::<TrackPoint>("[-74.0445]").is_err());
        assert!(TrackPoint::from_position(&[]).is_none());
        assert!(TrackPoint::from_position(&[1.0]).is_none());
        assert!(TrackPoint::from_position(&[f64::NAN, 2.0]).is_none());
    }

    #[test]
    fn test_from_position_drops_non_finite_altitude() {
        let point = TrackPoint::from_position(&[9.49, 46.85, f64::INFINITY]).unwrap();
        assert_eq!(point.longitude, 9.49);
        assert_eq!(point.latitude, 46.85);
        assert_eq!(point.altitude, None);
    }

    #[test]
    fn test_waypoint_serializes_camel_case_without_absent_fields() {
        let waypoint = Waypoint {
            id: 1,
            name: "Pier".to_string(),
            latitude: 40.7,
            longitude: -74.0,
            altitude: None,
            notes: None,
            image_data_url: None,
            created_at: 1_700_000_000_000,
        };

        let value = serde_json::to_value(&waypoint).unwrap();
        assert_eq!(value["createdAt"], 1_700_000_000_000_i64);
        assert!(value.get("altitude").is_none());
        assert!(value.get("imageDataUrl").is_none());
    }
}
