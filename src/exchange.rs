// GeoJSON import and export for waypoints and routes
use chrono::Utc;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::mpsc;
use std::thread;

use crate::db::{StoreError, StoreResult, TripStore};
use crate::models::{NewWaypoint, Route, TrackPoint, Waypoint};
use crate::queries::{get_saved_routes, get_saved_waypoints, insert_route, insert_waypoint};

// ==================== GEOJSON PROJECTION ====================

/// Build a `[lon, lat]` or `[lon, lat, alt]` coordinate array.
fn waypoint_coords(waypoint: &Waypoint) -> Vec<f64> {
    match waypoint.altitude {
        Some(alt) if alt.is_finite() => vec![waypoint.longitude, waypoint.latitude, alt],
        _ => vec![waypoint.longitude, waypoint.latitude],
    }
}

fn insert_optional(props: &mut Map<String, JsonValue>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        props.insert(key.to_string(), JsonValue::String(v.clone()));
    }
}

fn waypoint_to_feature(waypoint: &Waypoint) -> Feature {
    let geometry = Geometry::new(Value::Point(waypoint_coords(waypoint)));

    let mut props = Map::new();
    props.insert("id".to_string(), JsonValue::Number(waypoint.id.into()));
    props.insert("name".to_string(), JsonValue::String(waypoint.name.clone()));
    props.insert(
        "createdAt".to_string(),
        JsonValue::Number(waypoint.created_at.into()),
    );
    if let Some(number) = waypoint.altitude.and_then(serde_json::Number::from_f64) {
        props.insert("altitude".to_string(), JsonValue::Number(number));
    }
    insert_optional(&mut props, "notes", &waypoint.notes);
    insert_optional(&mut props, "imageDataUrl", &waypoint.image_data_url);

    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn route_to_feature(route: &Route) -> Feature {
    let coords: Vec<Vec<f64>> = route.geometry.iter().map(TrackPoint::to_position).collect();
    let geometry = Geometry::new(Value::LineString(coords));

    let mut props = Map::new();
    props.insert("name".to_string(), JsonValue::String(route.name.clone()));
    props.insert(
        "createdAt".to_string(),
        JsonValue::Number(route.created_at.into()),
    );

    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

/// Project waypoints onto a FeatureCollection of Point features.
///
/// Absent optional fields are omitted from the properties, never emitted
/// as null placeholders.
pub fn waypoints_to_geojson(waypoints: &[Waypoint]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: waypoints.iter().map(waypoint_to_feature).collect(),
        foreign_members: None,
    }
}

/// Project routes onto a FeatureCollection of LineString features.
pub fn routes_to_geojson(routes: &[Route]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: routes.iter().map(route_to_feature).collect(),
        foreign_members: None,
    }
}

// ==================== EXPORT ====================

/// Export every stored waypoint as GeoJSON text.
pub fn export_waypoints(store: &TripStore) -> StoreResult<String> {
    let waypoints = get_saved_waypoints(store)?;
    Ok(serde_json::to_string(&waypoints_to_geojson(&waypoints))?)
}

/// Export every stored route as GeoJSON text.
pub fn export_routes(store: &TripStore) -> StoreResult<String> {
    let routes = get_saved_routes(store)?;
    Ok(serde_json::to_string(&routes_to_geojson(&routes))?)
}

// ==================== IMPORT ====================

/// Outcome of an import: features that became records vs features skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Pull the features array out of a FeatureCollection document.
/// Anything else is `MalformedInput` and aborts the whole import.
fn parse_feature_collection(text: &str) -> StoreResult<Vec<JsonValue>> {
    let document: JsonValue = serde_json::from_str(text)
        .map_err(|e| StoreError::MalformedInput(format!("not valid JSON: {e}")))?;

    let mut object = match document {
        JsonValue::Object(object) => object,
        _ => {
            return Err(StoreError::MalformedInput(
                "top level must be a FeatureCollection object".to_string(),
            ))
        }
    };

    if object.get("type").and_then(JsonValue::as_str) != Some("FeatureCollection") {
        return Err(StoreError::MalformedInput(
            "top level must be a FeatureCollection object".to_string(),
        ));
    }

    match object.remove("features") {
        Some(JsonValue::Array(features)) => Ok(features),
        _ => Err(StoreError::MalformedInput(
            "FeatureCollection has no features array".to_string(),
        )),
    }
}

/// Validate one position array from untrusted input.
fn parse_position(value: &JsonValue) -> Option<TrackPoint> {
    let coords: Vec<f64> = value
        .as_array()?
        .iter()
        .map(JsonValue::as_f64)
        .collect::<Option<Vec<f64>>>()?;

    TrackPoint::from_position(&coords)
}

fn waypoint_from_feature(feature: &JsonValue) -> Option<NewWaypoint> {
    if feature.get("type").and_then(JsonValue::as_str) != Some("Feature") {
        return None;
    }

    let geometry = feature.get("geometry")?;
    if geometry.get("type").and_then(JsonValue::as_str) != Some("Point") {
        return None;
    }
    let position = parse_position(geometry.get("coordinates")?)?;

    let props = feature.get("properties").and_then(JsonValue::as_object);
    let prop = |key: &str| props.and_then(|p| p.get(key));

    Some(NewWaypoint {
        name: prop("name")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
        latitude: position.latitude,
        longitude: position.longitude,
        // Third coordinate wins over an altitude property
        altitude: position
            .altitude
            .or_else(|| prop("altitude").and_then(JsonValue::as_f64)),
        notes: prop("notes").and_then(JsonValue::as_str).map(String::from),
        image_data_url: prop("imageDataUrl")
            .and_then(JsonValue::as_str)
            .map(String::from),
    })
}

struct RouteDraft {
    name: String,
    geometry: Vec<TrackPoint>,
    created_at: Option<i64>,
}

fn route_from_feature(feature: &JsonValue) -> Option<RouteDraft> {
    if feature.get("type").and_then(JsonValue::as_str) != Some("Feature") {
        return None;
    }

    let geometry = feature.get("geometry")?;
    if geometry.get("type").and_then(JsonValue::as_str) != Some("LineString") {
        return None;
    }

    // Positions that fail validation are dropped from the path, not fatal
    let points: Vec<TrackPoint> = geometry
        .get("coordinates")?
        .as_array()?
        .iter()
        .filter_map(parse_position)
        .collect();

    let props = feature.get("properties").and_then(JsonValue::as_object);

    Some(RouteDraft {
        name: props
            .and_then(|p| p.get("name"))
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
        geometry: points,
        created_at: props
            .and_then(|p| p.get("createdAt"))
            .and_then(JsonValue::as_i64),
    })
}

/// Import waypoints from GeoJSON text.
///
/// Features that are not valid Point features are skipped and counted,
/// never fatal. Imported waypoints get fresh ids and creation times.
/// The whole import runs in one transaction.
pub fn import_waypoints(store: &TripStore, text: &str) -> StoreResult<ImportSummary> {
    let features = parse_feature_collection(text)?;

    let mut summary = ImportSummary::default();
    let mut conn = store.lock();
    let tx = conn.transaction()?;

    for feature in &features {
        match waypoint_from_feature(feature) {
            Some(draft) => {
                insert_waypoint(&tx, &draft, Utc::now().timestamp_millis())?;
                summary.imported += 1;
            }
            None => {
                log::debug!("skipping feature without a usable Point geometry");
                summary.skipped += 1;
            }
        }
    }

    tx.commit()?;
    log::info!(
        "imported {} waypoints ({} skipped)",
        summary.imported,
        summary.skipped
    );
    Ok(summary)
}

/// Import routes from GeoJSON text.
///
/// Features that are not valid LineString features are skipped and
/// counted. A `createdAt` property is preserved so imported routes keep
/// their historical ordering; routes without one are stamped with now.
pub fn import_routes(store: &TripStore, text: &str) -> StoreResult<ImportSummary> {
    let features = parse_feature_collection(text)?;

    let mut summary = ImportSummary::default();
    let mut conn = store.lock();
    let tx = conn.transaction()?;

    for feature in &features {
        match route_from_feature(feature) {
            Some(draft) => {
                let created_at = draft
                    .created_at
                    .unwrap_or_else(|| Utc::now().timestamp_millis());
                insert_route(&tx, &draft.name, &draft.geometry, created_at)?;
                summary.imported += 1;
            }
            None => {
                log::debug!("skipping feature without a usable LineString geometry");
                summary.skipped += 1;
            }
        }
    }

    tx.commit()?;
    log::info!(
        "imported {} routes ({} skipped)",
        summary.imported,
        summary.skipped
    );
    Ok(summary)
}

// ==================== BACKGROUND EXPORT ====================

/// Handle for an export running on a background thread.
pub struct ExportJob {
    receiver: mpsc::Receiver<StoreResult<String>>,
}

impl ExportJob {
    /// Check if the export is complete (non-blocking).
    pub fn try_recv(&self) -> Option<StoreResult<String>> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the export to complete (blocking).
    pub fn recv(self) -> StoreResult<String> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(
                "export worker exited without a result".to_string(),
            )),
        }
    }
}

fn spawn_export<F>(store: &TripStore, export: F) -> ExportJob
where
    F: Fn(&TripStore) -> StoreResult<String> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let worker_store = store.clone();

    thread::spawn(move || {
        let result = match worker_store.path() {
            // File-backed: open a second connection so the caller's handle
            // stays free while the export runs
            Some(path) => TripStore::open(path).and_then(|own| export(&own)),
            // In-memory databases are per-connection; share the handle
            None => export(&worker_store),
        };

        if let Err(e) = &result {
            log::warn!("background export failed: {e}");
        }
        tx.send(result).ok();
    });

    ExportJob { receiver: rx }
}

/// Export waypoints on a background thread.
pub fn export_waypoints_in_background(store: &TripStore) -> ExportJob {
    spawn_export(store, export_waypoints)
}

/// Export routes on a background thread.
pub fn export_routes_in_background(store: &TripStore) -> ExportJob {
    spawn_export(store, export_routes)
}
