// CRUD operations for waypoints and routes
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::db::{StoreError, StoreResult, TripStore};
use crate::models::{NewWaypoint, Route, TrackPoint, Waypoint, WaypointPatch};

// ==================== WAYPOINT QUERIES ====================

fn waypoint_from_row(row: &Row<'_>) -> rusqlite::Result<Waypoint> {
    Ok(Waypoint {
        id: row.get(0)?,
        name: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        altitude: row.get(4)?,
        notes: row.get(5)?,
        image_data_url: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub(crate) fn insert_waypoint(
    conn: &Connection,
    draft: &NewWaypoint,
    created_at: i64,
) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO waypoints (name, latitude, longitude, altitude, notes, image_data_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            draft.name,
            draft.latitude,
            draft.longitude,
            draft.altitude,
            draft.notes,
            draft.image_data_url,
            created_at,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Add a waypoint and return its assigned id.
pub fn add_waypoint(store: &TripStore, draft: NewWaypoint) -> StoreResult<i64> {
    let conn = store.lock();
    insert_waypoint(&conn, &draft, Utc::now().timestamp_millis())
}

/// All waypoints, newest first.
pub fn get_saved_waypoints(store: &TripStore) -> StoreResult<Vec<Waypoint>> {
    let conn = store.lock();
    let mut stmt = conn.prepare(
        "SELECT id, name, latitude, longitude, altitude, notes, image_data_url, created_at
         FROM waypoints
         ORDER BY created_at DESC, id DESC",
    )?;

    let waypoints = stmt
        .query_map([], waypoint_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(waypoints)
}

/// Get a waypoint by id.
pub fn get_waypoint_by_id(store: &TripStore, id: i64) -> StoreResult<Option<Waypoint>> {
    let conn = store.lock();
    let mut stmt = conn.prepare(
        "SELECT id, name, latitude, longitude, altitude, notes, image_data_url, created_at
         FROM waypoints WHERE id = ?1",
    )?;

    let result = stmt.query_row([id], waypoint_from_row);

    match result {
        Ok(waypoint) => Ok(Some(waypoint)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Apply a partial update and return the stored result.
///
/// Position and creation time never change; fails with `NotFound` if the
/// id does not exist. Runs as one transaction so a concurrent delete
/// cannot leave a half-written record.
pub fn update_waypoint(store: &TripStore, id: i64, patch: WaypointPatch) -> StoreResult<Waypoint> {
    let mut conn = store.lock();
    let tx = conn.transaction()?;

    let result = tx.query_row(
        "SELECT id, name, latitude, longitude, altitude, notes, image_data_url, created_at
         FROM waypoints WHERE id = ?1",
        [id],
        waypoint_from_row,
    );

    let existing = match result {
        Ok(waypoint) => waypoint,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Err(StoreError::NotFound(id)),
        Err(e) => return Err(e.into()),
    };

    let updated = Waypoint {
        id: existing.id,
        name: patch.name.unwrap_or(existing.name),
        latitude: existing.latitude,
        longitude: existing.longitude,
        altitude: patch.altitude.apply(existing.altitude),
        notes: patch.notes.apply(existing.notes),
        image_data_url: patch.image_data_url.apply(existing.image_data_url),
        created_at: existing.created_at,
    };

    tx.execute(
        "UPDATE waypoints SET name = ?1, altitude = ?2, notes = ?3, image_data_url = ?4
         WHERE id = ?5",
        params![
            updated.name,
            updated.altitude,
            updated.notes,
            updated.image_data_url,
            updated.id,
        ],
    )?;

    tx.commit()?;
    Ok(updated)
}

/// Delete a waypoint; deleting an unknown id is a no-op.
pub fn delete_waypoint(store: &TripStore, id: i64) -> StoreResult<()> {
    let conn = store.lock();
    conn.execute("DELETE FROM waypoints WHERE id = ?1", [id])?;
    Ok(())
}

/// Remove every waypoint.
pub fn clear_all_waypoints(store: &TripStore) -> StoreResult<()> {
    let conn = store.lock();
    conn.execute("DELETE FROM waypoints", [])?;
    Ok(())
}

// ==================== ROUTE QUERIES ====================

fn route_from_row(row: &Row<'_>) -> rusqlite::Result<Route> {
    let geometry_json: String = row.get(2)?;
    let geometry = serde_json::from_str(&geometry_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Route {
        id: row.get(0)?,
        name: row.get(1)?,
        geometry,
        created_at: row.get(3)?,
    })
}

pub(crate) fn insert_route(
    conn: &Connection,
    name: &str,
    geometry: &[TrackPoint],
    created_at: i64,
) -> StoreResult<i64> {
    let geometry_json = serde_json::to_string(geometry)?;
    conn.execute(
        "INSERT INTO routes (name, geometry, created_at) VALUES (?1, ?2, ?3)",
        params![name, geometry_json, created_at],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Add a route and return its assigned id. Empty names and empty
/// geometry are allowed.
pub fn add_route(store: &TripStore, name: &str, geometry: &[TrackPoint]) -> StoreResult<i64> {
    let conn = store.lock();
    insert_route(&conn, name, geometry, Utc::now().timestamp_millis())
}

/// All routes, newest first.
pub fn get_saved_routes(store: &TripStore) -> StoreResult<Vec<Route>> {
    let conn = store.lock();
    let mut stmt = conn.prepare(
        "SELECT id, name, geometry, created_at
         FROM routes
         ORDER BY created_at DESC, id DESC",
    )?;

    let routes = stmt
        .query_map([], route_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(routes)
}

/// Get a route by id.
pub fn get_route_by_id(store: &TripStore, id: i64) -> StoreResult<Option<Route>> {
    let conn = store.lock();
    let mut stmt = conn.prepare(
        "SELECT id, name, geometry, created_at
         FROM routes WHERE id = ?1",
    )?;

    let result = stmt.query_row([id], route_from_row);

    match result {
        Ok(route) => Ok(Some(route)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Rename a route; geometry and creation time are immutable.
pub fn update_route_name(store: &TripStore, id: i64, name: &str) -> StoreResult<()> {
    let conn = store.lock();
    let changed = conn.execute(
        "UPDATE routes SET name = ?1 WHERE id = ?2",
        params![name, id],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

/// Delete a route; deleting an unknown id is a no-op.
pub fn delete_route(store: &TripStore, id: i64) -> StoreResult<()> {
    let conn = store.lock();
    conn.execute("DELETE FROM routes WHERE id = ?1", [id])?;
    Ok(())
}

/// Remove every route.
pub fn clear_all_routes(store: &TripStore) -> StoreResult<()> {
    let conn = store.lock();
    conn.execute("DELETE FROM routes", [])?;
    Ok(())
}
