// Local trip store
// SQLite-backed waypoints and routes with GeoJSON import/export

pub mod db;
pub mod exchange;
pub mod models;
pub mod queries;
pub mod storage;

pub use db::{StoreError, StoreResult, TripStore, SCHEMA_VERSION};
pub use exchange::{
    export_routes, export_routes_in_background, export_waypoints,
    export_waypoints_in_background, import_routes, import_waypoints, routes_to_geojson,
    waypoints_to_geojson, ExportJob, ImportSummary,
};
pub use models::{NewWaypoint, Patch, Route, TrackPoint, Waypoint, WaypointPatch};
pub use queries::{
    add_route, add_waypoint, clear_all_routes, clear_all_waypoints, delete_route,
    delete_waypoint, get_route_by_id, get_saved_routes, get_saved_waypoints, get_waypoint_by_id,
    update_route_name, update_waypoint,
};
pub use storage::{
    app_data_dir, default_database_path, delete_database, get_storage_estimate, StorageError,
    StorageEstimate, StorageResult,
};
