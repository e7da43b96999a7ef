use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::matching::{self, OpenRideMatch};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Availability, Driver};
use crate::models::ride::Ride;
use crate::registry::{availability, rides, roster};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver))
        .route("/drivers/:id", get(get_driver).delete(delete_driver))
        .route(
            "/drivers/:id/availability",
            put(set_available)
                .get(get_availability)
                .delete(set_unavailable),
        )
        .route("/drivers/:id/matches", get(matches))
        .route("/drivers/:id/rides", get(ride_history))
        .route("/drivers/:id/stats", get(stats))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
    pub contact: String,
    pub vehicle: String,
}

#[derive(Deserialize)]
pub struct SetAvailableRequest {
    pub location: GeoPoint,
    pub radius_miles: f64,
    pub duration_hours: Option<f64>,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = roster::register_driver(
        &state,
        payload.name,
        payload.contact,
        payload.vehicle,
        Utc::now(),
    )?;
    Ok(Json(driver))
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(roster::get_driver(&state, id)?))
}

async fn delete_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    roster::delete_driver(&state, id, Utc::now())?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn set_available(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetAvailableRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = availability::set_available(
        &state,
        id,
        payload.location,
        payload.radius_miles,
        payload.duration_hours,
        Utc::now(),
    )?;
    Ok(Json(driver))
}

async fn set_unavailable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = availability::set_unavailable(&state, id, Utc::now())?;
    Ok(Json(driver))
}

async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<Availability>>, AppError> {
    Ok(Json(availability::get_open_availability(
        &state,
        id,
        Utc::now(),
    )?))
}

async fn matches(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OpenRideMatch>>, AppError> {
    let matches = matching::find_matches_for_driver_availability(&state, id, Utc::now())?;
    Ok(Json(matches))
}

async fn ride_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Ride>>, AppError> {
    roster::get_driver(&state, id)?;
    Ok(Json(rides::rides_for_driver(&state, id)))
}

async fn stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<rides::ActorStats>, AppError> {
    roster::get_driver(&state, id)?;
    Ok(Json(rides::stats_for_driver(&state, id)))
}
