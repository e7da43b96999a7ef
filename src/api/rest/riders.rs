use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ride::Ride;
use crate::models::rider::Rider;
use crate::registry::rides;
use crate::registry::roster::{self, RiderProfileUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", post(register_rider))
        .route(
            "/riders/:id",
            get(get_rider).patch(update_profile).delete(delete_rider),
        )
        .route("/riders/:id/rides", get(ride_history))
        .route("/riders/:id/stats", get(stats))
        .route("/riders/:id/rides/:ride_id", delete(delete_open_ride))
}

#[derive(Deserialize)]
pub struct RegisterRiderRequest {
    pub name: String,
    pub contact: String,
}

async fn register_rider(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRiderRequest>,
) -> Result<Json<Rider>, AppError> {
    let rider = roster::register_rider(&state, payload.name, payload.contact, Utc::now())?;
    Ok(Json(rider))
}

async fn get_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    Ok(Json(roster::get_rider(&state, id)?))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RiderProfileUpdate>,
) -> Result<Json<Rider>, AppError> {
    let rider = roster::update_rider_profile(&state, id, payload, Utc::now())?;
    Ok(Json(rider))
}

async fn delete_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    roster::delete_rider(&state, id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn ride_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Ride>>, AppError> {
    roster::get_rider(&state, id)?;
    Ok(Json(rides::rides_for_rider(&state, id)))
}

async fn stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<rides::ActorStats>, AppError> {
    roster::get_rider(&state, id)?;
    Ok(Json(rides::stats_for_rider(&state, id)))
}

async fn delete_open_ride(
    State(state): State<Arc<AppState>>,
    Path((id, ride_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, AppError> {
    rides::delete_open_ride(&state, ride_id, id)?;
    Ok(Json(serde_json::json!({ "deleted": ride_id })))
}
