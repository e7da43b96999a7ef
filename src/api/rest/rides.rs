use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::acceptance;
use crate::engine::matching::{self, DriverCandidate};
use crate::error::AppError;
use crate::models::ride::{CancelActor, Place, Ride};
use crate::notify::messages;
use crate::registry::rides::{self, RideDraft, RideUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(create_ride))
        .route("/rides/:id", get(get_ride).patch(update_ride))
        .route("/rides/:id/candidates", get(candidates))
        .route("/rides/:id/accept", post(accept))
        .route("/rides/:id/complete", post(complete))
        .route("/rides/:id/cancel", post(cancel))
}

#[derive(Serialize)]
pub struct CreateRideResponse {
    pub ride: Ride,
    /// Nearby available drivers, surfaced to the requester immediately.
    pub candidates: Vec<DriverCandidate>,
}

async fn create_ride(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RideDraft>,
) -> Result<Json<CreateRideResponse>, AppError> {
    let now = Utc::now();
    let ride = rides::create_ride(&state, payload, now)?;
    let candidates = matching::find_drivers_for_ride(&state, ride.id, now)?;

    // Fan out the new-ride offer to every candidate driver.
    for candidate in &candidates {
        state.notify(
            &candidate.driver.contact,
            &messages::new_nearby_ride(&ride, candidate.distance_miles),
        );
    }

    Ok(Json(CreateRideResponse { ride, candidates }))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(rides::get_ride(&state, id)?))
}

#[derive(Deserialize)]
pub struct UpdateRideRequest {
    pub rider_id: Uuid,
    pub pickup: Option<Place>,
    pub dropoff: Option<Place>,
    pub bid: Option<f64>,
    pub ride_time: Option<DateTime<Utc>>,
}

async fn update_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRideRequest>,
) -> Result<Json<Ride>, AppError> {
    let update = RideUpdate {
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        bid: payload.bid,
        ride_time: payload.ride_time,
    };
    let ride = rides::update_ride_details(&state, id, payload.rider_id, update, Utc::now())?;
    Ok(Json(ride))
}

async fn candidates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DriverCandidate>>, AppError> {
    let candidates = matching::find_drivers_for_ride(&state, id, Utc::now())?;
    Ok(Json(candidates))
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub driver_id: Uuid,
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRequest>,
) -> Result<Json<Ride>, AppError> {
    let ride = acceptance::accept_ride(&state, id, payload.driver_id, Utc::now())?;
    Ok(Json(ride))
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    pub driver_id: Uuid,
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteRequest>,
) -> Result<Json<Ride>, AppError> {
    let ride = acceptance::complete_ride(&state, id, payload.driver_id, Utc::now())?;
    Ok(Json(ride))
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub actor_id: Uuid,
    pub role: CancelActor,
    pub reason: String,
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Ride>, AppError> {
    // The system role belongs to the scheduler, not the public surface.
    if payload.role == CancelActor::System {
        return Err(AppError::Validation(
            "role must be rider or driver".to_string(),
        ));
    }

    let ride = acceptance::cancel_ride(
        &state,
        id,
        payload.actor_id,
        payload.role,
        &payload.reason,
        Utc::now(),
    )?;
    Ok(Json(ride))
}
