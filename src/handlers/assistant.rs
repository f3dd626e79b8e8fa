use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::delivery;
use crate::state::AppState;

use super::{to_responses, BookingResponse};

// GET /api/assistant/:assistant_id/free-jars
pub async fn get_free_jars(
    State(state): State<Arc<AppState>>,
    Path(assistant_id): Path<i64>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let bookings = {
        let db = state.conn()?;
        delivery::worklist(&db, assistant_id)?
    };
    Ok(Json(to_responses(bookings)))
}

// POST /api/free-jar/bookings/:id/claim
#[derive(Deserialize)]
pub struct ClaimRequest {
    pub assistant_id: i64,
}

pub async fn claim_free_jar(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ClaimRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let now = state.clock.now().naive_utc();
    let db = state.conn()?;
    let booking = delivery::claim(&db, &id, body.assistant_id, now)?;
    Ok(Json(booking.into()))
}

// POST /api/free-jar/bookings/:id/deliver
#[derive(Deserialize)]
pub struct DeliverRequest {
    pub assistant_id: i64,
    pub notes: Option<String>,
}

pub async fn deliver_free_jar(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<DeliverRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let now = state.clock.now().naive_utc();
    let db = state.conn()?;
    let booking = delivery::mark_delivered(
        &db,
        &id,
        body.assistant_id,
        body.notes.as_deref().filter(|n| !n.trim().is_empty()),
        now,
    )?;
    Ok(Json(booking.into()))
}
