use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingAttempt, BookingStatus, DaySlot};
use crate::services::delivery;
use crate::state::AppState;

use super::{to_responses, BookingResponse};

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid date: {raw}")))
}

// GET /api/admin/attempts
#[derive(Deserialize)]
pub struct AttemptsQuery {
    pub date: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_attempts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AttemptsQuery>,
) -> Result<Json<Vec<BookingAttempt>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let date = query.date.as_deref().map(parse_date).transpose()?;
    let limit = query.limit.unwrap_or(100);

    let attempts = {
        let db = state.conn()?;
        queries::get_recent_attempts(&db, date, limit)?
    };
    Ok(Json(attempts))
}

// GET /api/admin/slots
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct SlotResponse {
    date: String,
    capacity: i64,
    reserved: i64,
    remaining: i64,
    active: bool,
}

impl From<DaySlot> for SlotResponse {
    fn from(s: DaySlot) -> Self {
        Self {
            date: s.slot_date.format("%Y-%m-%d").to_string(),
            capacity: s.capacity,
            reserved: s.reserved,
            remaining: s.remaining(),
            active: s.active,
        }
    }
}

pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<SlotResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let slots = {
        let db = state.conn()?;
        queries::recent_day_slots(&db, query.limit.unwrap_or(30))?
    };
    Ok(Json(slots.into_iter().map(SlotResponse::from).collect()))
}

// POST /api/admin/slots/:date/active
#[derive(Deserialize)]
pub struct SlotActiveRequest {
    pub active: bool,
}

pub async fn set_slot_active(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(raw_date): Path<String>,
    Json(body): Json<SlotActiveRequest>,
) -> Result<Json<SlotResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let date = parse_date(&raw_date)?;
    let slot = {
        let db = state.conn()?;
        queries::set_slot_active(&db, date, state.booking.slots_per_day, body.active)?
    };
    tracing::info!(%date, active = body.active, "free jar day toggled");
    Ok(Json(slot.into()))
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50);
    let status_filter = query.status.as_deref().map(BookingStatus::parse);

    let bookings = {
        let db = state.conn()?;
        queries::get_all_bookings(&db, status_filter, limit)?
    };
    Ok(Json(to_responses(bookings)))
}

// POST /api/admin/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = state.clock.now().naive_utc();
    let db = state.conn()?;
    let booking = delivery::cancel(&db, &id, now)?;
    Ok(Json(booking.into()))
}

// POST /api/admin/expire-bookings
pub async fn expire_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = state.clock.now();
    let today = state.booking.window.business_date(now);
    let expired = {
        let db = state.conn()?;
        delivery::expire_stale(&db, today, now.naive_utc())?
    };
    Ok(Json(serde_json::json!({ "ok": true, "expired": expired })))
}
