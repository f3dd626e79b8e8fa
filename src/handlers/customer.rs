use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::services::booking::{BookingError, TodayStatus};
use crate::state::AppState;

use super::{to_responses, BookingResponse};

// POST /api/free-jar/book
#[derive(Deserialize)]
pub struct BookRequest {
    pub customer_id: i64,
    pub village_id: i64,
}

#[derive(Serialize)]
pub struct BookResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    booking: Option<BookingResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    transient_failure: bool,
}

pub async fn book_free_jar(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BookRequest>,
) -> Response {
    let now = state.clock.now();
    let result = state
        .booking
        .attempt_booking(&state.db, body.customer_id, body.village_id, now)
        .await;

    match result {
        Ok(booking) => (
            StatusCode::CREATED,
            Json(BookResponse {
                success: true,
                booking: Some(booking.into()),
                error: None,
                transient_failure: false,
            }),
        )
            .into_response(),
        Err(e) => {
            let status = match &e {
                BookingError::OutsideWindow => StatusCode::FORBIDDEN,
                BookingError::AlreadyBooked => StatusCode::CONFLICT,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            };
            (
                status,
                Json(BookResponse {
                    success: false,
                    booking: None,
                    error: Some(e.user_message(&state.booking.window)),
                    transient_failure: e.is_masked(),
                }),
            )
                .into_response()
        }
    }
}

// GET /api/free-jar/status/:customer_id
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<i64>,
) -> Result<Json<TodayStatus>, AppError> {
    let now = state.clock.now();
    let db = state.conn()?;
    let status = state.booking.status_for_today(&db, customer_id, now)?;
    Ok(Json(status))
}

// GET /api/free-jar/history/:customer_id
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<i64>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let bookings = {
        let db = state.conn()?;
        state.booking.history(&db, customer_id)?
    };
    Ok(Json(to_responses(bookings)))
}
