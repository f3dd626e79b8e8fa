use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus};

/// Booked entries nobody has claimed yet.
pub fn pending_for_assistants(conn: &Connection) -> anyhow::Result<Vec<Booking>> {
    queries::get_unclaimed_bookings(conn)
}

pub fn my_assignments(conn: &Connection, assistant_id: i64) -> anyhow::Result<Vec<Booking>> {
    queries::get_bookings_for_assistant(conn, assistant_id)
}

/// What an assistant's free-jar tab shows: open entries plus their own.
pub fn worklist(conn: &Connection, assistant_id: i64) -> anyhow::Result<Vec<Booking>> {
    queries::get_assistant_worklist(conn, assistant_id)
}

pub fn claim(
    conn: &Connection,
    booking_id: &str,
    assistant_id: i64,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    if queries::claim_booking(conn, booking_id, assistant_id, now)? {
        tracing::info!(booking_id, assistant_id, "free jar claimed");
        return load(conn, booking_id);
    }

    let booking = load(conn, booking_id)?;
    if booking.status != BookingStatus::Booked {
        return Err(AppError::Conflict(format!(
            "booking is already {}",
            booking.status.as_str()
        )));
    }
    Err(AppError::Conflict(
        "booking is already claimed by another assistant".to_string(),
    ))
}

pub fn mark_delivered(
    conn: &Connection,
    booking_id: &str,
    assistant_id: i64,
    notes: Option<&str>,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    if queries::mark_delivered(conn, booking_id, assistant_id, notes, now)? {
        tracing::info!(booking_id, assistant_id, "free jar delivered");
        return load(conn, booking_id);
    }

    let booking = load(conn, booking_id)?;
    if booking.delivery_assistant_id != Some(assistant_id) {
        return Err(AppError::Conflict(
            "booking is not assigned to this assistant".to_string(),
        ));
    }
    Err(AppError::Conflict(format!(
        "booking is already {}",
        booking.status.as_str()
    )))
}

/// Administrative cancel. The day's reserved count is left as is.
pub fn cancel(conn: &Connection, booking_id: &str, now: NaiveDateTime) -> Result<Booking, AppError> {
    if queries::close_booking(conn, booking_id, BookingStatus::Cancelled, now)? {
        tracing::info!(booking_id, "free jar booking cancelled");
        return load(conn, booking_id);
    }

    let booking = load(conn, booking_id)?;
    Err(AppError::Conflict(format!(
        "only booked entries can be cancelled, this one is {}",
        booking.status.as_str()
    )))
}

/// Expires every undelivered booking from days before `today`.
pub fn expire_stale(conn: &Connection, today: NaiveDate, now: NaiveDateTime) -> anyhow::Result<usize> {
    let count = queries::expire_bookings_before(conn, today, now)?;
    if count > 0 {
        tracing::info!(count, %today, "expired undelivered free jar bookings");
    }
    Ok(count)
}

fn load(conn: &Connection, booking_id: &str) -> Result<Booking, AppError> {
    queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}
