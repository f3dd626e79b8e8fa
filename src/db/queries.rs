use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Booking, BookingAttempt, BookingStatus, DaySlot, FailureReason};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| format!("invalid stored date: {s}"))
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .with_context(|| format!("invalid stored timestamp: {s}"))
}

// ── Day Slots ──

/// Returns the slot for `date`, inserting it with `capacity` if no row exists yet.
/// Concurrent first callers race on the primary key; the loser's insert is a no-op.
pub fn ensure_day_slot(conn: &Connection, date: NaiveDate, capacity: i64) -> anyhow::Result<DaySlot> {
    conn.execute(
        "INSERT INTO day_slots (slot_date, capacity) VALUES (?1, ?2)
         ON CONFLICT(slot_date) DO NOTHING",
        params![fmt_date(date), capacity],
    )?;

    get_day_slot(conn, date)?.with_context(|| format!("day slot {date} missing after insert"))
}

pub fn get_day_slot(conn: &Connection, date: NaiveDate) -> anyhow::Result<Option<DaySlot>> {
    let row = conn
        .query_row(
            "SELECT slot_date, capacity, reserved, active FROM day_slots WHERE slot_date = ?1",
            params![fmt_date(date)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i32>(3)? != 0,
                ))
            },
        )
        .optional()?;

    match row {
        Some((slot_date, capacity, reserved, active)) => Ok(Some(DaySlot {
            slot_date: parse_date(&slot_date)?,
            capacity,
            reserved,
            active,
        })),
        None => Ok(None),
    }
}

/// Takes one unit of the day's capacity in a single conditional update.
/// Returns false when the slot is full, inactive or missing; nothing is written then.
pub fn try_reserve(conn: &Connection, date: NaiveDate) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE day_slots
         SET reserved = reserved + 1, updated_at = datetime('now')
         WHERE slot_date = ?1 AND active = 1 AND reserved < capacity",
        params![fmt_date(date)],
    )?;
    Ok(count == 1)
}

pub fn set_slot_active(
    conn: &Connection,
    date: NaiveDate,
    default_capacity: i64,
    active: bool,
) -> anyhow::Result<DaySlot> {
    ensure_day_slot(conn, date, default_capacity)?;
    conn.execute(
        "UPDATE day_slots SET active = ?1, updated_at = datetime('now') WHERE slot_date = ?2",
        params![active as i32, fmt_date(date)],
    )?;
    get_day_slot(conn, date)?.with_context(|| format!("day slot {date} vanished"))
}

pub fn recent_day_slots(conn: &Connection, limit: i64) -> anyhow::Result<Vec<DaySlot>> {
    let mut stmt = conn.prepare(
        "SELECT slot_date, capacity, reserved, active FROM day_slots
         ORDER BY slot_date DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i32>(3)? != 0,
        ))
    })?;

    let mut slots = vec![];
    for row in rows {
        let (slot_date, capacity, reserved, active) = row?;
        slots.push(DaySlot {
            slot_date: parse_date(&slot_date)?,
            capacity,
            reserved,
            active,
        });
    }
    Ok(slots)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, customer_id, slot_date, village_id, status, delivery_assistant_id, delivered_at, notes, created_at, updated_at";

pub fn has_booked_on(conn: &Connection, customer_id: i64, date: NaiveDate) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE customer_id = ?1 AND slot_date = ?2 AND status IN ('booked', 'delivered')",
        params![customer_id, fmt_date(date)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_booking(conn: &Connection, booking: &Booking) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO bookings (id, customer_id, slot_date, village_id, status, delivery_assistant_id, delivered_at, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            booking.id,
            booking.customer_id,
            fmt_date(booking.slot_date),
            booking.village_id,
            booking.status.as_str(),
            booking.delivery_assistant_id,
            booking.delivered_at.map(fmt_ts),
            booking.notes,
            fmt_ts(booking.created_at),
            fmt_ts(booking.updated_at),
        ],
    )?;
    Ok(())
}

/// True when the error is the store refusing a second live booking for the same customer and day.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    match result {
        Some(booking) => Ok(Some(booking?)),
        None => Ok(None),
    }
}

/// Every booking a customer ever made, newest day first.
pub fn get_bookings_for_customer(conn: &Connection, customer_id: i64) -> anyhow::Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE customer_id = ?1
             ORDER BY slot_date DESC, created_at DESC"
        ),
        params![customer_id],
    )
}

pub fn get_unclaimed_bookings(conn: &Connection) -> anyhow::Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE status = 'booked' AND delivery_assistant_id IS NULL
             ORDER BY slot_date DESC, created_at DESC"
        ),
        params![],
    )
}

pub fn get_bookings_for_assistant(conn: &Connection, assistant_id: i64) -> anyhow::Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE delivery_assistant_id = ?1
             ORDER BY slot_date DESC, created_at DESC"
        ),
        params![assistant_id],
    )
}

/// Unclaimed bookings plus the ones this assistant already holds, newest first.
pub fn get_assistant_worklist(conn: &Connection, assistant_id: i64) -> anyhow::Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE delivery_assistant_id = ?1
                OR (status = 'booked' AND delivery_assistant_id IS NULL)
             ORDER BY slot_date DESC, created_at DESC"
        ),
        params![assistant_id],
    )
}

pub fn get_all_bookings(
    conn: &Connection,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    match status_filter {
        Some(status) => query_bookings(
            conn,
            &format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1
                 ORDER BY slot_date DESC, created_at DESC LIMIT ?2"
            ),
            params![status.as_str(), limit],
        ),
        None => query_bookings(
            conn,
            &format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 ORDER BY slot_date DESC, created_at DESC LIMIT ?1"
            ),
            params![limit],
        ),
    }
}

pub fn count_live_bookings_on(conn: &Connection, date: NaiveDate) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE slot_date = ?1 AND status IN ('booked', 'delivered')",
        params![fmt_date(date)],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Sets the assistant on an unclaimed, still-booked entry. False if any precondition failed.
pub fn claim_booking(
    conn: &Connection,
    id: &str,
    assistant_id: i64,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET delivery_assistant_id = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'booked' AND delivery_assistant_id IS NULL",
        params![assistant_id, fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn mark_delivered(
    conn: &Connection,
    id: &str,
    assistant_id: i64,
    notes: Option<&str>,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings
         SET status = 'delivered', delivered_at = ?1, notes = ?2, updated_at = ?1
         WHERE id = ?3 AND delivery_assistant_id = ?4 AND status = 'booked'",
        params![fmt_ts(now), notes, id, assistant_id],
    )?;
    Ok(count > 0)
}

/// Moves a booking out of `booked`. Reserved capacity is not returned to the day.
pub fn close_booking(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'booked'",
        params![status.as_str(), fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn expire_bookings_before(
    conn: &Connection,
    date: NaiveDate,
    now: NaiveDateTime,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'expired', updated_at = ?1
         WHERE status = 'booked' AND slot_date < ?2",
        params![fmt_ts(now), fmt_date(date)],
    )?;
    Ok(count)
}

fn query_bookings<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let id: String = row.get(0)?;
    let customer_id: i64 = row.get(1)?;
    let slot_date_str: String = row.get(2)?;
    let village_id: i64 = row.get(3)?;
    let status_str: String = row.get(4)?;
    let delivery_assistant_id: Option<i64> = row.get(5)?;
    let delivered_at_str: Option<String> = row.get(6)?;
    let notes: Option<String> = row.get(7)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(Booking {
        id,
        customer_id,
        slot_date: parse_date(&slot_date_str)?,
        village_id,
        status: BookingStatus::parse(&status_str),
        delivery_assistant_id,
        delivered_at: delivered_at_str.as_deref().map(parse_ts).transpose()?,
        notes,
        created_at: parse_ts(&created_at_str)?,
        updated_at: parse_ts(&updated_at_str)?,
    })
}

// ── Booking Attempts ──

pub fn log_attempt(
    conn: &Connection,
    customer_id: i64,
    date: NaiveDate,
    failure: Option<FailureReason>,
    at: NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO booking_attempts (customer_id, slot_date, success, failure_reason, attempted_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            customer_id,
            fmt_date(date),
            failure.is_none() as i32,
            failure.map(|r| r.as_str()),
            fmt_ts(at),
        ],
    )?;
    Ok(())
}

pub fn get_recent_attempts(
    conn: &Connection,
    date: Option<NaiveDate>,
    limit: i64,
) -> anyhow::Result<Vec<BookingAttempt>> {
    let mut stmt = conn.prepare(
        "SELECT id, customer_id, slot_date, success, failure_reason, attempted_at
         FROM booking_attempts
         WHERE ?1 IS NULL OR slot_date = ?1
         ORDER BY id DESC LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![date.map(fmt_date), limit], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i32>(3)? != 0,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut attempts = vec![];
    for row in rows {
        let (id, customer_id, slot_date, success, reason, attempted_at) = row?;
        attempts.push(BookingAttempt {
            id,
            customer_id,
            slot_date: parse_date(&slot_date)?,
            success,
            failure_reason: reason.as_deref().and_then(FailureReason::parse),
            attempted_at: parse_ts(&attempted_at)?,
        });
    }
    Ok(attempts)
}
