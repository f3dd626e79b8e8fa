use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, FailureReason};
use crate::services::window::BookingWindow;

/// Shown for every rejection whose real cause is kept from the customer.
pub const NETWORK_ERROR_MESSAGE: &str =
    "Network error. Please check your connection and try again.";

/// Why an admission was refused. The audit log always gets the true variant;
/// customers only see it for the first two.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("outside booking window")]
    OutsideWindow,

    #[error("customer already booked today")]
    AlreadyBooked,

    #[error("no free jars left today")]
    CapacityExhausted,

    #[error("reservation lost to a concurrent booking")]
    ConcurrencyLost,

    #[error("system failure: {0:#}")]
    SystemFailure(#[from] anyhow::Error),
}

impl BookingError {
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            BookingError::OutsideWindow => FailureReason::InvalidTime,
            BookingError::AlreadyBooked => FailureReason::AlreadyBooked,
            BookingError::CapacityExhausted => FailureReason::SlotsFull,
            BookingError::ConcurrencyLost => FailureReason::RaceLost,
            BookingError::SystemFailure(_) => FailureReason::SystemError,
        }
    }

    /// Capacity, race and system failures are presented as a connectivity problem.
    pub fn is_masked(&self) -> bool {
        matches!(
            self,
            BookingError::CapacityExhausted
                | BookingError::ConcurrencyLost
                | BookingError::SystemFailure(_)
        )
    }

    pub fn user_message(&self, window: &BookingWindow) -> String {
        match self {
            BookingError::OutsideWindow => format!(
                "Free jar booking is only available at {} each day",
                window.display_time()
            ),
            BookingError::AlreadyBooked => {
                "You have already booked your free jar for today".to_string()
            }
            _ => NETWORK_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Random pause applied before answering a masked rejection.
#[derive(Debug, Clone, Copy)]
pub struct FailureDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl FailureDelay {
    pub fn none() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TodayStatus {
    pub is_window_open: bool,
    pub already_booked: bool,
    pub seconds_until_window: i64,
    pub business_date: NaiveDate,
    pub booking_time: String,
}

pub struct BookingService {
    pub window: BookingWindow,
    pub slots_per_day: i64,
    pub failure_delay: FailureDelay,
}

impl BookingService {
    pub fn new(window: BookingWindow, slots_per_day: i64, failure_delay: FailureDelay) -> Self {
        Self {
            window,
            slots_per_day,
            failure_delay,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        if config.slots_per_day < 0 {
            return Err(AppError::Config(format!(
                "slots per day must not be negative, got {}",
                config.slots_per_day
            )));
        }
        Ok(Self::new(
            BookingWindow::from_config(config)?,
            config.slots_per_day,
            FailureDelay {
                min_ms: config.failure_delay_min_ms,
                max_ms: config.failure_delay_max_ms,
            },
        ))
    }

    /// Runs one admission against the shared connection, then pads masked
    /// rejections with the configured delay. The lock is released before sleeping.
    pub async fn attempt_booking(
        &self,
        db: &Mutex<Connection>,
        customer_id: i64,
        village_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let result = match db.lock() {
            Ok(mut conn) => self.admit(&mut conn, customer_id, village_id, now),
            Err(_) => Err(BookingError::SystemFailure(anyhow::anyhow!(
                "database mutex poisoned"
            ))),
        };

        if let Err(e) = &result {
            if e.is_masked() {
                tokio::time::sleep(self.failure_delay.sample()).await;
            }
        }
        result
    }

    /// Synchronous admission. Every outcome, success included, is appended to the attempt log.
    pub fn admit(
        &self,
        conn: &mut Connection,
        customer_id: i64,
        village_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let day = self.window.business_date(now);
        let outcome = self.try_admit(conn, customer_id, village_id, day, now);

        let failure = outcome.as_ref().err().map(BookingError::failure_reason);
        if let Err(e) = queries::log_attempt(conn, customer_id, day, failure, now.naive_utc()) {
            tracing::warn!(error = %e, customer_id, %day, "failed to record booking attempt");
        }

        match &outcome {
            Ok(booking) => {
                tracing::info!(booking_id = %booking.id, customer_id, village_id, %day, "free jar booked")
            }
            Err(BookingError::SystemFailure(e)) => {
                tracing::error!(error = %e, customer_id, %day, "free jar booking failed")
            }
            Err(e) => {
                tracing::info!(reason = e.failure_reason().as_str(), customer_id, %day, "free jar booking rejected")
            }
        }
        outcome
    }

    fn try_admit(
        &self,
        conn: &mut Connection,
        customer_id: i64,
        village_id: i64,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        if !self.window.is_open(now) {
            return Err(BookingError::OutsideWindow);
        }

        if queries::has_booked_on(conn, customer_id, day)? {
            return Err(BookingError::AlreadyBooked);
        }

        let slot = queries::ensure_day_slot(conn, day, self.slots_per_day)?;
        if !slot.has_room() {
            return Err(BookingError::CapacityExhausted);
        }

        // Reservation and booking row commit together or not at all
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin admission transaction")?;

        if !queries::try_reserve(&tx, day)? {
            return Err(BookingError::ConcurrencyLost);
        }

        let booking = Booking::new(customer_id, village_id, day, now.naive_utc());
        match queries::insert_booking(&tx, &booking) {
            Ok(()) => {}
            Err(e) if queries::is_unique_violation(&e) => return Err(BookingError::AlreadyBooked),
            Err(e) => return Err(anyhow::Error::from(e).context("failed to record booking").into()),
        }

        tx.commit().context("failed to commit admission")?;
        Ok(booking)
    }

    pub fn status_for_today(
        &self,
        conn: &Connection,
        customer_id: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TodayStatus> {
        let day = self.window.business_date(now);
        Ok(TodayStatus {
            is_window_open: self.window.is_open(now),
            already_booked: queries::has_booked_on(conn, customer_id, day)?,
            seconds_until_window: self.window.seconds_until_next(now),
            business_date: day,
            booking_time: self.window.display_time(),
        })
    }

    pub fn history(&self, conn: &Connection, customer_id: i64) -> anyhow::Result<Vec<Booking>> {
        queries::get_bookings_for_customer(conn, customer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::BookingStatus;
    use chrono::{FixedOffset, NaiveDateTime};

    fn service(capacity: i64) -> BookingService {
        BookingService::new(
            BookingWindow::new(8, 0, 1, 330).unwrap(),
            capacity,
            FailureDelay::none(),
        )
    }

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn ist(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_local_timezone(FixedOffset::east_opt(330 * 60).unwrap())
            .unwrap()
            .with_timezone(&Utc)
    }

    fn open_time() -> DateTime<Utc> {
        ist("2025-06-16 08:00:05")
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    fn reasons(conn: &Connection) -> Vec<Option<FailureReason>> {
        let mut all: Vec<_> = queries::get_recent_attempts(conn, None, 1000)
            .unwrap()
            .into_iter()
            .map(|a| a.failure_reason)
            .collect();
        all.reverse();
        all
    }

    #[test]
    fn test_admits_inside_window() {
        let mut conn = setup_db();
        let svc = service(10);

        let booking = svc.admit(&mut conn, 7, 3, open_time()).unwrap();
        assert_eq!(booking.customer_id, 7);
        assert_eq!(booking.village_id, 3);
        assert_eq!(booking.slot_date, day());
        assert_eq!(booking.status, BookingStatus::Booked);

        let slot = queries::get_day_slot(&conn, day()).unwrap().unwrap();
        assert_eq!(slot.reserved, 1);
        assert_eq!(reasons(&conn), vec![None]);
    }

    #[test]
    fn test_outside_window_never_touches_slots() {
        let mut conn = setup_db();
        let svc = service(10);

        for t in ["2025-06-16 07:59:59", "2025-06-16 08:01:00", "2025-06-16 15:00:00"] {
            let err = svc.admit(&mut conn, 7, 3, ist(t)).unwrap_err();
            assert!(matches!(err, BookingError::OutsideWindow));
            assert!(!err.is_masked());
        }

        assert!(queries::get_day_slot(&conn, day()).unwrap().is_none());
        assert_eq!(reasons(&conn), vec![Some(FailureReason::InvalidTime); 3]);
    }

    #[test]
    fn test_second_attempt_same_day_is_already_booked() {
        let mut conn = setup_db();
        let svc = service(10);

        svc.admit(&mut conn, 7, 3, open_time()).unwrap();
        let err = svc.admit(&mut conn, 7, 3, ist("2025-06-16 08:00:40")).unwrap_err();
        assert!(matches!(err, BookingError::AlreadyBooked));

        let slot = queries::get_day_slot(&conn, day()).unwrap().unwrap();
        assert_eq!(slot.reserved, 1);
    }

    #[test]
    fn test_already_booked_wins_over_full_capacity() {
        let mut conn = setup_db();
        let svc = service(1);

        svc.admit(&mut conn, 7, 3, open_time()).unwrap();
        let err = svc.admit(&mut conn, 7, 3, open_time()).unwrap_err();
        assert!(matches!(err, BookingError::AlreadyBooked));
    }

    #[test]
    fn test_full_day_is_masked_as_network_error() {
        let mut conn = setup_db();
        let svc = service(2);

        svc.admit(&mut conn, 1, 3, open_time()).unwrap();
        svc.admit(&mut conn, 2, 3, open_time()).unwrap();
        let err = svc.admit(&mut conn, 3, 3, open_time()).unwrap_err();

        assert!(matches!(err, BookingError::CapacityExhausted));
        assert!(err.is_masked());
        assert_eq!(err.user_message(&svc.window), NETWORK_ERROR_MESSAGE);
        assert_eq!(
            reasons(&conn),
            vec![None, None, Some(FailureReason::SlotsFull)]
        );
    }

    #[test]
    fn test_inactive_day_admits_nobody() {
        let mut conn = setup_db();
        let svc = service(10);
        queries::set_slot_active(&conn, day(), 10, false).unwrap();

        let err = svc.admit(&mut conn, 1, 3, open_time()).unwrap_err();
        assert!(matches!(err, BookingError::CapacityExhausted));
    }

    #[test]
    fn test_new_day_gets_a_fresh_slot() {
        let mut conn = setup_db();
        let svc = service(1);

        svc.admit(&mut conn, 1, 3, open_time()).unwrap();
        svc.admit(&mut conn, 1, 3, ist("2025-06-17 08:00:10")).unwrap();

        assert_eq!(queries::recent_day_slots(&conn, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_cancelled_booking_does_not_free_capacity() {
        let mut conn = setup_db();
        let svc = service(1);

        let booking = svc.admit(&mut conn, 1, 3, open_time()).unwrap();
        queries::close_booking(&conn, &booking.id, BookingStatus::Cancelled, open_time().naive_utc())
            .unwrap();

        let err = svc.admit(&mut conn, 2, 3, open_time()).unwrap_err();
        assert!(matches!(err, BookingError::CapacityExhausted));
    }

    #[test]
    fn test_user_messages() {
        let svc = service(1);
        assert_eq!(
            BookingError::OutsideWindow.user_message(&svc.window),
            "Free jar booking is only available at 8:00 AM each day"
        );
        assert_eq!(
            BookingError::AlreadyBooked.user_message(&svc.window),
            "You have already booked your free jar for today"
        );
        assert_eq!(
            BookingError::ConcurrencyLost.user_message(&svc.window),
            BookingError::CapacityExhausted.user_message(&svc.window)
        );
        assert_eq!(
            BookingError::SystemFailure(anyhow::anyhow!("disk full")).user_message(&svc.window),
            NETWORK_ERROR_MESSAGE
        );
    }

    #[test]
    fn test_status_for_today() {
        let mut conn = setup_db();
        let svc = service(10);

        let before = svc.status_for_today(&conn, 7, ist("2025-06-16 07:59:59")).unwrap();
        assert!(!before.is_window_open);
        assert!(!before.already_booked);
        assert_eq!(before.seconds_until_window, 1);
        assert_eq!(before.booking_time, "8:00 AM");

        svc.admit(&mut conn, 7, 3, open_time()).unwrap();
        let during = svc.status_for_today(&conn, 7, open_time()).unwrap();
        assert!(during.is_window_open);
        assert!(during.already_booked);
        assert_eq!(during.business_date, day());
    }

    #[test]
    fn test_failure_delay_stays_in_range() {
        let delay = FailureDelay { min_ms: 20, max_ms: 40 };
        for _ in 0..50 {
            let d = delay.sample();
            assert!(d >= Duration::from_millis(20) && d <= Duration::from_millis(40));
        }
        assert_eq!(FailureDelay::none().sample(), Duration::ZERO);
    }

    #[test]
    fn test_concurrent_connections_never_over_admit() {
        let path = std::env::temp_dir().join(format!("freejar-{}.db", uuid::Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();
        db::init_db(&path).unwrap();

        let svc = service(10);
        let outcomes: Vec<Result<Booking, BookingError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..50)
                .map(|customer_id| {
                    let svc = &svc;
                    let path = &path;
                    s.spawn(move || {
                        let mut conn = db::open_connection(path).unwrap();
                        svc.admit(&mut conn, customer_id, 1, open_time())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let admitted = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(admitted, 10);
        for err in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            assert!(
                matches!(err, BookingError::CapacityExhausted | BookingError::ConcurrencyLost),
                "unexpected rejection: {err}"
            );
        }

        let conn = db::open_connection(&path).unwrap();
        let slot = queries::get_day_slot(&conn, day()).unwrap().unwrap();
        assert_eq!(slot.reserved, 10);
        assert_eq!(queries::count_live_bookings_on(&conn, day()).unwrap(), 10);
        drop(conn);

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{path}{suffix}"));
        }
    }

    #[test]
    fn test_concurrent_double_submit_by_one_customer() {
        let path = std::env::temp_dir().join(format!("freejar-{}.db", uuid::Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();
        db::init_db(&path).unwrap();

        let svc = service(10);
        let outcomes: Vec<Result<Booking, BookingError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let svc = &svc;
                    let path = &path;
                    s.spawn(move || {
                        let mut conn = db::open_connection(path).unwrap();
                        svc.admit(&mut conn, 42, 1, open_time())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        let conn = db::open_connection(&path).unwrap();
        let slot = queries::get_day_slot(&conn, day()).unwrap().unwrap();
        // Losers roll back, so only the winner's unit is consumed
        assert_eq!(slot.reserved, 1);
        drop(conn);

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{path}{suffix}"));
        }
    }
}
