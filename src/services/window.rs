use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};

use crate::config::AppConfig;
use crate::errors::AppError;

/// The daily interval, in business-local wall-clock time, during which free jars can be booked.
///
/// The window never spans an hour boundary: `minute + duration_minutes <= 60`.
#[derive(Debug, Clone, Copy)]
pub struct BookingWindow {
    hour: u32,
    minute: u32,
    duration_minutes: u32,
    start: NaiveTime,
    offset: FixedOffset,
}

impl BookingWindow {
    pub fn new(
        hour: u32,
        minute: u32,
        duration_minutes: u32,
        utc_offset_minutes: i32,
    ) -> Result<Self, AppError> {
        if duration_minutes == 0 {
            return Err(AppError::Config(
                "booking window must last at least one minute".to_string(),
            ));
        }
        if minute + duration_minutes > 60 {
            return Err(AppError::Config(format!(
                "booking window {hour:02}:{minute:02} + {duration_minutes}m crosses the hour"
            )));
        }
        let start = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            AppError::Config(format!("invalid booking time {hour:02}:{minute:02}"))
        })?;
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            AppError::Config(format!("invalid UTC offset: {utc_offset_minutes} minutes"))
        })?;

        Ok(Self {
            hour,
            minute,
            duration_minutes,
            start,
            offset,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.booking_hour,
            config.booking_minute,
            config.booking_window_minutes,
            config.utc_offset_minutes,
        )
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        local.hour() == self.hour
            && local.minute() >= self.minute
            && local.minute() < self.minute + self.duration_minutes
    }

    /// Whole seconds until the next window start. At or after today's start this is tomorrow's.
    pub fn seconds_until_next(&self, now: DateTime<Utc>) -> i64 {
        let local = now.with_timezone(&self.offset).naive_local();
        let today_start = local.date().and_time(self.start);

        let next_start = if local < today_start {
            today_start
        } else {
            today_start + Duration::days(1)
        };
        (next_start - local).num_seconds()
    }

    /// The calendar day `now` falls on in the business timezone.
    pub fn business_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Window start as shown to customers, e.g. `8:00 AM`.
    pub fn display_time(&self) -> String {
        let hour12 = match self.hour {
            0 => 12,
            h if h > 12 => h - 12,
            h => h,
        };
        let ampm = if self.hour >= 12 { "PM" } else { "AM" };
        format!("{hour12}:{:02} {ampm}", self.minute)
    }
}
