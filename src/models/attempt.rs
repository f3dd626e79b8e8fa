use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Audit row for one call to the booking endpoint. Written, never read by admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingAttempt {
    pub id: i64,
    pub customer_id: i64,
    pub slot_date: NaiveDate,
    pub success: bool,
    pub failure_reason: Option<FailureReason>,
    pub attempted_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidTime,
    AlreadyBooked,
    SlotsFull,
    RaceLost,
    SystemError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InvalidTime => "invalid_time",
            FailureReason::AlreadyBooked => "already_booked",
            FailureReason::SlotsFull => "slots_full",
            FailureReason::RaceLost => "race_lost",
            FailureReason::SystemError => "system_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invalid_time" => Some(FailureReason::InvalidTime),
            "already_booked" => Some(FailureReason::AlreadyBooked),
            "slots_full" => Some(FailureReason::SlotsFull),
            "race_lost" => Some(FailureReason::RaceLost),
            "system_error" => Some(FailureReason::SystemError),
            _ => None,
        }
    }
}
