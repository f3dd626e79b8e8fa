use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_id: i64,
    pub slot_date: NaiveDate,
    pub village_id: i64,
    pub status: BookingStatus,
    pub delivery_assistant_id: Option<i64>,
    pub delivered_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// A fresh, unclaimed booking as written at admission time.
    pub fn new(customer_id: i64, village_id: i64, slot_date: NaiveDate, now: NaiveDateTime) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            customer_id,
            slot_date,
            village_id,
            status: BookingStatus::Booked,
            delivery_assistant_id: None,
            delivered_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Booked,
    Delivered,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "booked",
            BookingStatus::Delivered => "delivered",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "delivered" => BookingStatus::Delivered,
            "cancelled" => BookingStatus::Cancelled,
            "expired" => BookingStatus::Expired,
            _ => BookingStatus::Booked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            BookingStatus::Booked,
            BookingStatus::Delivered,
            BookingStatus::Cancelled,
            BookingStatus::Expired,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_new_booking_is_unclaimed() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        let now = day.and_hms_opt(2, 30, 0).unwrap();
        let booking = Booking::new(7, 3, day, now);

        assert_eq!(booking.status, BookingStatus::Booked);
        assert_eq!(booking.delivery_assistant_id, None);
        assert_eq!(booking.created_at, booking.updated_at);
    }
}
