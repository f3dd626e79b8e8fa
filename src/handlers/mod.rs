pub mod admin;
pub mod assistant;
pub mod customer;
pub mod health;

use serde::Serialize;

use crate::models::Booking;

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    id: String,
    customer_id: i64,
    date: String,
    village_id: i64,
    status: String,
    delivery_assistant_id: Option<i64>,
    delivered_at: Option<String>,
    notes: Option<String>,
    created_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            customer_id: b.customer_id,
            date: b.slot_date.format("%Y-%m-%d").to_string(),
            village_id: b.village_id,
            status: b.status.as_str().to_string(),
            delivery_assistant_id: b.delivery_assistant_id,
            delivered_at: b
                .delivered_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            notes: b.notes,
            created_at: b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub(crate) fn to_responses(bookings: Vec<Booking>) -> Vec<BookingResponse> {
    bookings.into_iter().map(BookingResponse::from).collect()
}
