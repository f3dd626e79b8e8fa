pub mod attempt;
pub mod booking;
pub mod slot;

pub use attempt::{BookingAttempt, FailureReason};
pub use booking::{Booking, BookingStatus};
pub use slot::DaySlot;
