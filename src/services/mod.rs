pub mod booking;
pub mod clock;
pub mod delivery;
pub mod window;
