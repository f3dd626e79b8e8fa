use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The pool of free jars offered on one business day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySlot {
    pub slot_date: NaiveDate,
    pub capacity: i64,
    pub reserved: i64,
    pub active: bool,
}

impl DaySlot {
    pub fn has_room(&self) -> bool {
        self.active && self.reserved < self.capacity
    }

    pub fn remaining(&self) -> i64 {
        (self.capacity - self.reserved).max(0)
    }
}
