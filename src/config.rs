use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub booking_hour: u32,
    pub booking_minute: u32,
    pub booking_window_minutes: u32,
    pub utc_offset_minutes: i32,
    pub slots_per_day: i64,
    pub failure_delay_min_ms: u64,
    pub failure_delay_max_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "freejar.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            booking_hour: parsed("FREE_JAR_HOUR", 8),
            booking_minute: parsed("FREE_JAR_MINUTE", 0),
            booking_window_minutes: parsed("FREE_JAR_WINDOW_MINUTES", 1),
            // Asia/Kolkata
            utc_offset_minutes: parsed("BUSINESS_UTC_OFFSET_MINUTES", 330),
            slots_per_day: parsed("FREE_JAR_SLOTS_PER_DAY", 10),
            failure_delay_min_ms: parsed("FREE_JAR_FAILURE_DELAY_MIN_MS", 2000),
            failure_delay_max_ms: parsed("FREE_JAR_FAILURE_DELAY_MAX_MS", 5000),
        }
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("invalid {key} value {raw:?}, using default");
            default
        }),
        Err(_) => default,
    }
}
