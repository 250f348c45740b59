use std::env;

const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub session_ttl_hours: i64,
    /// Enables `POST /api/auth/session`, which signs in as any user by id.
    pub dev_mode: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "homeserve.db".to_string()),
            session_ttl_hours: parse_ttl_hours(env::var("SESSION_TTL_HOURS").ok().as_deref()),
            dev_mode: env::var("DEV_MODE")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS))
            .unwrap_or_else(|| chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS))
    }
}

/// Positive hours, capped at a year. Anything unparsable falls back to a week.
fn parse_ttl_hours(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|h| *h > 0)
        .map(|h| h.min(MAX_SESSION_TTL_HOURS))
        .unwrap_or(DEFAULT_SESSION_TTL_HOURS)
}
