lazy_static! {
    /// Logging configuration.
    pub static ref RUST_LOG: String = var_or("RUST_LOG", "info");

    /// PostgreSQL connection string. Without it the game runs against an
    /// in-memory store that is lost on exit.
    pub static ref DATABASE_URL: Option<String> = dotenvy::var("DATABASE_URL").ok();

    /// Address the HTTP server listens on.
    pub static ref BIND_ADDRESS: String = var_or("BIND_ADDRESS", "0.0.0.0:3000");

    /// Allowed CORS origins, comma-separated. `*` allows any origin.
    pub static ref CORS_ORIGINS: Vec<String> = var_or("CORS_ORIGIN", "*")
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();

    /// IANA name of the civil timezone the game runs in.
    pub static ref GAME_TIMEZONE: String = var_or("GAME_TIMEZONE", "America/Chicago");

    /// Earliest local time a submission window may open. Format: `HH:MM`
    pub static ref WINDOW_START: String = var_or("WINDOW_START", "04:30");

    /// Latest local time a submission window may open. Format: `HH:MM`
    pub static ref WINDOW_END: String = var_or("WINDOW_END", "08:20");

    /// Number of days of window history to keep.
    pub static ref WINDOW_RETENTION_DAYS: String = var_or("WINDOW_RETENTION_DAYS", "30");

    /// Remaining player count at or below which the game is won.
    pub static ref WIN_THRESHOLD: String = var_or("WIN_THRESHOLD", "3");

    /// Local time of the daily rollover. Format: `HH:MM`
    pub static ref ROLLOVER_TIME: String = var_or("ROLLOVER_TIME", "00:00");
}

fn var_or(key: &str, default: &str) -> String {
    dotenvy::var(key).unwrap_or_else(|_| {
        tracing::debug!("{key} not set, using default: {default}");
        default.to_string()
    })
}
