use chrono::{NaiveTime, TimeDelta};
use chrono_tz::Tz;

use crate::{AppError, AppResult};

/// Rules of the game that are fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Civil timezone that defines "a day".
    pub timezone: Tz,
    /// Earliest local time a window may open (inclusive).
    pub window_start: NaiveTime,
    /// Latest local time a window may open (exclusive).
    pub window_end: NaiveTime,
    /// Windows that opened longer ago than this are pruned.
    pub retention: TimeDelta,
    /// The game is won once this many or fewer players remain.
    pub win_threshold: usize,
    /// Local time at which the daily rollover fires.
    pub rollover_time: NaiveTime,
}

impl GameConfig {
    pub fn new(
        timezone: Tz,
        window_start: NaiveTime,
        window_end: NaiveTime,
        retention_days: i64,
        win_threshold: usize,
        rollover_time: NaiveTime,
    ) -> AppResult<Self> {
        if window_end <= window_start {
            return Err(AppError::Configuration(format!(
                "window end {window_end} must be after window start {window_start}"
            )));
        }
        if retention_days < 0 {
            return Err(AppError::Configuration(format!(
                "retention must not be negative, got {retention_days} days"
            )));
        }
        Ok(Self {
            timezone,
            window_start,
            window_end,
            retention: TimeDelta::days(retention_days),
            win_threshold,
            rollover_time,
        })
    }

    /// Loads the configuration from the process environment.
    pub fn from_env() -> AppResult<Self> {
        use crate::env;

        let timezone = env::GAME_TIMEZONE.parse::<Tz>().map_err(|e| {
            AppError::Configuration(format!("invalid GAME_TIMEZONE {:?}: {e}", *env::GAME_TIMEZONE))
        })?;
        Self::new(
            timezone,
            parse_time("WINDOW_START", &env::WINDOW_START)?,
            parse_time("WINDOW_END", &env::WINDOW_END)?,
            parse_number("WINDOW_RETENTION_DAYS", &env::WINDOW_RETENTION_DAYS)?,
            parse_number("WIN_THRESHOLD", &env::WIN_THRESHOLD)?,
            parse_time("ROLLOVER_TIME", &env::ROLLOVER_TIME)?,
        )
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::Chicago,
            window_start: NaiveTime::from_hms_opt(4, 30, 0).unwrap_or_default(),
            window_end: NaiveTime::from_hms_opt(8, 20, 0).unwrap_or_default(),
            retention: TimeDelta::days(30),
            win_threshold: 3,
            rollover_time: NaiveTime::MIN,
        }
    }
}

fn parse_time(key: &str, value: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| AppError::Configuration(format!("invalid {key} {value:?}: {e}")))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> AppResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::Configuration(format!("invalid {key} {value:?}: {e}")))
}
