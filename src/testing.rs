//! Fixtures shared by unit tests.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};

use crate::clock::FixedClock;
use crate::config::GameConfig;
use crate::db::{MemoryStore, Rank, SubmissionWindow, User};
use crate::game::scheduler::local_instant;
use crate::{AppResult, AppState};

/// Instant of a civil time in the game's default timezone.
pub fn chicago(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    let date = NaiveDate::from_ymd_opt(year, month, day).expect("bad test date");
    let time = NaiveTime::from_hms_opt(hour, minute, 0).expect("bad test time");
    local_instant(chrono_tz::America::Chicago, date, time).expect("bad test instant")
}

/// Empty in-memory game whose clock reads noon, 2026-10-16, in Chicago.
pub fn test_state() -> (AppState, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(chicago(2026, 10, 16, 12, 0)));
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        clock.clone(),
        GameConfig::default(),
    );
    (state, clock)
}

/// Creates `n` normal users named `player0`, `player1`, ...
pub async fn players(state: &AppState, n: usize) -> AppResult<Vec<User>> {
    let mut users = Vec::with_capacity(n);
    for i in 0..n {
        users.push(state.create_user(&format!("player{i}"), Rank::Normal).await?);
    }
    Ok(users)
}

pub async fn admin(state: &AppState) -> AppResult<User> {
    state.create_user("admin", Rank::Admin).await
}

pub async fn super_admin(state: &AppState) -> AppResult<User> {
    state.create_user("root", Rank::SuperAdmin).await
}

/// Creates a window that opened an hour ago.
pub async fn open_window(state: &AppState) -> AppResult<SubmissionWindow> {
    state
        .store
        .create_window(state.now() - TimeDelta::hours(1), state.now())
        .await
}
