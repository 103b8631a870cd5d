//! Daily window scheduling and rollover.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use rand::Rng;
use serde::Serialize;

use super::evaluator::EliminationReport;
use crate::config::GameConfig;
use crate::db::SubmissionWindow;
use crate::{AppError, AppResult, AppState};

/// Outcome of one rollover.
#[derive(Serialize, Debug, Clone)]
pub struct RolloverReport {
    /// One report per window evaluated by this rollover, oldest first. Empty
    /// if every opened window had already been evaluated.
    pub evaluations: Vec<EliminationReport>,
    /// Window created by this rollover, if one was needed.
    pub scheduled: Option<SubmissionWindow>,
}

/// Converts a civil date and time in `tz` to an instant.
///
/// Ambiguous times resolve to the earlier instant. Times that do not exist
/// (DST gaps) are shifted forward an hour.
pub fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> AppResult<DateTime<Utc>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + TimeDelta::hours(1)))
                .earliest()
        })
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| AppError::Other(format!("local time {naive} does not exist in {tz}")))
}

/// Civil date of the next window to schedule: today if today's interval has
/// not started yet, otherwise tomorrow.
pub fn next_window_date(config: &GameConfig, now: DateTime<Utc>) -> AppResult<NaiveDate> {
    let today = now.with_timezone(&config.timezone).date_naive();
    if local_instant(config.timezone, today, config.window_start)? > now {
        return Ok(today);
    }
    today
        .succ_opt()
        .ok_or_else(|| AppError::Other(format!("no date after {today}")))
}

/// Picks a uniformly random second inside the daily interval of `date`.
pub fn random_open_time<R: Rng + ?Sized>(
    rng: &mut R,
    config: &GameConfig,
    date: NaiveDate,
) -> AppResult<DateTime<Utc>> {
    let start = local_instant(config.timezone, date, config.window_start)?;
    let end = local_instant(config.timezone, date, config.window_end)?;
    let span = (end - start).num_seconds();
    if span <= 0 {
        return Err(AppError::Configuration(format!(
            "empty window interval on {date}: {start} to {end}"
        )));
    }
    Ok(start + TimeDelta::seconds(rng.gen_range(0..span)))
}

/// Most recent instant, not after `now`, at which the daily rollover should
/// have fired.
pub fn previous_rollover_time(
    config: &GameConfig,
    now: DateTime<Utc>,
) -> AppResult<DateTime<Utc>> {
    let today = now.with_timezone(&config.timezone).date_naive();
    let at_today = local_instant(config.timezone, today, config.rollover_time)?;
    if at_today <= now {
        return Ok(at_today);
    }
    let yesterday = today
        .pred_opt()
        .ok_or_else(|| AppError::Other(format!("no date before {today}")))?;
    local_instant(config.timezone, yesterday, config.rollover_time)
}

/// Next instant at which the daily rollover should fire.
pub fn next_rollover_time(config: &GameConfig, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
    let today = now.with_timezone(&config.timezone).date_naive();
    let at_today = local_instant(config.timezone, today, config.rollover_time)?;
    if at_today > now {
        return Ok(at_today);
    }
    let tomorrow = today
        .succ_opt()
        .ok_or_else(|| AppError::Other(format!("no date after {today}")))?;
    local_instant(config.timezone, tomorrow, config.rollover_time)
}

impl AppState {
    /// Makes sure a window is scheduled in the future, creating one if not.
    ///
    /// Idempotent. Returns the window if one was created.
    pub async fn ensure_next_window(&self) -> AppResult<Option<SubmissionWindow>> {
        let _guard = self.rollover_lock.lock().await;
        self.ensure_next_window_locked().await
    }

    async fn ensure_next_window_locked(&self) -> AppResult<Option<SubmissionWindow>> {
        let now = self.now();
        if let Some(window) = self.store.next_scheduled_window(now).await? {
            tracing::debug!(window_id = %window.id, open_time = %window.open_time, "Next window is already scheduled.");
            return Ok(None);
        }

        let date = next_window_date(&self.config, now)?;
        let open_time = random_open_time(&mut rand::thread_rng(), &self.config, date)?;
        let window = self
            .store
            .create_window(open_time, now)
            .await
            .inspect_err(|e| tracing::error!(%date, error = %e, "Failed to schedule submission window."))?;

        tracing::info!(window_id = %window.id, %open_time, "Scheduled submission window.");

        if let Err(e) = self.prune_old_windows(self.config.retention).await {
            tracing::warn!(error = %e, "Failed to prune old submission windows.");
        }

        Ok(Some(window))
    }

    /// Deletes windows that opened more than `retention` ago, along with
    /// their phrases and verifications.
    pub async fn prune_old_windows(&self, retention: TimeDelta) -> AppResult<u64> {
        let cutoff = self.now() - retention;
        let deleted = self.store.delete_windows_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, %cutoff, "Pruned old submission windows.");
        }
        Ok(deleted)
    }

    /// Closes every opened window that was never evaluated, oldest first,
    /// then makes sure the next window is scheduled.
    ///
    /// Safe to call any number of times a day: a window is only ever
    /// evaluated once, and windows left over from a missed rollover are
    /// evaluated along with the current one. The next window is scheduled
    /// even if evaluation fails.
    pub async fn trigger_daily_rollover(&self) -> AppResult<RolloverReport> {
        let _guard = self.rollover_lock.lock().await;
        tracing::info!("Performing daily rollover ...");

        let evaluations = self.evaluate_windows_opened_by(self.now()).await;
        let scheduled = self.ensure_next_window_locked().await;

        let report = RolloverReport {
            evaluations: evaluations?,
            scheduled: scheduled?,
        };
        tracing::info!("Daily rollover complete.");
        Ok(report)
    }

    /// Evaluates windows whose rollover passed while the process was not
    /// running. Called at startup.
    ///
    /// A window still waiting for the next rollover is left alone, so
    /// restarting during the day does not end the current window early.
    pub async fn evaluate_missed_windows(&self) -> AppResult<Vec<EliminationReport>> {
        let _guard = self.rollover_lock.lock().await;
        let last_rollover = previous_rollover_time(&self.config, self.now())?;
        let reports = self.evaluate_windows_opened_by(last_rollover).await?;
        if !reports.is_empty() {
            tracing::warn!(
                count = reports.len(),
                %last_rollover,
                "Evaluated windows from missed rollovers.",
            );
        }
        Ok(reports)
    }

    /// Evaluates every window that opened at or before `cutoff` and has not
    /// been evaluated yet, oldest first.
    async fn evaluate_windows_opened_by(
        &self,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<EliminationReport>> {
        let pending = self.store.unevaluated_windows(cutoff).await?;
        if pending.is_empty() {
            tracing::info!(%cutoff, "No unevaluated submission window; nothing to evaluate.");
        }

        let mut reports = Vec::with_capacity(pending.len());
        for window in &pending {
            if let Some(report) = self.evaluate_eliminations(window).await? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Fires [`Self::trigger_daily_rollover`] every day at the configured
    /// local time. Never returns.
    pub async fn run_daily_rollover(self) {
        loop {
            let now = self.now();
            let next = next_rollover_time(&self.config, now).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Could not compute next rollover time.");
                now + TimeDelta::days(1)
            });
            tracing::debug!(%next, "Waiting for next rollover.");
            tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;

            if let Err(e) = self.trigger_daily_rollover().await {
                tracing::error!(error = %e, "Daily rollover failed; retrying at the next tick.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;
    use proptest::prelude::*;
    use rand::SeedableRng;

    use super::*;
    use crate::db::Rank;
    use crate::testing::{chicago, test_state};

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn next_window_is_today_before_interval() {
        let config = GameConfig::default();
        let midnight = chicago(2026, 10, 17, 0, 0);
        assert_eq!(
            next_window_date(&config, midnight).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
        );
        let noon = chicago(2026, 10, 17, 12, 0);
        assert_eq!(
            next_window_date(&config, noon).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
        );
        let at_start = chicago(2026, 10, 17, 4, 30);
        assert_eq!(
            next_window_date(&config, at_start).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
        );
    }

    #[test]
    fn local_instant_skips_dst_gap() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let t = local_instant(chrono_tz::America::Chicago, date, time(2, 30)).unwrap();
        let local = t.with_timezone(&chrono_tz::America::Chicago);
        assert_eq!((local.hour(), local.minute()), (3, 30));
    }

    #[test]
    fn rollover_fires_at_next_local_midnight() {
        let config = GameConfig::default();
        let now = chicago(2026, 10, 16, 12, 0);
        assert_eq!(
            next_rollover_time(&config, now).unwrap(),
            chicago(2026, 10, 17, 0, 0)
        );
        let midnight = chicago(2026, 10, 17, 0, 0);
        assert_eq!(
            next_rollover_time(&config, midnight).unwrap(),
            chicago(2026, 10, 18, 0, 0)
        );
    }

    proptest! {
        #[test]
        fn open_time_is_inside_interval(seed: u64, day in 0u64..730) {
            let config = GameConfig::default();
            let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Days::new(day);
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let open_time = random_open_time(&mut rng, &config, date).unwrap();
            let local = open_time.with_timezone(&config.timezone);
            prop_assert_eq!(local.date_naive(), date);
            prop_assert!(local.time() >= config.window_start);
            prop_assert!(local.time() < config.window_end);
        }
    }

    #[tokio::test]
    async fn ensure_next_window_is_idempotent() -> AppResult {
        let (state, _clock) = test_state();

        let created = state.ensure_next_window().await?;
        let window = created.expect("a window should be created");
        assert!(window.open_time > state.now());

        for _ in 0..5 {
            assert_eq!(state.ensure_next_window().await?, None);
        }
        assert_eq!(state.store.scheduled_windows(state.now()).await?, vec![window]);
        Ok(())
    }

    #[tokio::test]
    async fn ensure_next_window_heals_after_window_opens() -> AppResult {
        let (state, clock) = test_state();
        let first = state.ensure_next_window().await?.unwrap();

        clock.set(first.open_time + TimeDelta::minutes(1));
        let second = state.ensure_next_window().await?.unwrap();
        assert!(second.open_time > first.open_time);
        assert_eq!(
            state.current_window().await?.map(|w| w.id),
            Some(first.id)
        );
        Ok(())
    }

    #[tokio::test]
    async fn prunes_windows_past_retention() -> AppResult {
        let (state, clock) = test_state();
        let now = state.now();
        let old = state.store.create_window(now - TimeDelta::days(40), now).await?;
        let recent = state.store.create_window(now - TimeDelta::days(2), now).await?;

        assert_eq!(state.prune_old_windows(TimeDelta::days(30)).await?, 1);
        assert_eq!(state.store.get_window(old.id).await?, None);
        assert!(state.store.get_window(recent.id).await?.is_some());

        clock.advance(TimeDelta::days(29));
        assert_eq!(state.prune_old_windows(TimeDelta::days(30)).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn midnight_rollover_evaluates_and_schedules_same_day() -> AppResult {
        let (state, clock) = test_state();
        let players = crate::testing::players(&state, 2).await?;

        clock.set(chicago(2026, 10, 16, 6, 0));
        let window = state
            .store
            .create_window(chicago(2026, 10, 16, 5, 0), state.now())
            .await?;
        state.verify(&players[0], players[1].id).await?;

        clock.set(chicago(2026, 10, 17, 0, 0));
        let report = state.trigger_daily_rollover().await?;

        assert_eq!(report.evaluations.len(), 1);
        let evaluation = &report.evaluations[0];
        assert_eq!(evaluation.window_id, window.id);
        assert_eq!(evaluation.eliminated, vec![players[0].to_public()]);

        let scheduled = report.scheduled.expect("next window should be scheduled");
        let local = scheduled.open_time.with_timezone(&state.config.timezone);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());

        // Duplicate trigger is harmless.
        let again = state.trigger_daily_rollover().await?;
        assert!(again.evaluations.is_empty());
        assert!(again.scheduled.is_none());
        assert!(state.store.get_user(players[1].id).await?.is_some_and(|u| !u.eliminated));
        Ok(())
    }

    #[tokio::test]
    async fn rollover_without_any_window_only_schedules() -> AppResult {
        let (state, _clock) = test_state();
        state.create_user("alice", Rank::Normal).await?;

        let report = state.trigger_daily_rollover().await?;
        assert!(report.evaluations.is_empty());
        assert!(report.scheduled.is_some());
        assert!(state.store.list_users().await?.iter().all(|u| !u.eliminated));
        Ok(())
    }

    #[test]
    fn previous_rollover_is_last_local_midnight() {
        let config = GameConfig::default();
        assert_eq!(
            previous_rollover_time(&config, chicago(2026, 10, 17, 10, 0)).unwrap(),
            chicago(2026, 10, 17, 0, 0)
        );
        assert_eq!(
            previous_rollover_time(&config, chicago(2026, 10, 17, 0, 0)).unwrap(),
            chicago(2026, 10, 17, 0, 0)
        );
    }

    #[tokio::test]
    async fn scheduled_window_records_creation_time() -> AppResult {
        let (state, _clock) = test_state();
        let window = state.ensure_next_window().await?.unwrap();
        assert_eq!(window.created_at, state.now());
        Ok(())
    }

    /// Window W1 opens on 10/16 and the process is down over midnight. It
    /// restarts at 10:00 on 10/17, after W2 has opened.
    async fn restart_after_missed_midnight(
        state: &AppState,
        clock: &crate::clock::FixedClock,
    ) -> AppResult<(Vec<crate::db::User>, SubmissionWindow, SubmissionWindow)> {
        let players = crate::testing::players(state, 3).await?;

        clock.set(chicago(2026, 10, 16, 6, 0));
        let first = state
            .store
            .create_window(chicago(2026, 10, 16, 5, 0), state.now())
            .await?;
        state.verify(&players[0], players[1].id).await?;
        state.verify(&players[1], players[2].id).await?;

        clock.set(chicago(2026, 10, 17, 10, 0));
        let second = state
            .store
            .create_window(chicago(2026, 10, 17, 5, 0), state.now())
            .await?;
        Ok((players, first, second))
    }

    #[tokio::test]
    async fn rollover_evaluates_windows_left_by_missed_trigger() -> AppResult {
        let (state, clock) = test_state();
        let (players, first, second) = restart_after_missed_midnight(&state, &clock).await?;
        state.verify(&players[1], players[2].id).await?;

        clock.set(chicago(2026, 10, 18, 0, 0));
        let report = state.trigger_daily_rollover().await?;

        let evaluated: Vec<_> = report.evaluations.iter().map(|r| r.window_id).collect();
        assert_eq!(evaluated, vec![first.id, second.id]);
        assert_eq!(report.evaluations[0].eliminated, vec![players[0].to_public()]);
        assert_eq!(report.evaluations[1].eliminated, vec![players[1].to_public()]);
        assert!(state.store.get_window(first.id).await?.unwrap().evaluated_at.is_some());
        assert!(state.store.unevaluated_windows(state.now()).await?.is_empty());

        let again = state.trigger_daily_rollover().await?;
        assert!(again.evaluations.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn startup_evaluates_only_overdue_windows() -> AppResult {
        let (state, clock) = test_state();
        let (players, first, second) = restart_after_missed_midnight(&state, &clock).await?;

        let reports = state.evaluate_missed_windows().await?;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].window_id, first.id);
        assert_eq!(reports[0].eliminated, vec![players[0].to_public()]);

        // Today's window keeps accepting verifications until midnight.
        assert_eq!(state.current_window().await?.map(|w| w.id), Some(second.id));
        state.verify(&players[1], players[2].id).await?;
        assert!(state.evaluate_missed_windows().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn startup_after_missed_midnight_closes_current_window() -> AppResult {
        let (state, clock) = test_state();
        let players = crate::testing::players(&state, 2).await?;

        clock.set(chicago(2026, 10, 16, 6, 0));
        let window = state
            .store
            .create_window(chicago(2026, 10, 16, 5, 0), state.now())
            .await?;
        state.verify(&players[0], players[1].id).await?;

        // Down over midnight, back up before the next window opens.
        clock.set(chicago(2026, 10, 17, 2, 0));
        let reports = state.evaluate_missed_windows().await?;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].window_id, window.id);
        assert!(matches!(
            state.verify(&players[1], players[0].id).await,
            Err(AppError::NotOpen)
        ));
        Ok(())
    }
}
