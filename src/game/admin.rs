//! Account management and admin overrides.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::scheduler::RolloverReport;
use crate::db::{
    PublicUser, Rank, SubmissionWindow, Token, User, UserId, UserStatistics, WindowId,
};
use crate::{AppError, AppResult, AppState};

const MAX_USERNAME_LEN: usize = 32;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserStatus {
    #[serde(flatten)]
    pub user: PublicUser,
    pub rank: Rank,
    pub eliminated: bool,
}

impl From<&User> for UserStatus {
    fn from(user: &User) -> Self {
        Self {
            user: user.to_public(),
            rank: user.rank,
            eliminated: user.eliminated,
        }
    }
}

impl AppState {
    pub async fn create_user(&self, name: &str, rank: Rank) -> AppResult<User> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_USERNAME_LEN {
            return Err(AppError::InvalidInput(format!(
                "Username must be between 1 and {MAX_USERNAME_LEN} characters"
            )));
        }
        let user = self.store.create_user(name, rank, self.now()).await?;
        tracing::info!(user_id = %user.id, name, ?rank, "Created user.");
        Ok(user)
    }

    pub async fn user_status(&self, id: UserId) -> AppResult<UserStatus> {
        let user = self.get_user(id).await?;
        Ok(UserStatus::from(&user))
    }

    async fn get_user(&self, id: UserId) -> AppResult<User> {
        self.store.get_user(id).await?.ok_or(AppError::NotFound("User"))
    }

    pub async fn find_user_by_name(&self, name: &str) -> AppResult<User> {
        let name = name.trim();
        self.store
            .list_users()
            .await?
            .into_iter()
            .find(|u| u.name == name)
            .ok_or(AppError::NotFound("User"))
    }

    /// Issues a new sign-in token for an existing user, for players who
    /// signed out or whose token expired.
    ///
    /// Admins cannot sign in as someone of higher rank.
    pub async fn issue_token(&self, editor: &User, id: UserId) -> AppResult<(User, Token)> {
        editor.require_rank(Rank::Admin)?;
        let user = self.get_user(id).await?;
        editor.require_rank(user.rank)?;

        let token = self.create_token(user.id).await?;
        tracing::info!(editor_id = %editor.id, user_id = %user.id, expiry = %token.expiry, "Issued sign-in token.");
        Ok((user, token))
    }

    /// Returns the windows that have not opened yet, soonest first.
    pub async fn scheduled_windows(&self, editor: &User) -> AppResult<Vec<SubmissionWindow>> {
        editor.require_rank(Rank::Admin)?;
        self.store.scheduled_windows(self.now()).await
    }

    pub async fn cancel_scheduled_window(&self, editor: &User, id: WindowId) -> AppResult {
        editor.require_rank(Rank::Admin)?;
        let now = self.now();

        let window = self
            .store
            .get_window(id)
            .await?
            .ok_or(AppError::NotFound("Submission window"))?;
        if window.has_opened(now) || !self.store.delete_scheduled_window(id, now).await? {
            return Err(AppError::WindowAlreadyOpen);
        }

        tracing::info!(editor_id = %editor.id, window_id = %id, "Cancelled scheduled window.");
        Ok(())
    }

    /// Replaces every scheduled window with one opening at `open_time`.
    pub async fn manual_reset(
        &self,
        editor: &User,
        open_time: DateTime<Utc>,
    ) -> AppResult<SubmissionWindow> {
        editor.require_rank(Rank::Admin)?;

        let _guard = self.rollover_lock.lock().await;
        let now = self.now();
        if open_time <= now {
            return Err(AppError::InvalidInput(
                "Open time must be in the future".to_string(),
            ));
        }
        let window = self.store.replace_scheduled_windows(now, open_time).await?;

        tracing::info!(editor_id = %editor.id, window_id = %window.id, %open_time, "Manually reset schedule.");
        Ok(window)
    }

    pub async fn trigger_rollover(&self, editor: &User) -> AppResult<RolloverReport> {
        editor.require_rank(Rank::Admin)?;
        tracing::info!(editor_id = %editor.id, "Rollover triggered manually.");
        self.trigger_daily_rollover().await
    }

    pub async fn eliminate_user(&self, editor: &User, id: UserId) -> AppResult<UserStatus> {
        self.set_eliminated(editor, id, true).await
    }

    pub async fn resurrect_user(&self, editor: &User, id: UserId) -> AppResult<UserStatus> {
        self.set_eliminated(editor, id, false).await
    }

    async fn set_eliminated(
        &self,
        editor: &User,
        id: UserId,
        eliminated: bool,
    ) -> AppResult<UserStatus> {
        editor.require_rank(Rank::Admin)?;
        if !self.store.set_user_eliminated(id, eliminated).await? {
            return Err(AppError::NotFound("User"));
        }
        tracing::info!(editor_id = %editor.id, user_id = %id, eliminated, "Changed elimination status.");
        self.user_status(id).await
    }

    pub async fn user_statistics(&self, editor: &User) -> AppResult<Vec<UserStatistics>> {
        editor.require_rank(Rank::Admin)?;
        self.store.user_statistics().await
    }

    pub async fn promote_user(&self, editor: &User, id: UserId) -> AppResult<UserStatus> {
        editor.require_rank(Rank::SuperAdmin)?;
        let target = self.get_user(id).await?;
        if target.rank == Rank::SuperAdmin {
            return Err(AppError::Forbidden);
        }
        self.set_rank(editor, target.id, Rank::Admin).await
    }

    pub async fn demote_user(&self, editor: &User, id: UserId) -> AppResult<UserStatus> {
        editor.require_rank(Rank::SuperAdmin)?;
        let target = self.get_user(id).await?;
        match target.rank {
            Rank::SuperAdmin => return Err(AppError::Forbidden),
            Rank::Admin if self.store.count_users_with_rank(Rank::Admin).await? <= 1 => {
                return Err(AppError::LastAdmin);
            }
            _ => (),
        }
        self.set_rank(editor, target.id, Rank::Normal).await
    }

    async fn set_rank(&self, editor: &User, id: UserId, rank: Rank) -> AppResult<UserStatus> {
        if !self.store.set_user_rank(id, rank).await? {
            return Err(AppError::NotFound("User"));
        }
        tracing::info!(editor_id = %editor.id, user_id = %id, ?rank, "Changed user rank.");
        self.user_status(id).await
    }
}
