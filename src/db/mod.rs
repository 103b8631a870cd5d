use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppResult;

mod memory;
mod postgres;
pub mod token;
mod user;
mod window;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use token::{Token, TokenStatus};
pub use user::{PublicUser, Rank, User, UserId, UserStatistics};
pub use window::{
    EvaluatedWindow, Phrase, PhraseId, SubmissionWindow, Verification, VerificationId,
    VerificationView, WindowId,
};

/// Persistence of the game state.
///
/// Every method is atomic on its own. Methods that must combine a read with a
/// write (conditional inserts, manual reset, window evaluation) do so inside a
/// single transaction or critical section of the backend.
#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn create_user(&self, name: &str, rank: Rank, now: DateTime<Utc>) -> AppResult<User>;
    async fn get_user(&self, id: UserId) -> AppResult<Option<User>>;
    /// Returns all users ordered by ID.
    async fn list_users(&self) -> AppResult<Vec<User>>;
    /// Returns `false` if the user does not exist.
    async fn set_user_rank(&self, id: UserId, rank: Rank) -> AppResult<bool>;
    /// Returns `false` if the user does not exist.
    async fn set_user_eliminated(&self, id: UserId, eliminated: bool) -> AppResult<bool>;
    async fn count_users_with_rank(&self, rank: Rank) -> AppResult<i64>;
    async fn user_statistics(&self) -> AppResult<Vec<UserStatistics>>;

    // Tokens
    async fn create_token(&self, user_id: UserId, string: &str, expiry: DateTime<Utc>)
        -> AppResult<Token>;
    async fn get_token(&self, string: &str) -> AppResult<Option<Token>>;
    async fn remove_token(&self, string: &str) -> AppResult;

    // Windows
    async fn create_window(
        &self,
        open_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<SubmissionWindow>;
    async fn get_window(&self, id: WindowId) -> AppResult<Option<SubmissionWindow>>;
    /// Returns the window with the greatest open time that is not after `now`.
    async fn current_window(&self, now: DateTime<Utc>) -> AppResult<Option<SubmissionWindow>>;
    /// Returns the window with the least open time strictly after `now`.
    async fn next_scheduled_window(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SubmissionWindow>>;
    /// Returns every window that has opened by `now` but was never evaluated,
    /// oldest first.
    async fn unevaluated_windows(&self, now: DateTime<Utc>) -> AppResult<Vec<SubmissionWindow>>;
    /// Returns all windows opening strictly after `now`, soonest first.
    async fn scheduled_windows(&self, now: DateTime<Utc>) -> AppResult<Vec<SubmissionWindow>>;
    /// Deletes a window only if it opens strictly after `now`. Returns whether
    /// a window was deleted.
    async fn delete_scheduled_window(&self, id: WindowId, now: DateTime<Utc>) -> AppResult<bool>;
    /// Hard-deletes windows that opened before `cutoff`, along with their
    /// phrases and verifications. Returns the number of windows deleted.
    async fn delete_windows_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
    /// Deletes every window opening after `now` and creates one at
    /// `open_time`, atomically.
    async fn replace_scheduled_windows(
        &self,
        now: DateTime<Utc>,
        open_time: DateTime<Utc>,
    ) -> AppResult<SubmissionWindow>;

    // Phrases
    async fn get_phrase(&self, window: WindowId) -> AppResult<Option<Phrase>>;
    /// Binds a phrase to a window unless one is already bound, in which case
    /// this fails with [`crate::AppError::AlreadySubmitted`].
    async fn insert_phrase(
        &self,
        window: WindowId,
        submitter: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Phrase>;
    /// Returns `None` if no phrase is bound to the window.
    async fn update_phrase(
        &self,
        window: WindowId,
        editor: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Phrase>>;
    /// Soft-deletes the phrase bound to the window. Returns whether there was
    /// one.
    async fn delete_phrase(&self, window: WindowId, now: DateTime<Utc>) -> AppResult<bool>;

    // Verifications
    /// Records a verification unless `verified` already has one for the
    /// window, in which case this fails with
    /// [`crate::AppError::AlreadyVerified`].
    async fn insert_verification(
        &self,
        verifier: UserId,
        verified: UserId,
        window: WindowId,
        now: DateTime<Utc>,
    ) -> AppResult<Verification>;
    async fn list_verifications(&self, window: WindowId) -> AppResult<Vec<VerificationView>>;
    /// Returns every non-eliminated user without a verification for the
    /// window, ordered by ID.
    async fn list_unverified(&self, window: WindowId) -> AppResult<Vec<PublicUser>>;

    /// Marks the window as evaluated and eliminates every non-eliminated user
    /// without a verification for it, all in one transaction.
    ///
    /// Returns `None` without changing anything if the window was already
    /// evaluated.
    async fn evaluate_window(
        &self,
        window: WindowId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<EvaluatedWindow>>;

    /// Removes all game data.
    async fn reset(&self) -> AppResult;
}

/// Phrase as shown to players.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PhraseView {
    pub content: String,
    pub submitted_by: PublicUser,
    pub window_id: WindowId,
}
