use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{PublicUser, UserId};

id_struct!(WindowId, SubmissionWindow);
id_struct!(PhraseId, Phrase);
id_struct!(VerificationId, Verification);

/// Daily opportunity for one phrase submission.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SubmissionWindow {
    pub id: WindowId,
    pub open_time: DateTime<Utc>,
    /// Set once eliminations have been evaluated for this window.
    pub evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SubmissionWindow {
    pub fn has_opened(&self, now: DateTime<Utc>) -> bool {
        self.open_time <= now
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    pub id: PhraseId,
    pub window_id: WindowId,
    pub submitted_by: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub id: VerificationId,
    pub window_id: WindowId,
    pub verifier_id: UserId,
    pub verified_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Verification with both parties' names resolved.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct VerificationView {
    pub verification_id: VerificationId,
    pub window_id: WindowId,
    pub verifier_id: UserId,
    pub verifier_name: String,
    pub verified_id: UserId,
    pub verified_name: String,
    pub created_at: DateTime<Utc>,
}

/// Result of evaluating eliminations for a window.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedWindow {
    /// Users eliminated by this evaluation, ordered by ID.
    pub eliminated: Vec<PublicUser>,
    /// Users still in the game afterwards, ordered by ID.
    pub remaining: Vec<PublicUser>,
}
