//! Store that keeps everything in process memory.
//!
//! A single lock guards all tables, so every trait method is trivially atomic.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use parking_lot::Mutex;

use super::*;
use crate::AppError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    tokens: Vec<Token>,
    windows: Vec<SubmissionWindow>,
    phrases: Vec<StoredPhrase>,
    verifications: Vec<Verification>,
    next_id: i32,
}

#[derive(Debug, Clone)]
struct StoredPhrase {
    phrase: Phrase,
    deleted_at: Option<DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn user_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    fn user_name(&self, id: UserId) -> String {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.name.clone())
            .unwrap_or_default()
    }

    fn live_phrase_mut(&mut self, window: WindowId) -> Option<&mut StoredPhrase> {
        self.phrases
            .iter_mut()
            .find(|p| p.phrase.window_id == window && p.deleted_at.is_none())
    }

    fn verified_ids(&self, window: WindowId) -> HashSet<UserId> {
        self.verifications
            .iter()
            .filter(|v| v.window_id == window)
            .map(|v| v.verified_id)
            .collect()
    }

    fn unverified(&self, window: WindowId) -> Vec<PublicUser> {
        let verified = self.verified_ids(window);
        self.users
            .iter()
            .filter(|u| !u.eliminated && !verified.contains(&u.id))
            .sorted_by_key(|u| u.id)
            .map(User::to_public)
            .collect()
    }

    fn remove_windows(&mut self, doomed: &HashSet<WindowId>) {
        self.windows.retain(|w| !doomed.contains(&w.id));
        self.phrases.retain(|p| !doomed.contains(&p.phrase.window_id));
        self.verifications.retain(|v| !doomed.contains(&v.window_id));
    }

    fn insert_window(&mut self, open_time: DateTime<Utc>, now: DateTime<Utc>) -> SubmissionWindow {
        let window = SubmissionWindow {
            id: WindowId(self.next_id()),
            open_time,
            evaluated_at: None,
            created_at: now,
        };
        self.windows.push(window.clone());
        window
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, name: &str, rank: Rank, now: DateTime<Utc>) -> AppResult<User> {
        let mut t = self.tables.lock();
        if t.users.iter().any(|u| u.name == name) {
            return Err(AppError::UsernameTaken);
        }
        let user = User {
            id: UserId(t.next_id()),
            name: name.to_string(),
            rank,
            eliminated: false,
            created_at: now,
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> AppResult<Option<User>> {
        Ok(self.tables.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self
            .tables
            .lock()
            .users
            .iter()
            .sorted_by_key(|u| u.id)
            .cloned()
            .collect())
    }

    async fn set_user_rank(&self, id: UserId, rank: Rank) -> AppResult<bool> {
        Ok(self
            .tables
            .lock()
            .user_mut(id)
            .map(|u| u.rank = rank)
            .is_some())
    }

    async fn set_user_eliminated(&self, id: UserId, eliminated: bool) -> AppResult<bool> {
        Ok(self
            .tables
            .lock()
            .user_mut(id)
            .map(|u| u.eliminated = eliminated)
            .is_some())
    }

    async fn count_users_with_rank(&self, rank: Rank) -> AppResult<i64> {
        Ok(self.tables.lock().users.iter().filter(|u| u.rank == rank).count() as i64)
    }

    async fn user_statistics(&self) -> AppResult<Vec<UserStatistics>> {
        let t = self.tables.lock();
        Ok(t.users
            .iter()
            .sorted_by_key(|u| u.id)
            .map(|u| UserStatistics {
                user_id: u.id,
                name: u.name.clone(),
                rank: u.rank,
                eliminated: u.eliminated,
                verifications_received: t
                    .verifications
                    .iter()
                    .filter(|v| v.verified_id == u.id)
                    .count() as i64,
                phrases_submitted: t
                    .phrases
                    .iter()
                    .filter(|p| p.deleted_at.is_none() && p.phrase.submitted_by == u.id)
                    .count() as i64,
            })
            .collect())
    }

    async fn create_token(
        &self,
        user_id: UserId,
        string: &str,
        expiry: DateTime<Utc>,
    ) -> AppResult<Token> {
        let token = Token {
            user_id,
            string: string.to_string(),
            expiry,
        };
        self.tables.lock().tokens.push(token.clone());
        Ok(token)
    }

    async fn get_token(&self, string: &str) -> AppResult<Option<Token>> {
        Ok(self
            .tables
            .lock()
            .tokens
            .iter()
            .find(|t| t.string == string)
            .cloned())
    }

    async fn remove_token(&self, string: &str) -> AppResult {
        self.tables.lock().tokens.retain(|t| t.string != string);
        Ok(())
    }

    async fn create_window(
        &self,
        open_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<SubmissionWindow> {
        Ok(self.tables.lock().insert_window(open_time, now))
    }

    async fn get_window(&self, id: WindowId) -> AppResult<Option<SubmissionWindow>> {
        Ok(self.tables.lock().windows.iter().find(|w| w.id == id).cloned())
    }

    async fn current_window(&self, now: DateTime<Utc>) -> AppResult<Option<SubmissionWindow>> {
        Ok(self
            .tables
            .lock()
            .windows
            .iter()
            .filter(|w| w.open_time <= now)
            .max_by_key(|w| (w.open_time, w.id))
            .cloned())
    }

    async fn next_scheduled_window(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SubmissionWindow>> {
        Ok(self
            .tables
            .lock()
            .windows
            .iter()
            .filter(|w| w.open_time > now)
            .min_by_key(|w| (w.open_time, w.id))
            .cloned())
    }

    async fn unevaluated_windows(&self, now: DateTime<Utc>) -> AppResult<Vec<SubmissionWindow>> {
        Ok(self
            .tables
            .lock()
            .windows
            .iter()
            .filter(|w| w.open_time <= now && w.evaluated_at.is_none())
            .sorted_by_key(|w| (w.open_time, w.id))
            .cloned()
            .collect())
    }

    async fn scheduled_windows(&self, now: DateTime<Utc>) -> AppResult<Vec<SubmissionWindow>> {
        Ok(self
            .tables
            .lock()
            .windows
            .iter()
            .filter(|w| w.open_time > now)
            .sorted_by_key(|w| (w.open_time, w.id))
            .cloned()
            .collect())
    }

    async fn delete_scheduled_window(&self, id: WindowId, now: DateTime<Utc>) -> AppResult<bool> {
        let mut t = self.tables.lock();
        let found = t.windows.iter().any(|w| w.id == id && w.open_time > now);
        if found {
            t.remove_windows(&HashSet::from([id]));
        }
        Ok(found)
    }

    async fn delete_windows_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut t = self.tables.lock();
        let doomed: HashSet<WindowId> = t
            .windows
            .iter()
            .filter(|w| w.open_time < cutoff)
            .map(|w| w.id)
            .collect();
        t.remove_windows(&doomed);
        Ok(doomed.len() as u64)
    }

    async fn replace_scheduled_windows(
        &self,
        now: DateTime<Utc>,
        open_time: DateTime<Utc>,
    ) -> AppResult<SubmissionWindow> {
        let mut t = self.tables.lock();
        let doomed: HashSet<WindowId> = t
            .windows
            .iter()
            .filter(|w| w.open_time > now)
            .map(|w| w.id)
            .collect();
        t.remove_windows(&doomed);
        Ok(t.insert_window(open_time, now))
    }

    async fn get_phrase(&self, window: WindowId) -> AppResult<Option<Phrase>> {
        Ok(self
            .tables
            .lock()
            .live_phrase_mut(window)
            .map(|p| p.phrase.clone()))
    }

    async fn insert_phrase(
        &self,
        window: WindowId,
        submitter: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Phrase> {
        let mut t = self.tables.lock();
        if !t.windows.iter().any(|w| w.id == window) {
            return Err(AppError::NotFound("Submission window"));
        }
        if t.live_phrase_mut(window).is_some() {
            return Err(AppError::AlreadySubmitted);
        }
        let phrase = Phrase {
            id: PhraseId(t.next_id()),
            window_id: window,
            submitted_by: submitter,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };
        t.phrases.push(StoredPhrase {
            phrase: phrase.clone(),
            deleted_at: None,
        });
        Ok(phrase)
    }

    async fn update_phrase(
        &self,
        window: WindowId,
        editor: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Phrase>> {
        let mut t = self.tables.lock();
        Ok(t.live_phrase_mut(window).map(|stored| {
            stored.phrase.content = content.to_string();
            stored.phrase.submitted_by = editor;
            stored.phrase.updated_at = now;
            stored.phrase.clone()
        }))
    }

    async fn delete_phrase(&self, window: WindowId, now: DateTime<Utc>) -> AppResult<bool> {
        let mut t = self.tables.lock();
        Ok(t.live_phrase_mut(window)
            .map(|stored| stored.deleted_at = Some(now))
            .is_some())
    }

    async fn insert_verification(
        &self,
        verifier: UserId,
        verified: UserId,
        window: WindowId,
        now: DateTime<Utc>,
    ) -> AppResult<Verification> {
        let mut t = self.tables.lock();
        if verifier == verified {
            return Err(AppError::SelfVerification);
        }
        if !t.windows.iter().any(|w| w.id == window) {
            return Err(AppError::NotFound("Submission window"));
        }
        if t.verified_ids(window).contains(&verified) {
            return Err(AppError::AlreadyVerified);
        }
        let verification = Verification {
            id: VerificationId(t.next_id()),
            window_id: window,
            verifier_id: verifier,
            verified_id: verified,
            created_at: now,
        };
        t.verifications.push(verification.clone());
        Ok(verification)
    }

    async fn list_verifications(&self, window: WindowId) -> AppResult<Vec<VerificationView>> {
        let t = self.tables.lock();
        Ok(t.verifications
            .iter()
            .filter(|v| v.window_id == window)
            .sorted_by_key(|v| (v.created_at, v.id))
            .map(|v| VerificationView {
                verification_id: v.id,
                window_id: v.window_id,
                verifier_id: v.verifier_id,
                verifier_name: t.user_name(v.verifier_id),
                verified_id: v.verified_id,
                verified_name: t.user_name(v.verified_id),
                created_at: v.created_at,
            })
            .collect())
    }

    async fn list_unverified(&self, window: WindowId) -> AppResult<Vec<PublicUser>> {
        Ok(self.tables.lock().unverified(window))
    }

    async fn evaluate_window(
        &self,
        window: WindowId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<EvaluatedWindow>> {
        let mut t = self.tables.lock();
        let Some(w) = t.windows.iter_mut().find(|w| w.id == window) else {
            return Err(AppError::NotFound("Submission window"));
        };
        if w.evaluated_at.is_some() {
            return Ok(None);
        }
        w.evaluated_at = Some(now);

        let eliminated = t.unverified(window);
        for user in &eliminated {
            if let Some(u) = t.user_mut(user.id) {
                u.eliminated = true;
            }
        }
        let remaining = t
            .users
            .iter()
            .filter(|u| !u.eliminated)
            .sorted_by_key(|u| u.id)
            .map(User::to_public)
            .collect();

        Ok(Some(EvaluatedWindow {
            eliminated,
            remaining,
        }))
    }

    async fn reset(&self) -> AppResult {
        *self.tables.lock() = Tables::default();
        Ok(())
    }
}
