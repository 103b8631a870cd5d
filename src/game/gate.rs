//! Phrase submission.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Phrase, PhraseView, Rank, SubmissionWindow, User};
use crate::{AppError, AppResult, AppState};

/// Maximum length of a phrase, in characters.
const MAX_PHRASE_LEN: usize = 500;

/// Lifecycle stage of a window, derived from persisted data.
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// Open time is still in the future.
    Scheduled,
    /// Open and waiting for a phrase.
    Open,
    /// Open and a phrase has been bound to it.
    PhraseSubmitted,
    /// Eliminations have been evaluated.
    Closed,
}

/// What players see about the day's phrase.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CurrentPhrase {
    pub phrase: Option<PhraseView>,
    pub submission_open: bool,
    /// When the next submission window opens, if one is scheduled.
    pub next_open_time: Option<DateTime<Utc>>,
}

fn validate_content(content: &str) -> AppResult<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::InvalidInput("Phrase must not be empty".to_string()));
    }
    if content.chars().count() > MAX_PHRASE_LEN {
        return Err(AppError::InvalidInput(format!(
            "Phrase must be at most {MAX_PHRASE_LEN} characters"
        )));
    }
    Ok(content)
}

impl AppState {
    /// Returns the most recently opened window, i.e. the one with the
    /// greatest open time that has already passed.
    pub async fn current_window(&self) -> AppResult<Option<SubmissionWindow>> {
        self.store.current_window(self.now()).await
    }

    pub async fn window_state(&self, window: &SubmissionWindow) -> AppResult<WindowState> {
        if window.evaluated_at.is_some() {
            Ok(WindowState::Closed)
        } else if !window.has_opened(self.now()) {
            Ok(WindowState::Scheduled)
        } else if self.store.get_phrase(window.id).await?.is_some() {
            Ok(WindowState::PhraseSubmitted)
        } else {
            Ok(WindowState::Open)
        }
    }

    /// Returns whether a phrase may be submitted right now.
    pub async fn is_submission_open(&self) -> AppResult<bool> {
        match self.current_window().await? {
            Some(window) => Ok(self.window_state(&window).await? == WindowState::Open),
            None => Ok(false),
        }
    }

    /// Binds `content` to the current window as its phrase.
    ///
    /// Concurrent submitters race; exactly one wins and the others get
    /// [`AppError::AlreadySubmitted`].
    pub async fn submit_phrase(&self, user: &User, content: &str) -> AppResult<Phrase> {
        let content = validate_content(content)?;
        let now = self.now();

        let window = self
            .store
            .current_window(now)
            .await?
            .ok_or(AppError::NotOpen)?;
        if window.evaluated_at.is_some() {
            return Err(AppError::NotOpen);
        }

        let phrase = self
            .store
            .insert_phrase(window.id, user.id, content, now)
            .await?;

        tracing::info!(user_id = %user.id, window_id = %window.id, "Phrase submitted.");
        Ok(phrase)
    }

    /// Replaces the content of the current window's phrase.
    pub async fn edit_phrase(&self, editor: &User, content: &str) -> AppResult<Phrase> {
        editor.require_rank(Rank::Admin)?;
        let content = validate_content(content)?;

        let window = self
            .current_window()
            .await?
            .ok_or(AppError::NotFound("Submission window"))?;
        let phrase = self
            .store
            .update_phrase(window.id, editor.id, content, self.now())
            .await?
            .ok_or(AppError::NotFound("Phrase"))?;

        tracing::info!(editor_id = %editor.id, window_id = %window.id, "Phrase edited.");
        Ok(phrase)
    }

    /// Removes the current window's phrase, reopening the window for
    /// submission.
    pub async fn unsubmit_phrase(&self, editor: &User) -> AppResult {
        editor.require_rank(Rank::Admin)?;

        let window = self
            .current_window()
            .await?
            .ok_or(AppError::NotFound("Submission window"))?;
        if !self.store.delete_phrase(window.id, self.now()).await? {
            return Err(AppError::NotFound("Phrase"));
        }

        tracing::info!(editor_id = %editor.id, window_id = %window.id, "Phrase unsubmitted.");
        Ok(())
    }

    pub async fn current_phrase(&self) -> AppResult<CurrentPhrase> {
        let now = self.now();
        let next_open_time = self
            .store
            .next_scheduled_window(now)
            .await?
            .map(|w| w.open_time);

        let Some(window) = self.store.current_window(now).await? else {
            return Ok(CurrentPhrase {
                phrase: None,
                submission_open: false,
                next_open_time,
            });
        };

        let submission_open = self.window_state(&window).await? == WindowState::Open;
        let phrase = match self.store.get_phrase(window.id).await? {
            Some(phrase) => {
                let submitter = self
                    .store
                    .get_user(phrase.submitted_by)
                    .await?
                    .ok_or(AppError::NotFound("User"))?;
                Some(PhraseView {
                    content: phrase.content,
                    submitted_by: submitter.to_public(),
                    window_id: window.id,
                })
            }
            None => None,
        };

        Ok(CurrentPhrase {
            phrase,
            submission_open,
            next_open_time,
        })
    }
}
