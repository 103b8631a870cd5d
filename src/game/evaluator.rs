use itertools::Itertools;
use serde::Serialize;

use crate::db::{PublicUser, SubmissionWindow, WindowId};
use crate::{AppError, AppResult, AppState};

/// Eliminations caused by closing one window.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EliminationReport {
    pub window_id: WindowId,
    pub eliminated: Vec<PublicUser>,
    pub remaining: Vec<PublicUser>,
    /// Whether few enough players remain for the game to be won. The
    /// remaining players are the winners.
    pub game_won: bool,
}

/// Returns whether `remaining` players is few enough to end the game.
pub fn is_win(remaining: usize, win_threshold: usize) -> bool {
    remaining <= win_threshold
}

impl AppState {
    /// Eliminates every player who was not verified during `window`.
    ///
    /// Either all eliminations for the window become visible or none do.
    /// Returns `None` if the window was already evaluated.
    pub async fn evaluate_eliminations(
        &self,
        window: &SubmissionWindow,
    ) -> AppResult<Option<EliminationReport>> {
        let now = self.now();
        if !window.has_opened(now) {
            return Err(AppError::InvalidInput(
                "Cannot evaluate a window that has not opened yet".to_string(),
            ));
        }

        let Some(outcome) = self.store.evaluate_window(window.id, now).await? else {
            tracing::info!(window_id = %window.id, "Window was already evaluated.");
            return Ok(None);
        };

        for user in &outcome.eliminated {
            tracing::info!(window_id = %window.id, user_id = %user.id, name = user.name, "User has been eliminated.");
        }

        let game_won = is_win(outcome.remaining.len(), self.config.win_threshold);
        if game_won {
            tracing::warn!(
                window_id = %window.id,
                winners = %outcome.remaining.iter().map(|u| &u.name).join(", "),
                "Win condition reached.",
            );
        }

        tracing::info!(
            window_id = %window.id,
            eliminated = outcome.eliminated.len(),
            remaining = outcome.remaining.len(),
            "Evaluated eliminations.",
        );

        Ok(Some(EliminationReport {
            window_id: window.id,
            eliminated: outcome.eliminated,
            remaining: outcome.remaining,
            game_won,
        }))
    }
}
