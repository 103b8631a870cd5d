use crate::db::{
    PublicUser, SubmissionWindow, User, UserId, Verification, VerificationView, WindowId,
};
use crate::{AppError, AppResult, AppState};

impl AppState {
    /// Records that `verifier` confirmed `verified` heard the phrase of the
    /// current window.
    pub async fn verify(&self, verifier: &User, verified: UserId) -> AppResult<Verification> {
        let window = self.current_window().await?.ok_or(AppError::NotOpen)?;
        if window.evaluated_at.is_some() {
            return Err(AppError::NotOpen);
        }
        self.record_verification(verifier, verified, &window).await
    }

    /// Records a verification against a specific window.
    ///
    /// A verifier may confirm any number of players, but each player can be
    /// verified at most once per window.
    pub async fn record_verification(
        &self,
        verifier: &User,
        verified: UserId,
        window: &SubmissionWindow,
    ) -> AppResult<Verification> {
        if verifier.id == verified {
            return Err(AppError::SelfVerification);
        }
        if self.store.get_user(verified).await?.is_none() {
            return Err(AppError::NotFound("User"));
        }

        let verification = self
            .store
            .insert_verification(verifier.id, verified, window.id, self.now())
            .await?;

        tracing::info!(
            verifier_id = %verifier.id,
            verified_id = %verified,
            window_id = %window.id,
            "Recorded verification.",
        );
        Ok(verification)
    }

    /// Returns the verifications of a window, or of the current window if
    /// `window` is `None`.
    pub async fn list_verifications(
        &self,
        window: Option<WindowId>,
    ) -> AppResult<Vec<VerificationView>> {
        match self.resolve_window(window).await? {
            Some(id) => self.store.list_verifications(id).await,
            None => Ok(vec![]),
        }
    }

    /// Returns the non-eliminated players who have not been verified for a
    /// window, or for the current window if `window` is `None`.
    pub async fn list_unverified(&self, window: Option<WindowId>) -> AppResult<Vec<PublicUser>> {
        match self.resolve_window(window).await? {
            Some(id) => self.store.list_unverified(id).await,
            None => Ok(vec![]),
        }
    }

    async fn resolve_window(&self, window: Option<WindowId>) -> AppResult<Option<WindowId>> {
        match window {
            Some(id) => match self.store.get_window(id).await? {
                Some(w) => Ok(Some(w.id)),
                None => Err(AppError::NotFound("Submission window")),
            },
            None => Ok(self.current_window().await?.map(|w| w.id)),
        }
    }
}
