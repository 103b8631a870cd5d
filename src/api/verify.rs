use axum::Json;
use serde::Deserialize;

use crate::db::{PublicUser, User, UserId, Verification, VerificationView, WindowId};
use crate::error::AppError;
use crate::traits::RequestBody;
use crate::AppState;

#[derive(Deserialize)]
pub struct VerifyUser {
    pub user_id: UserId,
}

impl RequestBody for VerifyUser {
    type Response = Json<Verification>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.verify(&user, self.user_id).await?))
    }
}

/// Verifications of a window. Defaults to the current window.
#[derive(Deserialize)]
pub struct ListVerifications {
    pub window_id: Option<WindowId>,
}

impl RequestBody for ListVerifications {
    type Response = Json<Vec<VerificationView>>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.list_verifications(self.window_id).await?))
    }
}

/// Players still waiting for a verification. Defaults to the current window.
#[derive(Deserialize)]
pub struct ListUnverified {
    pub window_id: Option<WindowId>,
}

impl RequestBody for ListUnverified {
    type Response = Json<Vec<PublicUser>>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.list_unverified(self.window_id).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{open_window, players, test_state};

    #[tokio::test]
    async fn verify_requests() -> crate::AppResult {
        let (state, _clock) = test_state();
        let users = players(&state, 3).await?;
        open_window(&state).await?;

        let verify = VerifyUser {
            user_id: users[1].id,
        };
        assert!(matches!(
            verify.request(state.clone(), None).await,
            Err(AppError::NotLoggedIn)
        ));

        let verify = VerifyUser {
            user_id: users[1].id,
        };
        verify.request(state.clone(), Some(users[0].clone())).await?;

        let Json(views) = ListVerifications { window_id: None }
            .request(state.clone(), Some(users[2].clone()))
            .await?;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].verified_id, users[1].id);

        let Json(unverified) = ListUnverified { window_id: None }
            .request(state, Some(users[2].clone()))
            .await?;
        assert_eq!(unverified, vec![users[0].to_public(), users[2].to_public()]);
        Ok(())
    }
}
