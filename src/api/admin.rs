//! Endpoints that need at least [`Rank::Admin`](crate::db::Rank::Admin).

use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::auth::TokenReturn;
use crate::db::{SubmissionWindow, User, UserId, UserStatistics, WindowId};
use crate::error::AppError;
use crate::game::admin::UserStatus;
use crate::game::RolloverReport;
use crate::traits::RequestBody;
use crate::AppState;

#[derive(Deserialize)]
pub struct ScheduledWindows {}

impl RequestBody for ScheduledWindows {
    type Response = Json<Vec<SubmissionWindow>>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.scheduled_windows(&user).await?))
    }
}

#[derive(Deserialize)]
pub struct CancelWindow {
    pub window_id: WindowId,
}

impl RequestBody for CancelWindow {
    type Response = &'static str;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        state.cancel_scheduled_window(&user, self.window_id).await?;
        Ok("ok")
    }
}

#[derive(Deserialize)]
pub struct ManualReset {
    pub open_time: DateTime<Utc>,
}

impl RequestBody for ManualReset {
    type Response = Json<SubmissionWindow>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.manual_reset(&user, self.open_time).await?))
    }
}

#[derive(Deserialize)]
pub struct TriggerRollover {}

impl RequestBody for TriggerRollover {
    type Response = Json<RolloverReport>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.trigger_rollover(&user).await?))
    }
}

/// Target of an admin action on a user.
#[derive(Deserialize)]
pub struct TargetUser {
    pub user_id: UserId,
}

#[derive(Deserialize)]
pub struct EliminateUser(TargetUser);

impl RequestBody for EliminateUser {
    type Response = Json<UserStatus>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.eliminate_user(&user, self.0.user_id).await?))
    }
}

#[derive(Deserialize)]
pub struct ResurrectUser(TargetUser);

impl RequestBody for ResurrectUser {
    type Response = Json<UserStatus>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.resurrect_user(&user, self.0.user_id).await?))
    }
}

#[derive(Deserialize)]
pub struct PromoteUser(TargetUser);

impl RequestBody for PromoteUser {
    type Response = Json<UserStatus>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.promote_user(&user, self.0.user_id).await?))
    }
}

#[derive(Deserialize)]
pub struct DemoteUser(TargetUser);

impl RequestBody for DemoteUser {
    type Response = Json<UserStatus>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.demote_user(&user, self.0.user_id).await?))
    }
}

/// Signs a player back in by handing a new token to the admin, who passes it
/// on. The admin's own cookie is left untouched.
#[derive(Deserialize)]
pub struct IssueToken(TargetUser);

impl RequestBody for IssueToken {
    type Response = Json<TokenReturn>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        let (target, token) = state.issue_token(&user, self.0.user_id).await?;
        Ok(Json(TokenReturn {
            user: target.to_public(),
            token: token.string,
        }))
    }
}

#[derive(Deserialize)]
pub struct Statistics {}

impl RequestBody for Statistics {
    type Response = Json<Vec<UserStatistics>>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.user_statistics(&user).await?))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::testing::{admin, players, super_admin, test_state};

    #[test]
    fn target_user_parses_from_json() {
        let request: PromoteUser = serde_json::from_str(r#"{"user_id": 7}"#).unwrap();
        assert_eq!(request.0.user_id, UserId(7));
    }

    #[tokio::test]
    async fn admin_requests() -> crate::AppResult {
        let (state, _clock) = test_state();
        let root = super_admin(&state).await?;
        let admin = admin(&state).await?;
        let users = players(&state, 1).await?;

        let open_time = state.now() + TimeDelta::hours(3);
        assert!(matches!(
            ManualReset { open_time }.request(state.clone(), None).await,
            Err(AppError::NotLoggedIn)
        ));
        let Json(window) = ManualReset { open_time }
            .request(state.clone(), Some(admin.clone()))
            .await?;
        let Json(scheduled) = ScheduledWindows {}
            .request(state.clone(), Some(admin.clone()))
            .await?;
        assert_eq!(scheduled, vec![window.clone()]);
        CancelWindow {
            window_id: window.id,
        }
        .request(state.clone(), Some(admin.clone()))
        .await?;

        let target = TargetUser {
            user_id: users[0].id,
        };
        let Json(status) = EliminateUser(target)
            .request(state.clone(), Some(admin.clone()))
            .await?;
        assert!(status.eliminated);

        let target = TargetUser {
            user_id: users[0].id,
        };
        assert!(matches!(
            PromoteUser(target).request(state.clone(), Some(admin)).await,
            Err(AppError::Forbidden)
        ));
        let target = TargetUser {
            user_id: users[0].id,
        };
        let Json(status) = PromoteUser(target).request(state, Some(root)).await?;
        assert_eq!(status.rank, crate::db::Rank::Admin);
        Ok(())
    }

    #[tokio::test]
    async fn issue_token_request() -> crate::AppResult {
        let (state, _clock) = test_state();
        let admin = admin(&state).await?;
        let users = players(&state, 1).await?;

        let target = TargetUser {
            user_id: users[0].id,
        };
        assert!(matches!(
            IssueToken(target).request(state.clone(), None).await,
            Err(AppError::NotLoggedIn)
        ));
        let target = TargetUser {
            user_id: users[0].id,
        };
        let Json(issued) = IssueToken(target).request(state.clone(), Some(admin)).await?;
        assert_eq!(issued.user, users[0].to_public());
        assert!(matches!(
            state.token_status(Some(&issued.token)).await?,
            crate::db::TokenStatus::Valid(u) if u.id == users[0].id
        ));
        Ok(())
    }
}
