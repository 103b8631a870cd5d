use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::{Phrase, User};
use crate::error::AppError;
use crate::game::admin::UserStatus;
use crate::game::CurrentPhrase;
use crate::traits::RequestBody;
use crate::AppState;

#[derive(Deserialize)]
pub struct GetPhrase {}

impl RequestBody for GetPhrase {
    type Response = Json<CurrentPhrase>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.current_phrase().await?))
    }
}

#[derive(Deserialize)]
pub struct CanSubmit {}

#[derive(Serialize, Debug)]
pub struct CanSubmitResponse {
    pub can_submit: bool,
}

impl RequestBody for CanSubmit {
    type Response = Json<CanSubmitResponse>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(CanSubmitResponse {
            can_submit: state.is_submission_open().await?,
        }))
    }
}

#[derive(Deserialize)]
pub struct SubmitPhrase {
    pub content: String,
}

impl RequestBody for SubmitPhrase {
    type Response = Json<Phrase>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.submit_phrase(&user, &self.content).await?))
    }
}

#[derive(Deserialize)]
pub struct EditPhrase {
    pub content: String,
}

impl RequestBody for EditPhrase {
    type Response = Json<Phrase>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.edit_phrase(&user, &self.content).await?))
    }
}

#[derive(Deserialize)]
pub struct UnsubmitPhrase {}

impl RequestBody for UnsubmitPhrase {
    type Response = &'static str;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        state.unsubmit_phrase(&user).await?;
        Ok("ok")
    }
}

/// Rank and elimination status of the signed-in user.
#[derive(Deserialize)]
pub struct Me {}

impl RequestBody for Me {
    type Response = Json<UserStatus>;

    async fn request(
        self,
        state: AppState,
        user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = user.ok_or(AppError::NotLoggedIn)?;
        Ok(Json(state.user_status(user.id).await?))
    }
}
