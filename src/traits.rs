use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::CookieJar;
use serde::de::DeserializeOwned;

use crate::db::User;
use crate::error::AppError;
use crate::AppState;

/// Object that can be received as a request.
pub trait RequestBody {
    type Response;

    async fn request(self, state: AppState, user: Option<User>)
        -> Result<Self::Response, AppError>;

    async fn as_handler_query(
        State(state): State<AppState>,
        jar: CookieJar,
        headers: HeaderMap,
        Query(item): Query<Self>,
    ) -> Result<impl IntoResponse, AppError>
    where
        Self: Sized + DeserializeOwned,
        Self::Response: IntoResponse,
    {
        let (user, cookie_header) = crate::cookies::process_auth(&state, &jar, &headers).await?;
        let response = item.request(state, user).await?;
        Ok((cookie_header, response))
    }

    async fn as_json_handler(
        State(state): State<AppState>,
        jar: CookieJar,
        headers: HeaderMap,
        Json(item): Json<Self>,
    ) -> Result<impl IntoResponse, AppError>
    where
        Self: Sized + DeserializeOwned,
        Self::Response: IntoResponse,
    {
        let (user, cookie_header) = crate::cookies::process_auth(&state, &jar, &headers).await?;
        let response = item.request(state, user).await?;
        Ok((cookie_header, response))
    }
}
