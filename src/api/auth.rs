use axum::body::Body;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::db::{PublicUser, Rank, User};
use crate::error::AppError;
use crate::traits::RequestBody;
use crate::AppState;

const EXPIRED_TOKEN: &str = "token=expired; Path=/; Expires=Thu, 1 Jan 1970 00:00:00 GMT";
pub const APPEND_EXPIRED_TOKEN: AppendHeaders<Option<(axum::http::header::HeaderName, &str)>> =
    AppendHeaders(Some((SET_COOKIE, EXPIRED_TOKEN)));
pub const APPEND_NO_TOKEN: AppendHeaders<Option<(axum::http::header::HeaderName, &str)>> =
    AppendHeaders(None);

#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: String,
}

#[derive(Serialize, Debug)]
pub struct TokenReturn {
    pub user: PublicUser,
    pub token: String,
}

impl RequestBody for SignupRequest {
    type Response = TokenReturn;

    async fn request(
        self,
        state: AppState,
        _user: Option<User>,
    ) -> Result<Self::Response, AppError> {
        let user = state.create_user(&self.name, Rank::Normal).await?;
        let token = state.create_token(user.id).await?;
        Ok(TokenReturn {
            user: user.to_public(),
            token: token.string,
        })
    }
}

impl IntoResponse for TokenReturn {
    fn into_response(self) -> Response<Body> {
        let cookie = Cookie::build(("token", self.token.clone()))
            .path("/")
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict);
        let jar = CookieJar::new().add(cookie);
        (jar, Json(self)).into_response()
    }
}

/// Signs out by deleting the token the request was made with.
pub async fn invalidate_current_token(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    // Not a `RequestBody` because it needs the token itself.
    let Some(token) = crate::cookies::request_token(&jar, &headers) else {
        return Ok((APPEND_NO_TOKEN, "not signed in"));
    };
    state.remove_token(token).await?;
    Ok((APPEND_EXPIRED_TOKEN, "ok"))
}
