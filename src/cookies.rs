use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::AppendHeaders;
use axum_extra::extract::CookieJar;

use crate::api::auth::{APPEND_EXPIRED_TOKEN, APPEND_NO_TOKEN};
use crate::db::{TokenStatus, User};
use crate::{AppError, AppState};

/// Returns the token of a request, taken from the `token` cookie or else from
/// an `Authorization: Bearer` header.
pub fn request_token<'a>(jar: &'a CookieJar, headers: &'a HeaderMap) -> Option<&'a str> {
    jar.get("token").map(|cookie| cookie.value()).or_else(|| {
        headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
            .map(str::trim)
    })
}

pub async fn process_auth(
    state: &AppState,
    jar: &CookieJar,
    headers: &HeaderMap,
) -> Result<
    (
        Option<User>,
        AppendHeaders<Option<(axum::http::HeaderName, &'static str)>>,
    ),
    AppError,
> {
    let token_status = state.token_status(request_token(jar, headers)).await?;
    let cookie_header = match &token_status {
        TokenStatus::None | TokenStatus::Valid(_) => APPEND_NO_TOKEN,
        TokenStatus::Expired | TokenStatus::Unknown => APPEND_EXPIRED_TOKEN,
    };
    let user = match token_status {
        TokenStatus::Valid(user) => Some(user),
        _ => None,
    };
    Ok((user, cookie_header))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;

    use super::*;

    #[test]
    fn cookie_takes_precedence_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        let empty = CookieJar::new();
        assert_eq!(request_token(&empty, &headers), Some("abc"));

        let jar = CookieJar::new().add(Cookie::new("token", "xyz"));
        assert_eq!(request_token(&jar, &headers), Some("xyz"));
        assert_eq!(request_token(&empty, &HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn unknown_token_expires_cookie() -> crate::AppResult {
        let (state, _clock) = crate::testing::test_state();
        let jar = CookieJar::new().add(Cookie::new("token", "stale"));
        let (user, header) = process_auth(&state, &jar, &HeaderMap::new()).await?;
        assert!(user.is_none());
        assert!(header.0.is_some());
        Ok(())
    }
}
