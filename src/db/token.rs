use chrono::{DateTime, TimeDelta, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::db::{User, UserId};
use crate::{AppResult, AppState};

/// How long a token is valid for.
const TOKEN_DURATION: TimeDelta = TimeDelta::days(365);
/// Total numbers of characters in a token, including random characters and
/// expiry date.
const TOTAL_TOKEN_LEN: usize = 64;
/// Minimum number of random characters in a token.
///
/// These must be unique and cryptographically secure because we don't check for
/// overlaps.
const MIN_RANDOM_TOKEN_LEN: usize = 32;

/// Token identifying a signed-in user.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Token {
    pub user_id: UserId,
    pub string: String,
    pub expiry: DateTime<Utc>,
}

impl Token {
    /// Returns whether the token has expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry
    }

    pub fn new_string(expiry: DateTime<Utc>) -> String {
        let ret = expiry.timestamp().to_string() + "_";
        let remaining_len = TOTAL_TOKEN_LEN.saturating_sub(ret.len());
        let random_len = remaining_len.max(MIN_RANDOM_TOKEN_LEN);
        ret + &rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(random_len)
            .map(char::from)
            .collect::<String>()
    }
}

impl AppState {
    /// Returns the status of a token, includes user that the token belongs to
    /// if it is valid.
    pub async fn token_status(&self, string: Option<&str>) -> AppResult<TokenStatus> {
        let Some(string) = string else {
            return Ok(TokenStatus::None);
        };

        let Some(token) = self.store.get_token(string).await? else {
            return Ok(TokenStatus::Unknown);
        };

        if token.is_expired(self.now()) {
            return Ok(TokenStatus::Expired);
        }

        let Some(user) = self.store.get_user(token.user_id).await? else {
            return Ok(TokenStatus::Unknown);
        };

        Ok(TokenStatus::Valid(user))
    }

    /// Creates a token for a user and adds it to the database.
    pub async fn create_token(&self, user_id: UserId) -> AppResult<Token> {
        let expiry = self.now() + TOKEN_DURATION;
        let string = Token::new_string(expiry);
        self.store.create_token(user_id, &string, expiry).await
    }

    /// Removes a token from the database.
    pub async fn remove_token(&self, string: &str) -> AppResult {
        self.store.remove_token(string).await
    }
}

#[derive(Debug, Default, Clone)]
pub enum TokenStatus {
    /// No token was given.
    #[default]
    None,
    /// The token is valid and the user is logged in.
    Valid(User),
    /// The token has expired.
    Expired,
    /// The token is not recognized.
    Unknown,
}
