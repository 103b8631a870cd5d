use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

id_struct!(UserId, User);

/// Privilege level of a user.
#[derive(
    sqlx::Type,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    #[default]
    Normal = 0,
    Admin = 1,
    SuperAdmin = 2,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub rank: Rank,
    pub eliminated: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Returns an error unless the user has at least the given rank.
    pub fn require_rank(&self, rank: Rank) -> AppResult {
        if self.rank >= rank {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Identity of a user as shown to other players.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicUser {
    pub id: UserId,
    pub name: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserStatistics {
    pub user_id: UserId,
    pub name: String,
    pub rank: Rank,
    pub eliminated: bool,
    pub verifications_received: i64,
    pub phrases_submitted: i64,
}
