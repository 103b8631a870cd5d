//! PostgreSQL store.
//!
//! Schema lives in `migrations/`. Uniqueness of phrases and verifications per
//! window is enforced by unique indexes, so conditional inserts are single
//! statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{query, query_as, query_scalar};

use super::*;
use crate::AppError;

const WINDOW_COLUMNS: &str = "id, open_time, evaluated_at, created_at";
const PHRASE_COLUMNS: &str = "id, window_id, submitted_by, content, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> sqlx::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> eyre::Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a foreign key violation (the window vanished underneath us) to
/// [`AppError::NotFound`].
fn map_missing_window(err: sqlx::Error) -> AppError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_foreign_key_violation() => {
            AppError::NotFound("Submission window")
        }
        _ => AppError::Sql(err),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, name: &str, rank: Rank, now: DateTime<Utc>) -> AppResult<User> {
        query_as::<_, User>(
            "INSERT INTO UserAccount (name, rank, created_at) VALUES ($1, $2, $3)
                ON CONFLICT (name) DO NOTHING
                RETURNING id, name, rank, eliminated, created_at",
        )
        .bind(name)
        .bind(rank)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::UsernameTaken)
    }

    async fn get_user(&self, id: UserId) -> AppResult<Option<User>> {
        Ok(query_as::<_, User>(
            "SELECT id, name, rank, eliminated, created_at FROM UserAccount WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(query_as::<_, User>(
            "SELECT id, name, rank, eliminated, created_at FROM UserAccount ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_user_rank(&self, id: UserId, rank: Rank) -> AppResult<bool> {
        let result = query("UPDATE UserAccount SET rank = $1 WHERE id = $2")
            .bind(rank)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_user_eliminated(&self, id: UserId, eliminated: bool) -> AppResult<bool> {
        let result = query("UPDATE UserAccount SET eliminated = $1 WHERE id = $2")
            .bind(eliminated)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_users_with_rank(&self, rank: Rank) -> AppResult<i64> {
        Ok(
            query_scalar::<_, i64>("SELECT COUNT(*) FROM UserAccount WHERE rank = $1")
                .bind(rank)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn user_statistics(&self) -> AppResult<Vec<UserStatistics>> {
        Ok(query_as::<_, UserStatistics>(
            "SELECT UserAccount.id AS user_id,
                    UserAccount.name,
                    UserAccount.rank,
                    UserAccount.eliminated,
                    (SELECT COUNT(*) FROM Verification
                        WHERE Verification.verified_id = UserAccount.id
                    ) AS verifications_received,
                    (SELECT COUNT(*) FROM Phrase
                        WHERE Phrase.submitted_by = UserAccount.id
                        AND Phrase.deleted_at IS NULL
                    ) AS phrases_submitted
                FROM UserAccount
                ORDER BY UserAccount.id
            ",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_token(
        &self,
        user_id: UserId,
        string: &str,
        expiry: DateTime<Utc>,
    ) -> AppResult<Token> {
        Ok(query_as::<_, Token>(
            "INSERT INTO Token (user_id, string, expiry) VALUES ($1, $2, $3)
                RETURNING user_id, string, expiry",
        )
        .bind(user_id)
        .bind(string)
        .bind(expiry)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_token(&self, string: &str) -> AppResult<Option<Token>> {
        Ok(
            query_as::<_, Token>("SELECT user_id, string, expiry FROM Token WHERE string = $1")
                .bind(string)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn remove_token(&self, string: &str) -> AppResult {
        query("DELETE FROM Token WHERE string = $1")
            .bind(string)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_window(
        &self,
        open_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<SubmissionWindow> {
        Ok(query_as::<_, SubmissionWindow>(&format!(
            "INSERT INTO SubmissionWindow (open_time, created_at) VALUES ($1, $2)
                RETURNING {WINDOW_COLUMNS}"
        ))
        .bind(open_time)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_window(&self, id: WindowId) -> AppResult<Option<SubmissionWindow>> {
        Ok(query_as::<_, SubmissionWindow>(&format!(
            "SELECT {WINDOW_COLUMNS} FROM SubmissionWindow WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn current_window(&self, now: DateTime<Utc>) -> AppResult<Option<SubmissionWindow>> {
        Ok(query_as::<_, SubmissionWindow>(&format!(
            "SELECT {WINDOW_COLUMNS} FROM SubmissionWindow
                WHERE open_time <= $1
                ORDER BY open_time DESC, id DESC
                LIMIT 1"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn next_scheduled_window(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SubmissionWindow>> {
        Ok(query_as::<_, SubmissionWindow>(&format!(
            "SELECT {WINDOW_COLUMNS} FROM SubmissionWindow
                WHERE open_time > $1
                ORDER BY open_time ASC, id ASC
                LIMIT 1"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn unevaluated_windows(&self, now: DateTime<Utc>) -> AppResult<Vec<SubmissionWindow>> {
        Ok(query_as::<_, SubmissionWindow>(&format!(
            "SELECT {WINDOW_COLUMNS} FROM SubmissionWindow
                WHERE open_time <= $1 AND evaluated_at IS NULL
                ORDER BY open_time ASC, id ASC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn scheduled_windows(&self, now: DateTime<Utc>) -> AppResult<Vec<SubmissionWindow>> {
        Ok(query_as::<_, SubmissionWindow>(&format!(
            "SELECT {WINDOW_COLUMNS} FROM SubmissionWindow
                WHERE open_time > $1
                ORDER BY open_time ASC, id ASC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_scheduled_window(&self, id: WindowId, now: DateTime<Utc>) -> AppResult<bool> {
        let result = query("DELETE FROM SubmissionWindow WHERE id = $1 AND open_time > $2")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_windows_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = query("DELETE FROM SubmissionWindow WHERE open_time < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn replace_scheduled_windows(
        &self,
        now: DateTime<Utc>,
        open_time: DateTime<Utc>,
    ) -> AppResult<SubmissionWindow> {
        let mut transaction = self.pool.begin().await?;

        query("DELETE FROM SubmissionWindow WHERE open_time > $1")
            .bind(now)
            .execute(&mut *transaction)
            .await?;

        let window = query_as::<_, SubmissionWindow>(&format!(
            "INSERT INTO SubmissionWindow (open_time, created_at) VALUES ($1, $2)
                RETURNING {WINDOW_COLUMNS}"
        ))
        .bind(open_time)
        .bind(now)
        .fetch_one(&mut *transaction)
        .await?;

        transaction.commit().await?;
        Ok(window)
    }

    async fn get_phrase(&self, window: WindowId) -> AppResult<Option<Phrase>> {
        Ok(query_as::<_, Phrase>(&format!(
            "SELECT {PHRASE_COLUMNS} FROM Phrase WHERE window_id = $1 AND deleted_at IS NULL"
        ))
        .bind(window)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_phrase(
        &self,
        window: WindowId,
        submitter: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Phrase> {
        query_as::<_, Phrase>(&format!(
            "INSERT INTO Phrase (window_id, submitted_by, content, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $4)
                ON CONFLICT (window_id) WHERE deleted_at IS NULL DO NOTHING
                RETURNING {PHRASE_COLUMNS}"
        ))
        .bind(window)
        .bind(submitter)
        .bind(content)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_missing_window)?
        .ok_or(AppError::AlreadySubmitted)
    }

    async fn update_phrase(
        &self,
        window: WindowId,
        editor: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Phrase>> {
        Ok(query_as::<_, Phrase>(&format!(
            "UPDATE Phrase SET content = $1, submitted_by = $2, updated_at = $3
                WHERE window_id = $4 AND deleted_at IS NULL
                RETURNING {PHRASE_COLUMNS}"
        ))
        .bind(content)
        .bind(editor)
        .bind(now)
        .bind(window)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_phrase(&self, window: WindowId, now: DateTime<Utc>) -> AppResult<bool> {
        let result = query(
            "UPDATE Phrase SET deleted_at = $1 WHERE window_id = $2 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(window)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_verification(
        &self,
        verifier: UserId,
        verified: UserId,
        window: WindowId,
        now: DateTime<Utc>,
    ) -> AppResult<Verification> {
        if verifier == verified {
            return Err(AppError::SelfVerification);
        }
        query_as::<_, Verification>(
            "INSERT INTO Verification (window_id, verifier_id, verified_id, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (window_id, verified_id) DO NOTHING
                RETURNING id, window_id, verifier_id, verified_id, created_at",
        )
        .bind(window)
        .bind(verifier)
        .bind(verified)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_missing_window)?
        .ok_or(AppError::AlreadyVerified)
    }

    async fn list_verifications(&self, window: WindowId) -> AppResult<Vec<VerificationView>> {
        Ok(query_as::<_, VerificationView>(
            "SELECT Verification.id AS verification_id,
                    Verification.window_id,
                    Verification.verifier_id,
                    Verifier.name AS verifier_name,
                    Verification.verified_id,
                    Verified.name AS verified_name,
                    Verification.created_at
                FROM Verification
                JOIN UserAccount Verifier ON Verification.verifier_id = Verifier.id
                JOIN UserAccount Verified ON Verification.verified_id = Verified.id
                WHERE Verification.window_id = $1
                ORDER BY Verification.created_at, Verification.id
            ",
        )
        .bind(window)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_unverified(&self, window: WindowId) -> AppResult<Vec<PublicUser>> {
        Ok(query_as::<_, PublicUser>(
            "SELECT id, name FROM UserAccount
                WHERE NOT eliminated
                AND id NOT IN (SELECT verified_id FROM Verification WHERE window_id = $1)
                ORDER BY id
            ",
        )
        .bind(window)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn evaluate_window(
        &self,
        window: WindowId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<EvaluatedWindow>> {
        let mut transaction = self.pool.begin().await?;

        // No new verifications may land between reading and eliminating.
        query("LOCK TABLE Verification IN SHARE MODE")
            .execute(&mut *transaction)
            .await?;

        let claimed = query_scalar::<_, WindowId>(
            "UPDATE SubmissionWindow SET evaluated_at = $1
                WHERE id = $2 AND evaluated_at IS NULL
                RETURNING id",
        )
        .bind(now)
        .bind(window)
        .fetch_optional(&mut *transaction)
        .await?;

        if claimed.is_none() {
            let exists =
                query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM SubmissionWindow WHERE id = $1)")
                    .bind(window)
                    .fetch_one(&mut *transaction)
                    .await?;
            transaction.rollback().await?;
            return if exists {
                Ok(None)
            } else {
                Err(AppError::NotFound("Submission window"))
            };
        }

        let mut eliminated = query_as::<_, PublicUser>(
            "UPDATE UserAccount SET eliminated = TRUE
                WHERE NOT eliminated
                AND id NOT IN (SELECT verified_id FROM Verification WHERE window_id = $1)
                RETURNING id, name
            ",
        )
        .bind(window)
        .fetch_all(&mut *transaction)
        .await?;
        eliminated.sort_by_key(|u| u.id);

        let remaining = query_as::<_, PublicUser>(
            "SELECT id, name FROM UserAccount WHERE NOT eliminated ORDER BY id",
        )
        .fetch_all(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(Some(EvaluatedWindow {
            eliminated,
            remaining,
        }))
    }

    async fn reset(&self) -> AppResult {
        let mut transaction = self.pool.begin().await?;

        query("DROP SCHEMA public CASCADE")
            .execute(&mut *transaction)
            .await?;
        query("CREATE SCHEMA public")
            .execute(&mut *transaction)
            .await?;
        query("GRANT ALL ON SCHEMA public TO public")
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Sql(e.into()))?;
        Ok(())
    }
}

/// These run against a real server and wipe it first. Point
/// `TEST_DATABASE_URL` at a disposable database and run them with
/// `cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;

    use super::*;

    lazy_static! {
        /// Every test resets the same database.
        static ref DATABASE: tokio::sync::Mutex<()> = tokio::sync::Mutex::new(());
    }

    fn t0() -> DateTime<Utc> {
        "2026-10-16T17:00:00Z".parse().unwrap()
    }

    async fn test_store() -> PgStore {
        let url = dotenvy::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must point at a disposable database");
        let store = PgStore::connect(&url).await.expect("failed to connect");
        store.reset().await.expect("failed to reset database");
        store
    }

    async fn users(store: &PgStore, n: usize) -> AppResult<Vec<User>> {
        let mut users = Vec::with_capacity(n);
        for i in 0..n {
            users.push(store.create_user(&format!("player{i}"), Rank::Normal, t0()).await?);
        }
        Ok(users)
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn windows_keep_given_creation_time() -> AppResult {
        let _lock = DATABASE.lock().await;
        let store = test_store().await;

        let created = t0() - TimeDelta::days(2);
        let window = store.create_window(t0() - TimeDelta::hours(1), created).await?;
        assert_eq!(window.created_at, created);

        let evaluated = store.create_window(t0() - TimeDelta::days(1), created).await?;
        store.evaluate_window(evaluated.id, t0()).await?;
        store.create_window(t0() + TimeDelta::hours(1), created).await?;
        assert_eq!(store.unevaluated_windows(t0()).await?, vec![window]);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn soft_deleted_phrase_frees_the_window() -> AppResult {
        let _lock = DATABASE.lock().await;
        let store = test_store().await;
        let users = users(&store, 1).await?;
        let window = store.create_window(t0(), t0()).await?;

        store.insert_phrase(window.id, users[0].id, "one", t0()).await?;
        assert!(matches!(
            store.insert_phrase(window.id, users[0].id, "two", t0()).await,
            Err(AppError::AlreadySubmitted)
        ));
        assert!(store.delete_phrase(window.id, t0()).await?);
        let phrase = store.insert_phrase(window.id, users[0].id, "two", t0()).await?;
        assert_eq!(store.get_phrase(window.id).await?, Some(phrase));
        assert!(matches!(
            store.insert_phrase(WindowId(9999), users[0].id, "three", t0()).await,
            Err(AppError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn concurrent_phrase_inserts_have_one_winner() -> AppResult {
        let _lock = DATABASE.lock().await;
        let store = Arc::new(test_store().await);
        let users = users(&store, 16).await?;
        let window = store.create_window(t0(), t0()).await?.id;

        let handles: Vec<_> = users
            .into_iter()
            .map(|user| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .insert_phrase(window, user.id, &user.name, t0())
                        .await
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.expect("task panicked") {
                Ok(_) => winners += 1,
                Err(AppError::AlreadySubmitted) => {}
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(winners, 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn concurrent_verifications_record_once() -> AppResult {
        let _lock = DATABASE.lock().await;
        let store = Arc::new(test_store().await);
        let mut users = users(&store, 17).await?;
        let target = users.remove(0).id;
        let window = store.create_window(t0(), t0()).await?.id;

        let handles: Vec<_> = users
            .into_iter()
            .map(|verifier| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .insert_verification(verifier.id, target, window, t0())
                        .await
                })
            })
            .collect();

        let mut recorded = 0;
        for handle in handles {
            match handle.await.expect("task panicked") {
                Ok(_) => recorded += 1,
                Err(AppError::AlreadyVerified) => {}
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(recorded, 1);
        assert_eq!(store.list_verifications(window).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn window_is_evaluated_once() -> AppResult {
        let _lock = DATABASE.lock().await;
        let store = test_store().await;
        let users = users(&store, 3).await?;
        let window = store.create_window(t0() - TimeDelta::hours(1), t0()).await?;
        store
            .insert_verification(users[0].id, users[1].id, window.id, t0())
            .await?;

        let outcome = store.evaluate_window(window.id, t0()).await?.unwrap();
        assert_eq!(
            outcome.eliminated,
            vec![users[0].to_public(), users[2].to_public()]
        );
        assert_eq!(outcome.remaining, vec![users[1].to_public()]);
        assert_eq!(
            store.get_window(window.id).await?.unwrap().evaluated_at,
            Some(t0())
        );

        // Resurrected players stay alive through a repeated evaluation.
        store.set_user_eliminated(users[2].id, false).await?;
        assert_eq!(store.evaluate_window(window.id, t0()).await?, None);
        assert!(!store.get_user(users[2].id).await?.unwrap().eliminated);

        assert!(matches!(
            store.evaluate_window(WindowId(9999), t0()).await,
            Err(AppError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn failed_evaluation_changes_nothing() -> AppResult {
        let _lock = DATABASE.lock().await;
        let store = test_store().await;
        let mut users = users(&store, 3).await?;
        users.push(store.create_user("immortal", Rank::Normal, t0()).await?);
        let window = store.create_window(t0() - TimeDelta::hours(1), t0()).await?;

        query(
            "CREATE FUNCTION refuse_elimination() RETURNS trigger AS $$
            BEGIN
                IF NEW.name = 'immortal' AND NEW.eliminated THEN
                    RAISE EXCEPTION 'refusing to eliminate %', NEW.name;
                END IF;
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql",
        )
        .execute(&store.pool)
        .await?;
        query(
            "CREATE TRIGGER refuse_elimination BEFORE UPDATE ON UserAccount
                FOR EACH ROW EXECUTE FUNCTION refuse_elimination()",
        )
        .execute(&store.pool)
        .await?;

        assert!(matches!(
            store.evaluate_window(window.id, t0()).await,
            Err(AppError::Sql(_))
        ));
        assert_eq!(store.get_window(window.id).await?.unwrap().evaluated_at, None);
        assert!(store.list_users().await?.iter().all(|u| !u.eliminated));

        query("DROP TRIGGER refuse_elimination ON UserAccount")
            .execute(&store.pool)
            .await?;
        let outcome = store.evaluate_window(window.id, t0()).await?.unwrap();
        assert_eq!(outcome.eliminated.len(), users.len());
        Ok(())
    }
}
