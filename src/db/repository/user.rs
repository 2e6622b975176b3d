use chrono::NaiveDateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::User;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

pub struct UserRepository;

fn row_to_user(r: SqliteRow) -> User {
    User {
        id: r.get("id"),
        telegram_id: r.get("telegram_id"),
        username: r.get("username"),
        points: r.get("points"),
        referrals: r.get("referrals"),
        last_farm: r.get("last_farm"),
        created_at: r.get("created_at"),
    }
}

impl UserRepository {
    pub async fn find_by_telegram_id(
        pool: &SqlitePool,
        telegram_id: i64,
    ) -> AppResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, telegram_id, username, points, referrals, last_farm, created_at
            FROM users
            WHERE telegram_id = ?
            "#,
        )
        .bind(telegram_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(row_to_user))
    }

    /// Create a user row on first contact. Returns `true` iff a new row was
    /// inserted; an already-known `telegram_id` is a no-op. The caller relies
    /// on this flag for once-only referral crediting.
    pub async fn create_if_absent(
        pool: &SqlitePool,
        telegram_id: i64,
        username: &str,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let id = Uuid::new_v4().to_string();

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO users (id, telegram_id, username, points, referrals, last_farm, created_at)
            VALUES (?, ?, ?, 0, 0, NULL, ?)
            "#,
        )
        .bind(&id)
        .bind(telegram_id)
        .bind(username)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomic balance increment. Unknown ids fall through as a no-op; absence
    /// is a normal outcome on this surface.
    pub async fn add_points(pool: &SqlitePool, telegram_id: i64, delta: i64) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET points = points + ?
            WHERE telegram_id = ?
            "#,
        )
        .bind(delta)
        .bind(telegram_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Credit a farm reward and stamp `last_farm` in one conditional UPDATE.
    ///
    /// The guard only matches when the user is still eligible
    /// (`last_farm IS NULL` or at/before `eligible_before`), so two farms
    /// racing within the cooldown window cannot both be granted. Returns
    /// `true` iff the reward was applied.
    pub async fn try_grant_farm(
        pool: &SqlitePool,
        telegram_id: i64,
        earned: i64,
        at: NaiveDateTime,
        eligible_before: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET points = points + ?, last_farm = ?
            WHERE telegram_id = ?
              AND (last_farm IS NULL OR last_farm <= ?)
            "#,
        )
        .bind(earned)
        .bind(at)
        .bind(telegram_id)
        .bind(eligible_before)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn increment_referrals(
        pool: &SqlitePool,
        telegram_id: i64,
        delta: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET referrals = referrals + ?
            WHERE telegram_id = ?
            "#,
        )
        .bind(delta)
        .bind(telegram_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT id, telegram_id, username, points, referrals, last_farm, created_at
            FROM users
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(row_to_user).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn create_if_absent_is_idempotent() {
        let pool = memory_pool().await;
        let now = Utc::now().naive_utc();

        assert!(UserRepository::create_if_absent(&pool, 42, "alice", now)
            .await
            .unwrap());
        assert!(!UserRepository::create_if_absent(&pool, 42, "alice-again", now)
            .await
            .unwrap());

        let user = UserRepository::find_by_telegram_id(&pool, 42)
            .await
            .unwrap()
            .expect("user should exist");
        assert_eq!(user.username, "alice");
        assert_eq!(user.points, 0);
        assert_eq!(user.referrals, 0);
        assert!(user.last_farm.is_none());
    }

    #[tokio::test]
    async fn find_absent_user_is_none() {
        let pool = memory_pool().await;
        assert!(UserRepository::find_by_telegram_id(&pool, 7)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn add_points_accumulates() {
        let pool = memory_pool().await;
        let now = Utc::now().naive_utc();
        UserRepository::create_if_absent(&pool, 1, "bob", now)
            .await
            .unwrap();

        UserRepository::add_points(&pool, 1, 200).await.unwrap();
        UserRepository::add_points(&pool, 1, 150).await.unwrap();

        let user = UserRepository::find_by_telegram_id(&pool, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.points, 350);
    }

    #[tokio::test]
    async fn try_grant_farm_respects_guard() {
        let pool = memory_pool().await;
        let now = Utc::now().naive_utc();
        let cutoff = now - Duration::hours(8);
        UserRepository::create_if_absent(&pool, 5, "carol", now)
            .await
            .unwrap();

        // Never farmed: grant goes through.
        assert!(UserRepository::try_grant_farm(&pool, 5, 100, now, cutoff)
            .await
            .unwrap());
        // Immediately after: guard rejects, nothing changes.
        assert!(!UserRepository::try_grant_farm(&pool, 5, 100, now, cutoff)
            .await
            .unwrap());

        let user = UserRepository::find_by_telegram_id(&pool, 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.points, 100);
        assert_eq!(user.last_farm, Some(now));
    }

    #[tokio::test]
    async fn list_all_orders_newest_first() {
        let pool = memory_pool().await;
        let base = Utc::now().naive_utc();

        UserRepository::create_if_absent(&pool, 1, "old", base - Duration::days(2))
            .await
            .unwrap();
        UserRepository::create_if_absent(&pool, 2, "new", base)
            .await
            .unwrap();
        UserRepository::create_if_absent(&pool, 3, "mid", base - Duration::days(1))
            .await
            .unwrap();

        let users = UserRepository::list_all(&pool).await.unwrap();
        let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
    }
}
