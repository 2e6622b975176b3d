use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Telegram user id; the lookup key for every operation.
    pub telegram_id: i64,
    /// Captured at first contact, not kept in sync with later renames.
    pub username: String,
    pub points: i64,
    pub referrals: i64,
    /// `None` means the user has never farmed.
    pub last_farm: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}
