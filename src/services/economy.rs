//! The game economy: cooldown-gated farming, referral bonuses, mission and
//! mini-app claims. Everything operates on the `users` table through
//! `UserRepository`; the arithmetic itself lives in small pure functions so
//! it can be tested without a clock or a database.

use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::db::UserRepository;
use crate::error::AppResult;

pub const FARM_COOLDOWN_HOURS: i64 = 8;
/// Farm rewards are drawn uniformly from [FARM_REWARD_MIN, FARM_REWARD_MAX).
pub const FARM_REWARD_MIN: i64 = 50;
pub const FARM_REWARD_MAX: i64 = 150;
/// Referrers earn this share of their own balance at click time.
pub const REFERRAL_SHARE: f64 = 0.10;

// ============================================================================
// Mission catalog
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Mission {
    pub number: u8,
    pub title: &'static str,
    pub reward: i64,
}

pub const MISSIONS: [Mission; 2] = [
    Mission {
        number: 1,
        title: "Join Channel",
        reward: 200,
    },
    Mission {
        number: 2,
        title: "Watch Video",
        reward: 150,
    },
];

pub fn mission(number: u8) -> Option<&'static Mission> {
    MISSIONS.iter().find(|m| m.number == number)
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FarmOutcome {
    Rewarded { earned: i64, total: i64 },
    Cooldown { hours_left: i64 },
    UnknownUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Credited { amount: i64, total: i64 },
    UnknownUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactOutcome {
    /// Whether this contact created the user record.
    pub created: bool,
    /// Bonus credited to the referrer, when one was credited.
    pub referral_bonus: Option<i64>,
}

/// Payload the embedded game sends back through Telegram's `sendData`.
#[derive(Debug, Deserialize)]
pub struct GameClaim {
    pub action: String,
    pub points: i64,
}

// ============================================================================
// Pure rules
// ============================================================================

/// Remaining wait in whole hours (ceiling), or `None` once the cooldown
/// window has elapsed. An absent `last_farm` is treated by callers as
/// infinite elapsed time.
pub fn hours_until_next_farm(last_farm: NaiveDateTime, now: NaiveDateTime) -> Option<i64> {
    let window = Duration::hours(FARM_COOLDOWN_HOURS);
    let elapsed = now.signed_duration_since(last_farm);
    if elapsed >= window {
        return None;
    }
    // Ceil on milliseconds; any nonzero remainder must report at least 1.
    let remaining = window - elapsed;
    Some((remaining.num_milliseconds() + 3_599_999) / 3_600_000)
}

/// floor(referrer balance * 10%), from the balance at click time rather than
/// anything the new user goes on to earn.
pub fn referral_bonus(referrer_points: i64) -> i64 {
    (referrer_points as f64 * REFERRAL_SHARE).floor() as i64
}

pub fn draw_farm_reward() -> i64 {
    rand::thread_rng().gen_range(FARM_REWARD_MIN..FARM_REWARD_MAX)
}

// ============================================================================
// Economy Service
// ============================================================================

pub struct EconomyService;

impl EconomyService {
    /// First-contact registration with optional referral payload.
    ///
    /// Creation is idempotent; the referral bonus is only considered when
    /// this contact actually created the record, so a repeated deep-link
    /// message from an already-initialized identity grants nothing.
    pub async fn register_contact(
        pool: &SqlitePool,
        telegram_id: i64,
        username: &str,
        referrer: Option<i64>,
        now: NaiveDateTime,
    ) -> AppResult<ContactOutcome> {
        let created = UserRepository::create_if_absent(pool, telegram_id, username, now).await?;

        let mut bonus = None;
        if created {
            if let Some(referrer_id) = referrer {
                bonus = Self::apply_referral(pool, referrer_id).await?;
            }
        }

        Ok(ContactOutcome {
            created,
            referral_bonus: bonus,
        })
    }

    /// Credit the referrer for a successful referral. An absent referrer
    /// grants nothing and is not retried.
    async fn apply_referral(pool: &SqlitePool, referrer_id: i64) -> AppResult<Option<i64>> {
        let Some(referrer) = UserRepository::find_by_telegram_id(pool, referrer_id).await? else {
            tracing::debug!("referral payload names unknown user {}", referrer_id);
            return Ok(None);
        };

        let bonus = referral_bonus(referrer.points);
        UserRepository::add_points(pool, referrer_id, bonus).await?;
        UserRepository::increment_referrals(pool, referrer_id, 1).await?;

        tracing::info!("credited referral bonus {} to {}", bonus, referrer_id);
        Ok(Some(bonus))
    }

    /// The cooldown-gated random reward. Rejection carries the remaining
    /// wait and mutates nothing. The grant itself is a conditional UPDATE,
    /// so two farms racing inside one window resolve to a single reward.
    pub async fn farm(
        pool: &SqlitePool,
        telegram_id: i64,
        now: NaiveDateTime,
    ) -> AppResult<FarmOutcome> {
        let Some(user) = UserRepository::find_by_telegram_id(pool, telegram_id).await? else {
            return Ok(FarmOutcome::UnknownUser);
        };

        if let Some(last) = user.last_farm {
            if let Some(hours_left) = hours_until_next_farm(last, now) {
                return Ok(FarmOutcome::Cooldown { hours_left });
            }
        }

        let earned = draw_farm_reward();
        let eligible_before = now - Duration::hours(FARM_COOLDOWN_HOURS);
        let granted =
            UserRepository::try_grant_farm(pool, telegram_id, earned, now, eligible_before).await?;

        if !granted {
            // Lost a race with a concurrent farm; report the fresh cooldown.
            let hours_left = UserRepository::find_by_telegram_id(pool, telegram_id)
                .await?
                .and_then(|u| u.last_farm)
                .and_then(|last| hours_until_next_farm(last, now))
                .unwrap_or(FARM_COOLDOWN_HOURS);
            return Ok(FarmOutcome::Cooldown { hours_left });
        }

        let total = UserRepository::find_by_telegram_id(pool, telegram_id)
            .await?
            .map(|u| u.points)
            .unwrap_or(earned);

        Ok(FarmOutcome::Rewarded { earned, total })
    }

    /// Unconditional mission credit. Deliberately non-idempotent: every
    /// invocation is honored, matching the fixed-catalog contract.
    pub async fn claim_mission(
        pool: &SqlitePool,
        telegram_id: i64,
        mission: &Mission,
    ) -> AppResult<ClaimOutcome> {
        Self::credit(pool, telegram_id, mission.reward).await
    }

    /// Credit a client-declared score from the embedded game.
    ///
    /// Trust boundary: the amount is whatever the game client reported; the
    /// server does not recompute or bound the score.
    pub async fn claim_game_points(
        pool: &SqlitePool,
        telegram_id: i64,
        points: i64,
    ) -> AppResult<ClaimOutcome> {
        Self::credit(pool, telegram_id, points).await
    }

    async fn credit(pool: &SqlitePool, telegram_id: i64, amount: i64) -> AppResult<ClaimOutcome> {
        if UserRepository::find_by_telegram_id(pool, telegram_id)
            .await?
            .is_none()
        {
            return Ok(ClaimOutcome::UnknownUser);
        }

        UserRepository::add_points(pool, telegram_id, amount).await?;

        let total = UserRepository::find_by_telegram_id(pool, telegram_id)
            .await?
            .map(|u| u.points)
            .unwrap_or(amount);

        Ok(ClaimOutcome::Credited { amount, total })
    }
}
