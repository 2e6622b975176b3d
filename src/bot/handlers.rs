//! Command and mini-app event handlers. Each inbound event maps to one
//! economy call and one reply; there is no per-chat state.

use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, Me, MessageKind, WebAppInfo};
use url::Url;

use super::Command;
use crate::config::Config;
use crate::services::economy::{
    mission, ClaimOutcome, EconomyService, FarmOutcome, GameClaim, Mission, MISSIONS,
};
use crate::AppState;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const START_PROMPT: &str = "Start with /start";

pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    me: Me,
    state: Arc<AppState>,
) -> HandlerResult {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let telegram_id = from.id.0 as i64;

    match cmd {
        Command::Start(payload) => {
            let username = from
                .username
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());
            let referrer = payload.trim().parse::<i64>().ok();

            let outcome = EconomyService::register_contact(
                &state.db,
                telegram_id,
                &username,
                referrer,
                Utc::now().naive_utc(),
            )
            .await?;
            tracing::debug!(
                "start from {}: created={} referral_bonus={:?}",
                telegram_id,
                outcome.created,
                outcome.referral_bonus
            );

            let mut request = bot.send_message(msg.chat.id, welcome_text());
            if let Some(keyboard) = game_keyboard(&state.config) {
                request = request.reply_markup(keyboard);
            }
            request.await?;
        }
        Command::Farm => {
            let outcome =
                EconomyService::farm(&state.db, telegram_id, Utc::now().naive_utc()).await?;
            bot.send_message(msg.chat.id, farm_reply(&outcome)).await?;
        }
        Command::Referral => {
            let reply = match crate::db::UserRepository::find_by_telegram_id(
                &state.db,
                telegram_id,
            )
            .await?
            {
                Some(user) => referral_reply(me.username(), telegram_id, user.referrals),
                None => START_PROMPT.to_string(),
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Missions => {
            bot.send_message(msg.chat.id, missions_text()).await?;
        }
        Command::Claim1 => {
            if let Some(mission) = mission(1) {
                claim_mission(&bot, &msg, &state, telegram_id, mission).await?;
            }
        }
        Command::Claim2 => {
            if let Some(mission) = mission(2) {
                claim_mission(&bot, &msg, &state, telegram_id, mission).await?;
            }
        }
        Command::Game => {
            let mut request = bot.send_message(msg.chat.id, "🎮 Launch Drop Game!");
            if let Some(keyboard) = game_keyboard(&state.config) {
                request = request.reply_markup(keyboard);
            }
            request.await?;
        }
        Command::Admin => {
            let reply = if telegram_id == state.config.bot.admin_user_id {
                format!("Admin Panel: {}", state.config.server.admin_url)
            } else {
                "Unauthorized".to_string()
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
    }

    Ok(())
}

/// Structured message from the embedded game. Only `action: "claim"` is
/// honored; anything else (including malformed JSON) is ignored without a
/// reply.
pub async fn handle_web_app_data(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let Some(claim) = game_claim(&msg.kind) else {
        return Ok(());
    };

    let telegram_id = from.id.0 as i64;
    let reply =
        match EconomyService::claim_game_points(&state.db, telegram_id, claim.points).await? {
            ClaimOutcome::Credited { amount, total } => {
                format!("🎮 Claimed {} points from game! Total: {}", amount, total)
            }
            ClaimOutcome::UnknownUser => START_PROMPT.to_string(),
        };
    bot.send_message(msg.chat.id, reply).await?;

    Ok(())
}

/// Pull an honored claim out of a `web_app_data` message. Malformed JSON and
/// unknown actions yield `None`.
fn game_claim(kind: &MessageKind) -> Option<GameClaim> {
    let MessageKind::WebAppData(payload) = kind else {
        return None;
    };
    let claim: GameClaim = match serde_json::from_str(&payload.web_app_data.data) {
        Ok(claim) => claim,
        Err(e) => {
            tracing::warn!("malformed web_app_data payload: {}", e);
            return None;
        }
    };
    if claim.action != "claim" {
        tracing::debug!("ignoring web_app_data action {:?}", claim.action);
        return None;
    }
    Some(claim)
}

async fn claim_mission(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    telegram_id: i64,
    mission: &Mission,
) -> HandlerResult {
    let reply = match EconomyService::claim_mission(&state.db, telegram_id, mission).await? {
        ClaimOutcome::Credited { amount, total } => {
            format!("✅ Claimed {} points! Total: {}", amount, total)
        }
        ClaimOutcome::UnknownUser => START_PROMPT.to_string(),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

// ============================================================================
// Reply rendering
// ============================================================================

fn welcome_text() -> String {
    "Welcome to Grow Spark AI! 🚀\n\
     /farm - Earn points\n\
     /referral - Invite friends\n\
     /missions - Complete tasks\n\
     /game - Play drop game"
        .to_string()
}

fn farm_reply(outcome: &FarmOutcome) -> String {
    match outcome {
        FarmOutcome::Rewarded { earned, total } => {
            format!("🎉 Farmed {} Grow Spark Points! Total: {}", earned, total)
        }
        FarmOutcome::Cooldown { hours_left } => {
            format!("⏰ Wait {} hours to farm again!", hours_left)
        }
        FarmOutcome::UnknownUser => START_PROMPT.to_string(),
    }
}

fn referral_reply(bot_username: &str, telegram_id: i64, referrals: i64) -> String {
    format!(
        "Your link: t.me/{}?start={}\nReferrals: {}\nEarn 10% of friends' points!",
        bot_username, telegram_id, referrals
    )
}

fn missions_text() -> String {
    let mut text = String::from("📋 Missions:");
    for mission in &MISSIONS {
        text.push_str(&format!(
            "\n{}. {} - /claim{} ({} points)",
            mission.number, mission.title, mission.number, mission.reward
        ));
    }
    text
}

/// Inline button launching the mini-app. A malformed `WEB_APP_URL` downgrades
/// replies to plain text rather than failing the whole handler.
fn game_keyboard(config: &Config) -> Option<InlineKeyboardMarkup> {
    let raw = format!("{}/game", config.server.web_app_url.trim_end_matches('/'));
    match Url::parse(&raw) {
        Ok(url) => Some(InlineKeyboardMarkup::new([[InlineKeyboardButton::web_app(
            "Launch Mining Game",
            WebAppInfo { url },
        )]])),
        Err(e) => {
            tracing::warn!("invalid WEB_APP_URL {:?}: {}", raw, e);
            None
        }
    }
}
