//! Bot initialization and message routing:
//! - command enum definition
//! - dispatch tree (commands + mini-app `web_app_data` events)
//! - command registration in the Telegram UI

pub mod handlers;

use std::sync::Arc;

use teloxide::dispatching::DefaultKey;
use teloxide::dptree;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::MessageKind;
use teloxide::utils::command::BotCommands;

use crate::config::Config;
use crate::AppState;

/// Every recognized chat trigger. The mission claims stay as distinct
/// commands but funnel into a single parameterized claim path.
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Grow Spark commands:")]
pub enum Command {
    #[command(description = "register and show the main menu")]
    Start(String),
    #[command(description = "farm points (8 hour cooldown)")]
    Farm,
    #[command(description = "your referral link and stats")]
    Referral,
    #[command(description = "list available missions")]
    Missions,
    #[command(description = "claim the Join Channel mission")]
    Claim1,
    #[command(description = "claim the Watch Video mission")]
    Claim2,
    #[command(description = "open the mining game")]
    Game,
    #[command(description = "admin panel link (administrator only)")]
    Admin,
}

pub fn create_bot(config: &Config) -> Bot {
    Bot::new(config.bot.token.clone())
}

/// Register the command list in the Telegram UI so clients can autocomplete.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "register and show the main menu"),
        BotCommand::new("farm", "farm points (8 hour cooldown)"),
        BotCommand::new("referral", "your referral link and stats"),
        BotCommand::new("missions", "list available missions"),
        BotCommand::new("claim1", "claim the Join Channel mission"),
        BotCommand::new("claim2", "claim the Watch Video mission"),
        BotCommand::new("game", "open the mining game"),
    ])
    .await?;

    Ok(())
}

/// Build the dispatcher: one branch for parsed commands, one for structured
/// messages coming back from the embedded game. All other free text falls
/// through to the default handler and is ignored.
pub fn dispatcher(
    bot: Bot,
    state: Arc<AppState>,
) -> Dispatcher<Bot, Box<dyn std::error::Error + Send + Sync>, DefaultKey> {
    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handlers::handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| matches!(msg.kind, MessageKind::WebAppData(_)))
                .endpoint(handlers::handle_web_app_data),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            tracing::trace!("ignoring update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "an error occurred while handling a bot update",
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() {
        assert!(matches!(
            Command::parse("/farm", "growsparkbot"),
            Ok(Command::Farm)
        ));
        assert!(matches!(
            Command::parse("/missions", "growsparkbot"),
            Ok(Command::Missions)
        ));
        assert!(matches!(
            Command::parse("/claim1", "growsparkbot"),
            Ok(Command::Claim1)
        ));
        assert!(matches!(
            Command::parse("/admin", "growsparkbot"),
            Ok(Command::Admin)
        ));
    }

    #[test]
    fn start_carries_referral_payload() {
        match Command::parse("/start 123456", "growsparkbot") {
            Ok(Command::Start(payload)) => assert_eq!(payload, "123456"),
            other => panic!("unexpected parse: {:?}", other),
        }
        match Command::parse("/start", "growsparkbot") {
            Ok(Command::Start(payload)) => assert!(payload.is_empty()),
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn free_text_is_not_a_command() {
        assert!(Command::parse("hello there", "growsparkbot").is_err());
    }
}
