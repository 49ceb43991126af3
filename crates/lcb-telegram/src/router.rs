use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};
use tracing::{info, warn};

use lcb_core::{
    audit::AuditLogger,
    config::Config,
    lookup::ResolverConnector,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    service::LinkCheckService,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub service: Arc<LinkCheckService>,
}

/// Commands advertised in the Telegram client menu.
pub fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "How to use the link checker"),
        BotCommand::new("check", "Check the links you sent"),
        BotCommand::new("status", "Show progress of your current check"),
    ]
}

pub async fn run_polling(
    cfg: Arc<Config>,
    connector: Arc<dyn ResolverConnector>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!("link checker started: @{}", me.username()),
        Err(e) => warn!("get_me failed: {e}"),
    }
    if let Err(e) = bot.set_my_commands(bot_commands()).await {
        warn!("failed to register bot commands: {e}");
    }
    info!(
        "session file: {}, batch size: {}, delay: {:?}",
        cfg.mtproto.session_file.display(),
        cfg.validation.batch_size,
        cfg.validation.call_delay
    );

    // Raw Bot API messenger retries once on 429; the throttle keeps report bursts
    // under the per-chat limit in the first place.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(
        bot.clone(),
        cfg.telegram_message_limit,
    ));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let service = Arc::new(LinkCheckService::new(
        messenger,
        connector,
        cfg.validation.clone(),
        Some(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        )),
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        service: service.clone(),
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    info!("bot is online, press Ctrl+C to stop");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    let running = service.running_users().await;
    if !running.is_empty() {
        info!("stopping {} running link check(s)", running.len());
    }
    service.shutdown().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertises_user_commands() {
        let names: Vec<String> = bot_commands().into_iter().map(|c| c.command).collect();
        assert_eq!(names, vec!["start", "check", "status"]);
    }
}
