//! Telegram update handlers.
//!
//! Each handler is a small adapter that turns a Bot API message into a call on the
//! link check service and answers with a plain-text reply.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{debug, warn};

use lcb_core::{domain::UserId, registry::RegistryError};

use crate::router::AppState;

mod commands;
mod document;
mod text;

pub(crate) const BUSY_REPLY: &str =
    "❌ A previous check is still running. Please wait for it to finish.";

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }
        return text::handle_text(bot, msg, state).await;
    }

    if msg.document().is_some() {
        return document::handle_document(bot, msg, state).await;
    }

    debug!(chat_id = msg.chat.id.0, "ignoring unsupported message type");
    Ok(())
}

/// Where a link list came from; only changes the wording of the replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LinkSource {
    Text,
    Document,
}

pub(crate) fn stored_reply(source: LinkSource, count: usize) -> String {
    match source {
        LinkSource::Text => {
            format!("✅ Found {count} links in your message. Send /check to start checking.")
        }
        LinkSource::Document => {
            format!("✅ File received. {count} links are ready to check. Now send /check.")
        }
    }
}

pub(crate) fn empty_reply(source: LinkSource) -> &'static str {
    match source {
        LinkSource::Text => {
            "No Telegram links found in this message. Put each link on its own line."
        }
        LinkSource::Document => "❌ No links found in this file.",
    }
}

/// Store `links` for the user (replacing any earlier list) and tell them.
pub(crate) async fn store_links_and_reply(
    bot: &Bot,
    chat_id: teloxide::types::ChatId,
    state: &AppState,
    user_id: UserId,
    links: Vec<String>,
    source: LinkSource,
) {
    let reply = if links.is_empty() {
        empty_reply(source).to_string()
    } else {
        match state.service.store_links(user_id, links).await {
            Ok(count) => stored_reply(source, count),
            Err(RegistryError::AlreadyRunning) => BUSY_REPLY.to_string(),
            Err(e) => format!("❌ {e}"),
        }
    };
    reply_text(bot, chat_id, &reply).await;
}

pub(crate) async fn reply_text(bot: &Bot, chat_id: teloxide::types::ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, text.to_string()).await {
        warn!(chat_id = chat_id.0, "failed to send reply: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_depend_on_source() {
        assert!(stored_reply(LinkSource::Text, 3).contains("3 links in your message"));
        assert!(stored_reply(LinkSource::Document, 60).starts_with("✅ File received. 60 links"));
        assert_ne!(
            empty_reply(LinkSource::Text),
            empty_reply(LinkSource::Document)
        );
    }
}
