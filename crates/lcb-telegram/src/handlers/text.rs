use std::sync::Arc;

use teloxide::prelude::*;

use lcb_core::{domain::UserId, intake::extract_links};

use crate::router::AppState;

use super::{reply_text, store_links_and_reply, LinkSource, BUSY_REPLY};

pub async fn handle_text(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let user_id = UserId(user.id.0 as i64);
    if state.service.registry().is_running(user_id).await {
        reply_text(&bot, msg.chat.id, BUSY_REPLY).await;
        return Ok(());
    }

    let links = extract_links(text, &state.cfg.link_filter);
    store_links_and_reply(&bot, msg.chat.id, &state, user_id, links, LinkSource::Text).await;
    Ok(())
}
