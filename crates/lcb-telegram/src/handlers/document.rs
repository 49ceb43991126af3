use std::sync::Arc;

use teloxide::{net::Download, prelude::*};
use tracing::warn;

use lcb_core::{
    domain::UserId,
    intake::{decode_document, extract_links},
};

use crate::router::AppState;

use super::{reply_text, store_links_and_reply, LinkSource, BUSY_REPLY};

fn text_extensions() -> &'static [&'static str] {
    &[".txt", ".csv", ".list", ".md", ".log"]
}

fn is_text_file(name: &str, mime: Option<&str>) -> bool {
    let lower = name.to_lowercase();
    if let Some(m) = mime {
        if m.starts_with("text/") {
            return true;
        }
    }
    text_extensions().iter().any(|ext| lower.ends_with(ext))
}

fn too_large_reply(size: u64, limit: u64) -> String {
    format!(
        "❌ File too large ({} KB). The limit is {} KB.",
        size.div_ceil(1024),
        limit / 1024
    )
}

async fn download_document(bot: &Bot, doc: &teloxide::types::Document) -> anyhow::Result<Vec<u8>> {
    let file = bot.get_file(doc.file.id.clone()).await?;
    let mut buf: Vec<u8> = Vec::new();
    bot.download_file(&file.path, &mut buf).await?;
    Ok(buf)
}

pub async fn handle_document(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(doc) = msg.document() else {
        return Ok(());
    };

    let user_id = UserId(user.id.0 as i64);
    let chat_id = msg.chat.id;

    if state.service.registry().is_running(user_id).await {
        reply_text(&bot, chat_id, BUSY_REPLY).await;
        return Ok(());
    }

    let file_name = doc.file_name.as_deref().unwrap_or("document");
    let mime = doc.mime_type.as_ref().map(|m| m.essence_str().to_string());
    if !is_text_file(file_name, mime.as_deref()) {
        reply_text(
            &bot,
            chat_id,
            "❌ Please send the links as a plain-text (.txt) file.",
        )
        .await;
        return Ok(());
    }

    let size = doc.file.size as u64;
    if size > state.cfg.max_document_size {
        reply_text(&bot, chat_id, &too_large_reply(size, state.cfg.max_document_size)).await;
        return Ok(());
    }

    let bytes = match download_document(&bot, doc).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(user_id = user_id.0, file_name, "document download failed: {e}");
            reply_text(&bot, chat_id, "❌ Could not download the file. Please try again.").await;
            return Ok(());
        }
    };

    let text = match decode_document(&bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(user_id = user_id.0, file_name, "document rejected: {e}");
            reply_text(
                &bot,
                chat_id,
                "❌ Could not read the file. Make sure it is UTF-8 encoded text.",
            )
            .await;
            return Ok(());
        }
    };

    let links = extract_links(&text, &state.cfg.link_filter);
    store_links_and_reply(&bot, chat_id, &state, user_id, links, LinkSource::Document).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_text_files_by_mime_or_extension() {
        assert!(is_text_file("links.txt", None));
        assert!(is_text_file("LINKS.TXT", Some("application/octet-stream")));
        assert!(is_text_file("noext", Some("text/plain")));
        assert!(is_text_file("export.csv", None));
    }

    #[test]
    fn rejects_binary_files() {
        assert!(!is_text_file("photo.jpg", Some("image/jpeg")));
        assert!(!is_text_file("archive.zip", None));
        assert!(!is_text_file("report.pdf", Some("application/pdf")));
    }

    #[test]
    fn size_reply_rounds_up() {
        assert_eq!(
            too_large_reply(1025, 1024 * 1024),
            "❌ File too large (2 KB). The limit is 1024 KB."
        );
    }
}
