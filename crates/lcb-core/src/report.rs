//! Result reports: link lists chunked to the messenger's message limit.

use tracing::warn;

use crate::{
    domain::ChatId,
    messaging::{port::MessagingPort, types::SendOptions},
};

pub const VALID_HEADER: &str = "✅ Valid Links:";
pub const INVALID_HEADER: &str = "❌ Invalid/Expired Links:";

const SEPARATOR_LEN: usize = 20;

/// Build report messages for `links`.
///
/// The first chunk opens with `header` and a separator line; each link occupies its
/// own line. No chunk exceeds `max_len` characters. An empty list yields no chunks.
pub fn chunk_links(header: &str, links: &[String], max_len: usize) -> Vec<String> {
    if links.is_empty() {
        return Vec::new();
    }
    let max_len = max_len.max(2);

    let mut out = Vec::new();
    let mut chunk = format!("{header}\n{}\n", "-".repeat(SEPARATOR_LEN));
    let mut chunk_len = chunk.chars().count();

    for link in links {
        for piece in split_chars(link, max_len - 1) {
            let piece_len = piece.chars().count();
            if chunk_len > 0 && chunk_len + piece_len + 1 > max_len {
                out.push(std::mem::take(&mut chunk));
                chunk_len = 0;
            }
            chunk.push_str(piece);
            chunk.push('\n');
            chunk_len += piece_len + 1;
        }
    }

    if chunk_len > 0 {
        out.push(chunk);
    }
    out
}

/// Split `s` into pieces of at most `max_chars` characters (on char boundaries).
fn split_chars(s: &str, max_chars: usize) -> Vec<&str> {
    if s.chars().count() <= max_chars {
        return vec![s];
    }
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;
    for (idx, _) in s.char_indices() {
        if count == max_chars {
            pieces.push(&s[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    pieces.push(&s[start..]);
    pieces
}

/// Send a chunked report with link previews disabled.
///
/// Delivery is best-effort per chunk; returns how many chunks were delivered.
pub async fn send_link_report(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    header: &str,
    links: &[String],
) -> usize {
    let max_len = messenger.capabilities().max_message_len;
    let mut delivered = 0usize;
    for chunk in chunk_links(header, links, max_len) {
        match messenger
            .send_text(chat_id, &chunk, SendOptions::without_preview())
            .await
        {
            Ok(_) => delivered += 1,
            Err(e) => warn!("failed to send report chunk ({header}): {e}"),
        }
    }
    delivered
}
