use std::sync::Arc;

use chrono::{DateTime, Utc};
use teloxide::prelude::*;

use lcb_core::{
    domain::{ChatId, UserId},
    intake::LinkFilter,
    registry::{JobSnapshot, RegistryError},
    validator::{describe_duration, ValidationPolicy},
};

use crate::router::AppState;

use super::reply_text;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

fn usage_text(filter: &LinkFilter, policy: &ValidationPolicy) -> String {
    let intake = match filter {
        LinkFilter::Marker(marker) => {
            format!("Only lines containing \"{marker}\" are kept, one link per line.")
        }
        LinkFilter::Verbatim => "Every non-empty line is treated as a link.".to_string(),
    };
    format!(
        "👋 Hi! I check Telegram invite links and usernames.\n\n\
         1️⃣ Send me a .txt file of links, or paste them directly in the chat.\n\
         2️⃣ Then send /check to start.\n\
         3️⃣ Use /status to see how far along a check is.\n\n\
         {intake}\n\
         Links are checked in batches of {batch}, one every {delay}, with a {rest} break between batches. \
         Results arrive as two lists when everything is done.",
        batch = policy.batch_size,
        delay = describe_duration(policy.call_delay),
        rest = describe_duration(policy.batch_rest),
    )
}

fn status_text(snapshot: Option<&JobSnapshot>, now: DateTime<Utc>) -> String {
    let Some(snapshot) = snapshot else {
        return "📭 No links stored. Send a .txt file or paste links first.".to_string();
    };

    let Some(run) = &snapshot.running else {
        return format!(
            "📋 {} links stored and ready. Send /check to start.",
            snapshot.stored_links
        );
    };

    let elapsed = now.signed_duration_since(run.started_at).num_seconds();
    format!(
        "⏳ Check running (batch {batch}).\n\
         Progress: {processed}/{total} links\n\
         ✅ Valid so far: {valid}\n\
         ❌ Invalid so far: {invalid}\n\
         Elapsed: {elapsed}",
        batch = run.batch.max(1),
        processed = run.processed,
        total = run.total,
        valid = run.valid,
        invalid = run.invalid,
        elapsed = format_duration(elapsed),
    )
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let user_id = UserId(user.id.0 as i64);
    let chat_id = msg.chat.id;
    let (cmd, _args) = parse_command(text);

    let reply = match cmd.as_str() {
        "start" | "help" => usage_text(&state.cfg.link_filter, &state.cfg.validation),
        "check" => match state.service.submit(user_id, ChatId(chat_id.0)).await {
            // The service sends its own acknowledgement.
            Ok(_) => return Ok(()),
            Err(RegistryError::NoLinks) => {
                "❌ First send a .txt file or a text message with links.".to_string()
            }
            Err(RegistryError::AlreadyRunning) => {
                "⏳ A check is already running. Use /status to follow it.".to_string()
            }
        },
        "status" => status_text(state.service.snapshot(user_id).await.as_ref(), Utc::now()),
        _ => format!("Unknown command /{cmd}. Send /start for help."),
    };

    reply_text(&bot, chat_id, &reply).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use lcb_core::registry::RunSnapshot;

    #[test]
    fn parses_command_with_bot_suffix() {
        assert_eq!(
            parse_command("/Check@link_bot now"),
            ("check".to_string(), "now".to_string())
        );
        assert_eq!(parse_command("/status"), ("status".to_string(), String::new()));
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(-3), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(61), "1m 1s");
        assert_eq!(format_duration(3725), "1h 2m 5s");
    }

    #[test]
    fn usage_mentions_marker_and_pacing() {
        let text = usage_text(&LinkFilter::default(), &ValidationPolicy::default());
        assert!(text.contains("\"t.me/\""));
        assert!(text.contains("batches of 50"));
        assert!(text.contains("15 seconds"));
        assert!(text.contains("5 minutes"));
        assert!(text.contains("/check"));

        let verbatim = usage_text(&LinkFilter::Verbatim, &ValidationPolicy::default());
        assert!(verbatim.contains("Every non-empty line"));
    }

    #[test]
    fn status_without_anything_stored() {
        assert!(status_text(None, Utc::now()).starts_with("📭"));
    }

    #[test]
    fn status_for_stored_links() {
        let snap = JobSnapshot {
            stored_links: 12,
            running: None,
        };
        assert_eq!(
            status_text(Some(&snap), Utc::now()),
            "📋 12 links stored and ready. Send /check to start."
        );
    }

    #[test]
    fn status_for_running_job() {
        let now = Utc::now();
        let snap = JobSnapshot {
            stored_links: 60,
            running: Some(RunSnapshot {
                chat_id: ChatId(1),
                started_at: now - Duration::seconds(125),
                total: 60,
                processed: 20,
                valid: 15,
                invalid: 5,
                batch: 1,
            }),
        };
        let text = status_text(Some(&snap), now);
        assert!(text.contains("Progress: 20/60 links"));
        assert!(text.contains("Valid so far: 15"));
        assert!(text.contains("Invalid so far: 5"));
        assert!(text.contains("Elapsed: 2m 5s"));
    }
}
