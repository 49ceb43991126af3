use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{MessagingCapabilities, SendOptions},
    Result,
};

/// Outbound notification port.
///
/// The validator and the service only ever send plain text; the Telegram adapter
/// decides how that maps onto Bot API calls.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str, opts: SendOptions)
        -> Result<MessageRef>;
}
