/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_link_previews: bool,
    pub max_message_len: usize,
}

/// Per-message delivery options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub disable_link_preview: bool,
}

impl SendOptions {
    pub fn plain() -> Self {
        Self::default()
    }

    /// Used for link reports so Telegram does not unfurl the first link.
    pub fn without_preview() -> Self {
        Self {
            disable_link_preview: true,
        }
    }
}
