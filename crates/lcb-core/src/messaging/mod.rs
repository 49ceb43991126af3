//! Outbound messaging abstractions (Telegram Bot API today).

pub mod port;
pub mod throttled;
pub mod types;
