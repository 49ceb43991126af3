//! Core logic for the link checker bot.
//!
//! This crate is framework-agnostic. The Telegram Bot API and the MTProto lookup
//! client live behind ports (traits) implemented in adapter crates.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intake;
pub mod link;
pub mod logging;
pub mod lookup;
pub mod messaging;
pub mod registry;
pub mod report;
pub mod service;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
