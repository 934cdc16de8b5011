//! Inbox responder: polls a platform inbox and answers new mentions with
//! generated replies, at most once per message.

pub mod bot;
pub mod config;
pub mod error;
pub mod llm;
pub mod platform;
