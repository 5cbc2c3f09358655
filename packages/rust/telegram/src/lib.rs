//! Telegram adapters for newsdigest.
//!
//! - [`PreviewClient`] reads public channel history from the `t.me/s/` web
//!   preview, which needs no user session.
//! - [`BotClient`] delivers digest parts through the Bot API and classifies
//!   failures into [`newsdigest_shared::FailureKind`].
//! - [`normalize_handle`] turns pasted channel references into bare handles.

mod bot;
mod handle;
mod preview;
mod web;

pub use bot::{BotClient, classify_api_error};
pub use handle::normalize_handle;
pub use web::PreviewClient;
