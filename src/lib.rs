//! A terminal chat client for several model providers.
//!
//! The [`chat::ChatSession`] owns a transcript and drives turns against a
//! [`assistant::ChatAssistant`]; providers behind a [`provider::ProviderRegistry`]
//! do the talking, and [`chat::ChatListener`]s watch.

// Public modules
pub mod assistant;
pub mod chat;
pub mod cost;
pub mod error;
pub mod logging;
pub mod oneshot;
pub mod pricing;
pub mod provider;
pub mod providers;
pub mod render;
pub mod types;

mod observability;
mod sse;

// Re-exports
pub use assistant::{Assistant, AssistantConfig, ChatAssistant, init_assistant};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use provider::{CompletionParams, CompletionProvider, CompletionStream, ProviderRegistry};
pub use types::*;
