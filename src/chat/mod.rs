//! The interactive chat session and the pieces around it.
//!
//! - [`session`]: the turn engine; owns the transcript and talks to the assistant
//! - [`listener`]: observer traits the session reports to
//! - [`commands`]: `:quit`, `:clear`, `:rerun` and `:help`
//! - [`input`]: line editing and `--key value` override parsing
//! - [`config`]: command line and configuration file

mod commands;
pub mod config;
mod composite;
mod input;
mod interrupt;
mod listener;
mod session;

pub use commands::{
    COMMAND_CLEAR, COMMAND_HELP, COMMAND_QUIT, COMMAND_RERUN, SessionCommand, help_text,
    parse_command,
};
pub use composite::{CompositeChatListener, CompositeResponseStreamer};
pub use config::{AppConfig, ChatArgs};
pub use input::{LineEditorInput, parse_overrides};
pub use interrupt::Interrupt;
pub use listener::{
    ChatListener, NullChatListener, NullResponseStreamer, ResponseStreamer, StreamGuard,
    UserInputProvider,
};
pub use session::ChatSession;
