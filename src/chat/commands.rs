//! Session command parsing.
//!
//! Commands start with `:` and are matched against the whole input line
//! verbatim.  Anything that is not exactly an alias is sent to the model.

/// A command that controls the session instead of being sent to the model.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Stop the session loop.
    Quit,

    /// Reset the transcript to the persona's initial messages.
    Clear,

    /// Re-execute the last user message.
    Rerun,

    /// Display help information.
    Help,
}

/// Aliases for [`SessionCommand::Quit`].
pub const COMMAND_QUIT: &[&str] = &[":quit", ":q"];
/// Aliases for [`SessionCommand::Clear`].
pub const COMMAND_CLEAR: &[&str] = &[":clear", ":c"];
/// Aliases for [`SessionCommand::Rerun`].
pub const COMMAND_RERUN: &[&str] = &[":rerun", ":r"];
/// Aliases for [`SessionCommand::Help`].
pub const COMMAND_HELP: &[&str] = &[":help", ":h", ":?"];

impl SessionCommand {
    /// Every command.
    pub const ALL: &'static [SessionCommand] = &[
        SessionCommand::Quit,
        SessionCommand::Clear,
        SessionCommand::Rerun,
        SessionCommand::Help,
    ];

    /// The input strings that select this command.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            SessionCommand::Quit => COMMAND_QUIT,
            SessionCommand::Clear => COMMAND_CLEAR,
            SessionCommand::Rerun => COMMAND_RERUN,
            SessionCommand::Help => COMMAND_HELP,
        }
    }
}

/// Parses user input for session commands.
///
/// Returns `Some(SessionCommand)` if the input is exactly one of the aliases,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use colloquy::chat::{SessionCommand, parse_command};
/// assert_eq!(parse_command(":q"), Some(SessionCommand::Quit));
/// assert_eq!(parse_command(":quit now"), None);
/// assert_eq!(parse_command("Hello!"), None);
/// ```
pub fn parse_command(input: &str) -> Option<SessionCommand> {
    SessionCommand::ALL
        .iter()
        .copied()
        .find(|command| command.aliases().iter().any(|alias| *alias == input))
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"
Commands:
- `:clear` / `:c` / Ctrl+C on an empty prompt - Clear the conversation.
- `:quit` / `:q` / Ctrl+D - Quit the program.
- `:rerun` / `:r` / Ctrl+R on an empty prompt - Re-run the last message.
- `:help` / `:h` / `:?` - Show this help message.

Press Ctrl+C while a response is streaming to stop it; the partial answer is kept.
Append `--model`, `--temperature`, `--top_p` or `--thinking_budget` to a message
to override a parameter for that message only.
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_alias_parses() {
        for command in SessionCommand::ALL {
            for alias in command.aliases() {
                assert_eq!(parse_command(alias), Some(*command), "alias {alias}");
            }
        }
    }

    #[test]
    fn matching_is_verbatim() {
        assert_eq!(parse_command(" :quit"), None);
        assert_eq!(parse_command(":quit "), None);
        assert_eq!(parse_command(":QUIT"), None);
        assert_eq!(parse_command(":quitter"), None);
        assert_eq!(parse_command("quit"), None);
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Hello!"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command(":"), None);
    }

    #[test]
    fn help_text_lists_commands() {
        let help = help_text();
        for command in SessionCommand::ALL {
            for alias in command.aliases() {
                assert!(help.contains(alias), "missing {alias}");
            }
        }
        for key in ["Ctrl+C on an empty prompt", "Ctrl+R on an empty prompt", "Ctrl+D"] {
            assert!(help.contains(key), "missing {key}");
        }
    }
}
