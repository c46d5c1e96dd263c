//! User commands, decoded once at the boundary and delivered to the control
//! loop over a `crossbeam-channel`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// Start a conversation without the wake word.
    Listen,
    /// Record a few seconds, report levels, play them back.
    MicTest,
    ToggleMute,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown command {:?} (try: l = listen, r = mic test, m = mute, q = quit)",
            self.0
        )
    }
}

impl std::error::Error for UnknownCommand {}

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Single-letter console codes or their long names, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "listen" => Ok(Self::Listen),
            "r" | "test" | "mic-test" => Ok(Self::MicTest),
            "m" | "mute" | "unmute" => Ok(Self::ToggleMute),
            "q" | "quit" | "exit" | "shutdown" => Ok(Self::Shutdown),
            _ => Err(UnknownCommand(s.trim().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_codes_decode() {
        assert_eq!("l".parse::<Command>(), Ok(Command::Listen));
        assert_eq!(" R \n".parse::<Command>(), Ok(Command::MicTest));
        assert_eq!("mute".parse::<Command>(), Ok(Command::ToggleMute));
        assert_eq!("quit".parse::<Command>(), Ok(Command::Shutdown));
    }

    #[test]
    fn unknown_command_keeps_input() {
        let err = "dance".parse::<Command>().unwrap_err();
        assert_eq!(err, UnknownCommand("dance".into()));
        assert!(err.to_string().contains("l = listen"));
    }
}
