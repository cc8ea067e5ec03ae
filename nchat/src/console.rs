//! Line-oriented command parser for the interactive console.

/// Help text printed by the `help` command.
pub const HELP: &str = "\
commands:
  help                                  show this text
  profiles                              list loaded profiles
  chats <profile>                       list chats, most recent first
  history <profile> <chat> [limit]      show cached history, fetching if needed
  send <profile> <chat> <text...>       send a text message
  read <profile> <chat> <msg>           mark a message read
  delete <profile> <chat> <msg>         delete a message
  typing <profile> <chat> on|off        send a typing indicator
  status <profile> online|offline       set own online status
  quit                                  log out and exit";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the command list.
    Help,
    /// List loaded profiles and their connection state.
    Profiles,
    /// List a profile's chats.
    Chats {
        profile_id: String,
    },
    /// Show a chat's recent messages.
    History {
        profile_id: String,
        chat_id: String,
        /// Falls back to the configured history limit.
        limit: Option<usize>,
    },
    /// Send a text message.
    Send {
        profile_id: String,
        chat_id: String,
        text: String,
    },
    /// Mark a message read.
    Read {
        profile_id: String,
        chat_id: String,
        msg_id: String,
    },
    /// Delete a message.
    Delete {
        profile_id: String,
        chat_id: String,
        msg_id: String,
    },
    /// Start or stop the typing indicator in a chat.
    Typing {
        profile_id: String,
        chat_id: String,
        is_typing: bool,
    },
    /// Set our own online status.
    Status {
        profile_id: String,
        is_online: bool,
    },
    /// Log out and exit.
    Quit,
}

/// Why a console line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The first word is not a command.
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    /// Wrong arguments for a known command.
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        let Some((verb, rest)) = split_word(line) else {
            return Ok(None);
        };

        let command = match verb {
            "help" | "?" => Self::Help,
            "profiles" => Self::Profiles,
            "quit" | "exit" => Self::Quit,
            "chats" => {
                let [profile_id] = words(rest, "chats <profile>")?;
                Self::Chats { profile_id }
            }
            "history" => {
                const USAGE: &str = "history <profile> <chat> [limit]";
                let (profile_id, rest) = split_word(rest).ok_or(ParseError::Usage(USAGE))?;
                let (chat_id, rest) = split_word(rest).ok_or(ParseError::Usage(USAGE))?;
                let limit = match split_word(rest) {
                    None => None,
                    Some((n, "")) => Some(n.parse().map_err(|_| ParseError::Usage(USAGE))?),
                    Some(_) => return Err(ParseError::Usage(USAGE)),
                };
                Self::History {
                    profile_id: profile_id.to_string(),
                    chat_id: chat_id.to_string(),
                    limit,
                }
            }
            "send" => {
                const USAGE: &str = "send <profile> <chat> <text...>";
                let (profile_id, rest) = split_word(rest).ok_or(ParseError::Usage(USAGE))?;
                let (chat_id, text) = split_word(rest).ok_or(ParseError::Usage(USAGE))?;
                if text.is_empty() {
                    return Err(ParseError::Usage(USAGE));
                }
                Self::Send {
                    profile_id: profile_id.to_string(),
                    chat_id: chat_id.to_string(),
                    text: text.to_string(),
                }
            }
            "read" => {
                let [profile_id, chat_id, msg_id] = words(rest, "read <profile> <chat> <msg>")?;
                Self::Read {
                    profile_id,
                    chat_id,
                    msg_id,
                }
            }
            "delete" => {
                let [profile_id, chat_id, msg_id] =
                    words(rest, "delete <profile> <chat> <msg>")?;
                Self::Delete {
                    profile_id,
                    chat_id,
                    msg_id,
                }
            }
            "typing" => {
                const USAGE: &str = "typing <profile> <chat> on|off";
                let [profile_id, chat_id, flag] = words(rest, USAGE)?;
                let is_typing = match flag.as_str() {
                    "on" => true,
                    "off" => false,
                    _ => return Err(ParseError::Usage(USAGE)),
                };
                Self::Typing {
                    profile_id,
                    chat_id,
                    is_typing,
                }
            }
            "status" => {
                const USAGE: &str = "status <profile> online|offline";
                let [profile_id, flag] = words(rest, USAGE)?;
                let is_online = match flag.as_str() {
                    "online" => true,
                    "offline" => false,
                    _ => return Err(ParseError::Usage(USAGE)),
                };
                Self::Status {
                    profile_id,
                    is_online,
                }
            }
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Split off the first whitespace-delimited word.
fn split_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    Some(match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    })
}

/// Exactly `N` words, or a usage error.
fn words<const N: usize>(input: &str, usage: &'static str) -> Result<[String; N], ParseError> {
    let parts: Vec<String> = input.split_whitespace().map(str::to_string).collect();
    parts.try_into().map_err(|_| ParseError::Usage(usage))
}
