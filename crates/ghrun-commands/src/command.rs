use std::collections::BTreeMap;
use std::fmt;

pub const ADDTOKEN_USAGE: &str = "Usage: /addtoken <token>";
pub const RUN_USAGE: &str = "Usage: /run [ref] [key=value ...]";

#[derive(Clone, PartialEq, Eq)]
/// Enumerates supported bot `Command` values.
pub enum Command {
    Start,
    Help,
    AddToken {
        token: String,
    },
    DelToken,
    TokenStatus,
    Run {
        git_ref: Option<String>,
        inputs: BTreeMap<String, String>,
    },
    Malformed {
        usage: &'static str,
    },
    Unknown,
}

impl Command {
    /// Parses one chat message. The first word picks the command; a trailing
    /// `@botname` on it (group chat form) is ignored.
    pub fn parse(text: &str) -> Self {
        let mut words = text.split_whitespace();
        let Some(head) = words.next() else {
            return Self::Unknown;
        };
        let name = head
            .split('@')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match name.as_str() {
            "/start" => Self::Start,
            "/help" => Self::Help,
            "/addtoken" => match words.next() {
                Some(token) => Self::AddToken {
                    token: token.to_string(),
                },
                None => Self::Malformed {
                    usage: ADDTOKEN_USAGE,
                },
            },
            "/deltoken" => Self::DelToken,
            "/mytoken_status" => Self::TokenStatus,
            "/run" => parse_run_arguments(words),
            _ => Self::Unknown,
        }
    }

    /// Stable label for logs. Never includes arguments.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::AddToken { .. } => "addtoken",
            Self::DelToken => "deltoken",
            Self::TokenStatus => "mytoken_status",
            Self::Run { .. } => "run",
            Self::Malformed { .. } => "malformed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddToken { .. } => f
                .debug_struct("AddToken")
                .field("token", &"[REDACTED]")
                .finish(),
            Self::Run { git_ref, inputs } => f
                .debug_struct("Run")
                .field("git_ref", git_ref)
                .field("inputs", inputs)
                .finish(),
            Self::Malformed { usage } => f.debug_struct("Malformed").field("usage", usage).finish(),
            other => f.write_str(other.name()),
        }
    }
}

fn parse_run_arguments<'a>(words: impl Iterator<Item = &'a str>) -> Command {
    let mut git_ref = None;
    let mut inputs = BTreeMap::new();
    for word in words {
        match word.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                inputs.insert(key.to_string(), value.to_string());
            }
            Some(_) => return Command::Malformed { usage: RUN_USAGE },
            None if git_ref.is_none() && inputs.is_empty() => {
                git_ref = Some(word.to_string());
            }
            None => return Command::Malformed { usage: RUN_USAGE },
        }
    }
    Command::Run { git_ref, inputs }
}
