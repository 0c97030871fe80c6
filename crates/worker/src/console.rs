//! Line commands understood by `scadlive watch`.

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `set <name>=<value>`: set a model parameter.
    Set { name: String, value: String },
    /// `unset <name>`: remove a model parameter.
    Unset(String),
    Enable(String),
    Disable(String),
    /// Re-read the watched file.
    Reload,
    /// Render now, skipping the debounce delay.
    Run,
    Kill,
    /// Print a share token for the current state.
    Share,
    /// Restore the state carried by a share token.
    Load(String),
    /// List the compiler's experimental features.
    Features,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),

    #[error("Expected <name>=<value>, got {0:?}")]
    InvalidAssignment(String),
}

pub const HELP: &str = "\
commands:
  set <name>=<value>   set a model parameter
  unset <name>         remove a model parameter
  enable <feature>     enable an experimental feature
  disable <feature>    disable an experimental feature
  reload               re-read the source file
  run                  render now
  kill                 kill the running render
  share                print a share token
  load <token>         restore a share token
  features             list available experimental features
  quit                 stop watching";

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let argument = |name: &'static str| {
        if rest.is_empty() {
            Err(ParseError::MissingArgument(name))
        } else {
            Ok(rest.to_string())
        }
    };

    let command = match word {
        "set" => {
            let assignment = argument("set")?;
            let (name, value) = assignment
                .split_once('=')
                .map(|(n, v)| (n.trim(), v.trim()))
                .filter(|(n, _)| !n.is_empty())
                .ok_or_else(|| ParseError::InvalidAssignment(assignment.clone()))?;
            ConsoleCommand::Set {
                name: name.to_string(),
                value: value.to_string(),
            }
        }
        "unset" => ConsoleCommand::Unset(argument("unset")?),
        "enable" => ConsoleCommand::Enable(argument("enable")?),
        "disable" => ConsoleCommand::Disable(argument("disable")?),
        "load" => ConsoleCommand::Load(argument("load")?),
        "reload" => ConsoleCommand::Reload,
        "run" | "render" => ConsoleCommand::Run,
        "kill" => ConsoleCommand::Kill,
        "share" => ConsoleCommand::Share,
        "features" => ConsoleCommand::Features,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}
