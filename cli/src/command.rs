//! Line commands accepted by the lesson prompt.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next,
    Back,
    /// 1-based option number on the current quiz page.
    Pick(usize),
    Submit,
    Reflect(String),
    Retry,
    Feed,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("type a command (help for a list)")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("not an option number: {0}")]
    BadOption(String),
}

pub const HELP: &str = "\
commands:
  next | n            next page
  back | b            previous page
  pick <n>            choose option n on the current quiz
  submit              submit the quiz
  reflect <text>      submit your reflection
  retry               re-send quiz results that failed to save
  feed                show recent community reflections
  status              show points and lock state
  quit | q            exit";

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        match word.to_ascii_lowercase().as_str() {
            "" => Err(ParseError::Empty),
            "next" | "n" => Ok(Command::Next),
            "back" | "b" => Ok(Command::Back),
            "pick" | "p" => {
                if rest.is_empty() {
                    return Err(ParseError::MissingArgument("pick"));
                }
                match rest.parse::<usize>() {
                    Ok(n) if n > 0 => Ok(Command::Pick(n)),
                    _ => Err(ParseError::BadOption(rest.to_owned())),
                }
            }
            "submit" | "s" => Ok(Command::Submit),
            "reflect" | "r" => Ok(Command::Reflect(rest.to_owned())),
            "retry" => Ok(Command::Retry),
            "feed" => Ok(Command::Feed),
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            other => Err(ParseError::Unknown(other.to_owned())),
        }
    }
}
