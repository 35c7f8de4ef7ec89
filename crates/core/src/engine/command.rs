use crate::animation::AttentionLevel;
use crate::breath::PatternKind;
use std::str::FromStr;

/// A user action forwarded to the engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    StartSession,
    StopSession,
    ToggleSession,
    SetPattern(PatternKind),
    SetAttention(AttentionLevel),
    SetIntensity(f32),
    SetVolume(f32),
    ToggleAudio,
    ToggleDetection,
    ToggleResponse,
    Shutdown,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{verb} needs a value")]
    MissingArgument { verb: &'static str },
    #[error("invalid {verb} value {value:?}: {details}")]
    InvalidArgument {
        verb: &'static str,
        value: String,
        details: String,
    },
}

impl Command {
    /// Parse one input line: a keyboard shortcut (`space`, `e`, `r`, `a`, `q`)
    /// or a verb with an optional argument, e.g. `pattern box` or `volume 0.7`.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        // A bare space is the session shortcut; anything else is trimmed.
        if !line.is_empty() && line.trim_matches(|c: char| c == '\n' || c == '\r') == " " {
            return Ok(Self::ToggleSession);
        }
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CommandParseError::Empty);
        };
        let arg = words.next();
        let verb = verb.to_ascii_lowercase();

        match verb.as_str() {
            "space" | "toggle" => Ok(Self::ToggleSession),
            "start" => Ok(Self::StartSession),
            "stop" => Ok(Self::StopSession),
            "e" | "detect" | "detection" => Ok(Self::ToggleDetection),
            "r" | "respond" | "response" => Ok(Self::ToggleResponse),
            "a" | "audio" => Ok(Self::ToggleAudio),
            "q" | "quit" | "exit" => Ok(Self::Shutdown),
            "pattern" => parse_arg("pattern", arg).map(Self::SetPattern),
            "attention" => parse_arg("attention", arg).map(Self::SetAttention),
            "intensity" => parse_level("intensity", arg).map(Self::SetIntensity),
            "volume" => parse_level("volume", arg).map(Self::SetVolume),
            _ => Err(CommandParseError::Unknown(line.trim().to_owned())),
        }
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_arg<T>(verb: &'static str, arg: Option<&str>) -> Result<T, CommandParseError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = arg.ok_or(CommandParseError::MissingArgument { verb })?;
    value
        .parse()
        .map_err(|e: T::Err| CommandParseError::InvalidArgument {
            verb,
            value: value.to_owned(),
            details: e.to_string(),
        })
}

fn parse_level(verb: &'static str, arg: Option<&str>) -> Result<f32, CommandParseError> {
    let level: f32 = parse_arg(verb, arg)?;
    if !(0.0..=1.0).contains(&level) {
        return Err(CommandParseError::InvalidArgument {
            verb,
            value: level.to_string(),
            details: "must be within [0, 1]".to_owned(),
        });
    }
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts() {
        assert_eq!(Command::parse(" "), Ok(Command::ToggleSession));
        assert_eq!(Command::parse(" \n"), Ok(Command::ToggleSession));
        assert_eq!(Command::parse("space"), Ok(Command::ToggleSession));
        assert_eq!(Command::parse("E"), Ok(Command::ToggleDetection));
        assert_eq!(Command::parse("r"), Ok(Command::ToggleResponse));
        assert_eq!(Command::parse("a"), Ok(Command::ToggleAudio));
        assert_eq!(Command::parse("q\n"), Ok(Command::Shutdown));
    }

    #[test]
    fn verbs_with_values() {
        assert_eq!(
            Command::parse("pattern 4-7-8"),
            Ok(Command::SetPattern(PatternKind::FourSevenEight))
        );
        assert_eq!(
            Command::parse("attention dynamic"),
            Ok(Command::SetAttention(AttentionLevel::Dynamic))
        );
        assert_eq!(Command::parse("volume 0.7"), Ok(Command::SetVolume(0.7)));
        assert_eq!("intensity 1".parse::<Command>(), Ok(Command::SetIntensity(1.0)));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(Command::parse(""), Err(CommandParseError::Empty));
        assert_eq!(Command::parse("\n"), Err(CommandParseError::Empty));
        assert_eq!(
            Command::parse("volume"),
            Err(CommandParseError::MissingArgument { verb: "volume" })
        );
        assert!(matches!(
            Command::parse("volume 2"),
            Err(CommandParseError::InvalidArgument { verb: "volume", .. })
        ));
        assert!(matches!(
            Command::parse("pattern square"),
            Err(CommandParseError::InvalidArgument { verb: "pattern", .. })
        ));
        assert_eq!(
            Command::parse("dance"),
            Err(CommandParseError::Unknown("dance".to_owned()))
        );
    }
}
