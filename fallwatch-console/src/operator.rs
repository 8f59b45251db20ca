//! Operator commands accepted by the console.

use fallwatch_lib::models::AlertId;
use std::str::FromStr;
use thiserror::Error;

/// Operator errors, surfaced to the operator as a notice.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperatorError {
    #[error("No alert selected")]
    NoSelection,

    #[error("Alert #{0} does not exist")]
    UnknownAlert(AlertId),

    #[error("Unknown command '{0}'; try: select <id>, deselect, dismiss [id], clear, list, quit")]
    UnknownCommand(String),

    #[error("'{command}' expects an alert number, got '{argument}'")]
    InvalidArgument { command: String, argument: String },
}

/// A parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Show the detail view for an alert
    Select(AlertId),
    Deselect,
    /// Dismiss one alert, or the selected one when no id is given
    Dismiss(Option<AlertId>),
    /// Dismiss every alert
    Clear,
    /// Re-print the current view
    List,
    Quit,
}

impl FromStr for OperatorCommand {
    type Err = OperatorError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();

        let alert_id = |argument: &str| {
            argument
                .trim_start_matches('#')
                .parse::<u64>()
                .map(AlertId::new)
                .map_err(|_parse| OperatorError::InvalidArgument {
                    command: command.clone(),
                    argument: argument.to_owned(),
                })
        };

        match (command.as_str(), argument) {
            ("select", Some(argument)) => Ok(Self::Select(alert_id(argument)?)),
            ("select", None) => Err(OperatorError::InvalidArgument {
                command: "select".to_owned(),
                argument: String::new(),
            }),
            ("deselect", _) => Ok(Self::Deselect),
            ("dismiss", Some(argument)) => Ok(Self::Dismiss(Some(alert_id(argument)?))),
            ("dismiss", None) => Ok(Self::Dismiss(None)),
            ("clear", _) => Ok(Self::Clear),
            ("list" | "ls", _) => Ok(Self::List),
            ("quit" | "exit" | "q", _) => Ok(Self::Quit),
            _ => Err(OperatorError::UnknownCommand(line.trim().to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("select 3".parse(), Ok(OperatorCommand::Select(AlertId::new(3))));
        assert_eq!("SELECT #4".parse(), Ok(OperatorCommand::Select(AlertId::new(4))));
        assert_eq!("deselect".parse(), Ok(OperatorCommand::Deselect));
        assert_eq!("dismiss".parse(), Ok(OperatorCommand::Dismiss(None)));
        assert_eq!(
            "dismiss 2".parse(),
            Ok(OperatorCommand::Dismiss(Some(AlertId::new(2))))
        );
        assert_eq!("clear".parse(), Ok(OperatorCommand::Clear));
        assert_eq!("  list ".parse(), Ok(OperatorCommand::List));
        assert_eq!("quit".parse(), Ok(OperatorCommand::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "select".parse::<OperatorCommand>(),
            Err(OperatorError::InvalidArgument { .. })
        ));
        assert!(matches!(
            "dismiss two".parse::<OperatorCommand>(),
            Err(OperatorError::InvalidArgument { .. })
        ));
        assert!(matches!(
            "reboot".parse::<OperatorCommand>(),
            Err(OperatorError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(OperatorError::NoSelection.to_string(), "No alert selected");
        assert_eq!(
            OperatorError::UnknownAlert(AlertId::new(9)).to_string(),
            "Alert #9 does not exist"
        );
    }
}
