//! Operator commands for the simulator console.

use fallwatch_bus::TopicCodec;
use fallwatch_lib::models::PatientId;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ControlError {
    #[error("expected a device number, got '{0}'")]
    InvalidDevice(String),

    #[error("no device {0}")]
    UnknownDevice(u32),

    #[error("'{0}' cannot be carried in a topic")]
    InvalidPatientId(String),

    #[error("'{action}' needs a value")]
    MissingValue { action: String },

    #[error("unknown command '{0}'; try: <n> enable|disable|toggle|fall|lat <v|->|lon <v|->|patient <id>, status, quit")]
    UnknownCommand(String),
}

/// What to do to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    Enable,
    Disable,
    Toggle,
    Fall,
    /// `None` clears the coordinate
    Latitude(Option<String>),
    Longitude(Option<String>),
    Patient(PatientId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Device { number: u32, action: DeviceAction },
    Status,
    Quit,
}

impl FromStr for ControlCommand {
    type Err = ControlError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["status" | "ls"] => return Ok(Self::Status),
            ["quit" | "exit" | "q"] => return Ok(Self::Quit),
            _ => {}
        }

        let [device, action, rest @ ..] = words.as_slice() else {
            return Err(ControlError::UnknownCommand(line.trim().to_owned()));
        };
        let number = device
            .parse::<u32>()
            .map_err(|_parse| ControlError::InvalidDevice((*device).to_owned()))?;

        let value = |action: &str| -> Result<Option<String>, ControlError> {
            match rest {
                [] => Err(ControlError::MissingValue {
                    action: action.to_owned(),
                }),
                ["-"] => Ok(None),
                values => Ok(Some(values.join(" "))),
            }
        };

        let action = match action.to_ascii_lowercase().as_str() {
            "enable" | "on" => DeviceAction::Enable,
            "disable" | "off" => DeviceAction::Disable,
            "toggle" => DeviceAction::Toggle,
            "fall" => DeviceAction::Fall,
            "lat" | "latitude" => DeviceAction::Latitude(value("lat")?),
            "lon" | "longitude" => DeviceAction::Longitude(value("lon")?),
            "patient" => match value("patient")? {
                Some(id) => {
                    let id = PatientId::new(id);
                    if !TopicCodec::is_valid_id(&id) {
                        return Err(ControlError::InvalidPatientId(id.to_string()));
                    }
                    DeviceAction::Patient(id)
                }
                None => {
                    return Err(ControlError::MissingValue {
                        action: "patient".to_owned(),
                    });
                }
            },
            _ => return Err(ControlError::UnknownCommand(line.trim().to_owned())),
        };

        Ok(Self::Device { number, action })
    }
}
