//! Measurement kinds and their wire payloads.
//!
//! Payloads are plain UTF-8 text:
//! - acceleration: three comma-separated decimal floats (`"0.53,1.2,2.9"`)
//! - heartrate: a decimal integer (`"72"`)
//! - latitude / longitude: a decimal-degree string (`"51.5"`, `"-0.12"`)

use crate::models::patient::PatientField;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Payload parsing errors.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum SampleError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("invalid {measurement} payload '{payload}': {reason}")]
    InvalidPayload {
        measurement: Measurement,
        payload: String,
        reason: String,
    },

    #[error("unknown measurement kind: {0}")]
    UnknownMeasurement(String),
}

/// Measurement kind, the subtopic segment of a telemetry topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Measurement {
    Acceleration,
    Heartrate,
    Latitude,
    Longitude,
}

impl Measurement {
    /// Every measurement kind, in subscription order.
    pub const ALL: [Self; 4] = [
        Self::Acceleration,
        Self::Latitude,
        Self::Longitude,
        Self::Heartrate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acceleration => "acceleration",
            Self::Heartrate => "heartrate",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }

    /// The patient field this measurement persists to, if any.
    /// Acceleration is classified, never stored.
    pub fn persisted_field(self) -> Option<PatientField> {
        match self {
            Self::Acceleration => None,
            Self::Heartrate => Some(PatientField::Heartrate),
            Self::Latitude => Some(PatientField::Latitude),
            Self::Longitude => Some(PatientField::Longitude),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Measurement {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acceleration" => Ok(Self::Acceleration),
            "heartrate" => Ok(Self::Heartrate),
            "latitude" => Ok(Self::Latitude),
            "longitude" => Ok(Self::Longitude),
            other => Err(SampleError::UnknownMeasurement(other.to_owned())),
        }
    }
}

/// A single decoded telemetry sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// Raw axis readings. Arity is not enforced here; the fall detector
    /// treats anything other than three axes as a non-fall.
    Acceleration(Vec<f64>),
    Heartrate(u32),
    Latitude(String),
    Longitude(String),
}

impl Sample {
    /// Decode a payload published under the given measurement subtopic.
    pub fn parse(measurement: Measurement, payload: &[u8]) -> Result<Self, SampleError> {
        let text = std::str::from_utf8(payload).map_err(|_utf8_err| SampleError::NotUtf8)?;
        let text = text.trim();
        let invalid = |reason: String| SampleError::InvalidPayload {
            measurement,
            payload: text.to_owned(),
            reason,
        };

        match measurement {
            Measurement::Acceleration => text
                .split(',')
                .map(|axis| axis.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Acceleration)
                .map_err(|e| invalid(e.to_string())),
            Measurement::Heartrate => text
                .parse::<u32>()
                .map(Self::Heartrate)
                .map_err(|e| invalid(e.to_string())),
            Measurement::Latitude | Measurement::Longitude => {
                if text.is_empty() {
                    return Err(invalid("empty coordinate".to_owned()));
                }
                if measurement == Measurement::Latitude {
                    Ok(Self::Latitude(text.to_owned()))
                } else {
                    Ok(Self::Longitude(text.to_owned()))
                }
            }
        }
    }

    pub fn measurement(&self) -> Measurement {
        match *self {
            Self::Acceleration(_) => Measurement::Acceleration,
            Self::Heartrate(_) => Measurement::Heartrate,
            Self::Latitude(_) => Measurement::Latitude,
            Self::Longitude(_) => Measurement::Longitude,
        }
    }

    /// Encode to the textual wire payload.
    pub fn encode(&self) -> String {
        match self {
            Self::Acceleration(axes) => axes
                .iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::Heartrate(bpm) => bpm.to_string(),
            Self::Latitude(value) | Self::Longitude(value) => value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_names() {
        for measurement in Measurement::ALL {
            assert_eq!(measurement.as_str().parse::<Measurement>(), Ok(measurement));
        }
        assert!("pressure".parse::<Measurement>().is_err());
    }

    #[test]
    fn test_parse_acceleration() {
        let sample = Sample::parse(Measurement::Acceleration, b"0.5, 1.25,3").unwrap();
        assert_eq!(sample, Sample::Acceleration(vec![0.5, 1.25, 3.0]));
        assert_eq!(sample.encode(), "0.5,1.25,3");
    }

    #[test]
    fn test_parse_acceleration_keeps_short_samples() {
        let sample = Sample::parse(Measurement::Acceleration, b"1.0,2.0").unwrap();
        assert_eq!(sample, Sample::Acceleration(vec![1.0, 2.0]));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Sample::parse(Measurement::Acceleration, b"1.0,x,2.0").is_err());
        assert!(Sample::parse(Measurement::Heartrate, b"seventy").is_err());
        assert!(Sample::parse(Measurement::Latitude, b"  ").is_err());
        assert_eq!(
            Sample::parse(Measurement::Heartrate, &[0xff, 0xfe]),
            Err(SampleError::NotUtf8)
        );
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(
            Sample::parse(Measurement::Heartrate, b"72").unwrap(),
            Sample::Heartrate(72)
        );
        assert_eq!(
            Sample::parse(Measurement::Longitude, b"-0.12").unwrap(),
            Sample::Longitude("-0.12".to_owned())
        );
    }

    #[test]
    fn test_persisted_fields() {
        assert_eq!(Measurement::Acceleration.persisted_field(), None);
        assert_eq!(
            Measurement::Heartrate.persisted_field(),
            Some(PatientField::Heartrate)
        );
    }
}
