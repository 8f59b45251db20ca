//! Telemetry topic encoding and MQTT-style topic filters.
//!
//! Topics have the shape `<PREFIX>P?<patient id>/<subtopic>`, for example
//! `BS2203FDP?3/acceleration`.
//!
//! # Legacy id decoding
//!
//! Deployed operator consoles decode only the first character of the id
//! segment, so `BS2203FDP?12/heartrate` is attributed to patient `1`. That
//! behaviour is kept as the default to stay interoperable with them;
//! [`TopicCodec::with_full_ids`] decodes the whole segment instead.

use fallwatch_lib::models::{Measurement, PatientId};
use thiserror::Error;

/// Topic encoding and decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TopicError {
    #[error("malformed topic '{topic}': {reason}")]
    Malformed { topic: String, reason: &'static str },

    #[error("unknown subtopic '{subtopic}' in topic '{topic}'")]
    UnknownSubtopic { topic: String, subtopic: String },
}

/// How the id segment of a topic is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdDecoding {
    /// First character only, matching deployed consoles
    #[default]
    FirstChar,
    /// The complete id segment
    Full,
}

/// Bijective mapping between (patient id, measurement) and topic strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCodec {
    prefix: String,
    id_decoding: IdDecoding,
}

impl TopicCodec {
    /// Codec with legacy first-character id decoding.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            id_decoding: IdDecoding::FirstChar,
        }
    }

    /// Codec that decodes the complete id segment.
    pub fn with_full_ids(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            id_decoding: IdDecoding::Full,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn id_decoding(&self) -> IdDecoding {
        self.id_decoding
    }

    /// Whether an id can be carried in a topic without corrupting its
    /// structure.
    pub fn is_valid_id(id: &PatientId) -> bool {
        let id = id.as_str();
        !id.is_empty() && !id.contains(['/', '?', '+', '#'])
    }

    /// Encode a topic for the given patient and measurement.
    pub fn encode(&self, id: &PatientId, measurement: Measurement) -> String {
        format!("{}P?{}/{}", self.prefix, id, measurement)
    }

    /// Decode a topic into its patient id and measurement.
    pub fn decode(&self, topic: &str) -> Result<(PatientId, Measurement), TopicError> {
        let malformed = |reason| TopicError::Malformed {
            topic: topic.to_owned(),
            reason,
        };

        let (_, rest) = topic
            .split_once('?')
            .ok_or_else(|| malformed("missing '?' separator"))?;
        let (id_segment, subtopic) = rest
            .split_once('/')
            .ok_or_else(|| malformed("missing '/' separator"))?;

        let id = match self.id_decoding {
            IdDecoding::Full => id_segment,
            IdDecoding::FirstChar => id_segment
                .chars()
                .next()
                .map_or("", |first| &id_segment[..first.len_utf8()]),
        };
        if id.is_empty() {
            return Err(malformed("empty patient id"));
        }

        let measurement =
            subtopic
                .parse::<Measurement>()
                .map_err(|_unknown| TopicError::UnknownSubtopic {
                    topic: topic.to_owned(),
                    subtopic: subtopic.to_owned(),
                })?;

        Ok((PatientId::new(id), measurement))
    }

    /// One topic per measurement kind for a patient.
    pub fn subscription_topics(&self, id: &PatientId) -> Vec<String> {
        Measurement::ALL
            .iter()
            .map(|measurement| self.encode(id, *measurement))
            .collect()
    }
}

/// An MQTT topic filter supporting `+` (one level) and `#` (remaining levels).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicFilter {
    /// The filter string (e.g., "BS2203FDP?+/heartrate")
    pub filter: String,
    /// Whether this filter contains wildcards
    pub is_wildcard: bool,
}

impl TopicFilter {
    /// Create a new topic filter
    pub fn new(filter: impl Into<String>) -> Self {
        let filter = filter.into();
        let is_wildcard = filter.contains(['+', '#']);
        Self {
            filter,
            is_wildcard,
        }
    }

    /// Check if this filter matches a topic
    pub fn matches(&self, topic: &str) -> bool {
        if self.is_wildcard {
            self.matches_wildcard(topic)
        } else {
            self.filter == topic
        }
    }

    fn matches_wildcard(&self, topic: &str) -> bool {
        let mut topic_levels = topic.split('/');

        for filter_level in self.filter.split('/') {
            if filter_level == "#" {
                return true;
            }
            match topic_levels.next() {
                Some(topic_level) if filter_level == "+" || filter_level == topic_level => {}
                _ => return false,
            }
        }

        topic_levels.next().is_none()
    }
}
