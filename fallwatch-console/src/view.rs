//! View models handed to the presentation layer.

use crate::alerts::AlertEntry;
use chrono::{DateTime, Utc};
use fallwatch_lib::models::{AlertId, PatientRecord};
use serde::Serialize;
use std::fmt::{self, Write as _};

const MAPS_URL: &str = "https://maps.google.co.uk";

/// One line of the alert list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertRow {
    pub id: AlertId,
    pub label: String,
}

impl AlertRow {
    pub fn from_entry(entry: &AlertEntry) -> Self {
        let time = entry.event.raised_at().format("%H:%M");
        let label = match &entry.patient {
            Some(patient) => format!("[{time}] - {}", patient.full_name()),
            None => format!("[{time}] - Unknown patient {}", entry.event.patient_id()),
        };
        Self {
            id: entry.event.id(),
            label,
        }
    }
}

/// Where to send help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationView {
    Coordinates { latitude: String, longitude: String },
    Address { address: String, postcode: String },
    Unknown,
}

impl LocationView {
    fn of(patient: &PatientRecord) -> Self {
        match patient.state.coordinates() {
            Some((latitude, longitude)) => Self::Coordinates {
                latitude: latitude.to_owned(),
                longitude: longitude.to_owned(),
            },
            None => Self::Address {
                address: patient.address.clone(),
                postcode: patient.postcode.clone(),
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Coordinates { .. } => "Location:",
            Self::Address { .. } | Self::Unknown => "Address:",
        }
    }

    pub fn map_url(&self) -> Option<String> {
        match self {
            Self::Coordinates {
                latitude,
                longitude,
            } => Some(format!("{MAPS_URL}/?q={latitude},{longitude}")),
            Self::Address { address, .. } => {
                Some(format!("{MAPS_URL}/place/{}", address.replace(' ', "+")))
            }
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for LocationView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinates {
                latitude,
                longitude,
            } => write!(f, "Lon: {longitude}, Lat: {latitude}"),
            Self::Address { address, postcode } => write!(f, "{address}\n{postcode}"),
            Self::Unknown => f.write_str("-"),
        }
    }
}

/// Detail panel for the selected alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertDetail {
    pub alert_id: AlertId,
    pub name: String,
    pub location: LocationView,
    pub heartrate: String,
    pub time_of_fall: String,
    pub allergies: Vec<String>,
    pub emergency_contacts: Vec<String>,
    pub map_url: Option<String>,
}

impl AlertDetail {
    pub fn from_entry(entry: &AlertEntry) -> Self {
        let time_of_fall = format_time_of_fall(entry.event.raised_at());
        match &entry.patient {
            Some(patient) => {
                let location = LocationView::of(patient);
                Self {
                    alert_id: entry.event.id(),
                    name: patient.full_name(),
                    map_url: location.map_url(),
                    location,
                    heartrate: format_heartrate(patient.state.heartrate),
                    time_of_fall,
                    allergies: patient.allergies.clone(),
                    emergency_contacts: patient
                        .emergency_contacts
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                }
            }
            None => Self {
                alert_id: entry.event.id(),
                name: format!("Unknown patient {}", entry.event.patient_id()),
                location: LocationView::Unknown,
                heartrate: format_heartrate(None),
                time_of_fall,
                allergies: Vec::new(),
                emergency_contacts: Vec::new(),
                map_url: None,
            },
        }
    }
}

fn format_heartrate(bpm: Option<u32>) -> String {
    match bpm {
        Some(bpm) => format!("{bpm} BPM"),
        None => "- BPM".to_owned(),
    }
}

fn format_time_of_fall(at: DateTime<Utc>) -> String {
    at.format("%d/%m/%Y at %I:%M %p").to_string()
}

/// Everything the presentation layer needs after a reconciliation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsoleView {
    pub alerts: Vec<AlertRow>,
    pub selected: Option<AlertDetail>,
    /// Result of the last operator action that needs acknowledging
    pub notice: Option<String>,
}

impl ConsoleView {
    /// Plain-text rendering for terminals.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Patient Alerts ({})", self.alerts.len());
        if self.alerts.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for row in &self.alerts {
            let marker = match &self.selected {
                Some(detail) if detail.alert_id == row.id => '>',
                _ => ' ',
            };
            let _ = writeln!(out, "{marker} #{:<4} {}", row.id.raw(), row.label);
        }

        if let Some(detail) = &self.selected {
            let _ = writeln!(out);
            let _ = writeln!(out, "Name:           {}", detail.name);
            let location = detail.location.to_string().replace('\n', ", ");
            let _ = writeln!(out, "{:<15} {location}", detail.location.label());
            let _ = writeln!(out, "Heart rate:     {}", detail.heartrate);
            let _ = writeln!(out, "Time of fall:   {}", detail.time_of_fall);
            let _ = writeln!(out, "Allergies:      {}", detail.allergies.join(", "));
            let _ = writeln!(out, "Contacts:");
            for contact in &detail.emergency_contacts {
                let _ = writeln!(out, "  {contact}");
            }
            if let Some(url) = &detail.map_url {
                let _ = writeln!(out, "Map:            {url}");
            }
        }

        if let Some(notice) = &self.notice {
            let _ = writeln!(out);
            let _ = writeln!(out, "! {notice}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fallwatch_lib::models::{AlertEvent, EmergencyContact, PatientId, PatientState};

    fn patient(state: PatientState) -> PatientRecord {
        PatientRecord {
            id: 3,
            firstname: "Grace".to_owned(),
            lastname: "Hopper".to_owned(),
            address: "1 Navy Yard".to_owned(),
            postcode: "DC1 2AB".to_owned(),
            allergies: vec!["Penicillin".to_owned()],
            emergency_contacts: vec![EmergencyContact {
                firstname: "Vincent".to_owned(),
                lastname: "Hopper".to_owned(),
                relationship: "Husband".to_owned(),
                phonenumber: "07700 900123".to_owned(),
            }],
            state,
        }
    }

    fn entry(patient: Option<PatientRecord>) -> AlertEntry {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).single().unwrap_or_default();
        AlertEntry {
            event: AlertEvent::new(AlertId::new(1), PatientId::new("3"), at),
            patient,
        }
    }

    #[test]
    fn test_row_label() {
        let row = AlertRow::from_entry(&entry(Some(patient(PatientState::default()))));
        assert_eq!(row.label, "[14:05] - Grace Hopper");

        let row = AlertRow::from_entry(&entry(None));
        assert_eq!(row.label, "[14:05] - Unknown patient 3");
    }

    #[test]
    fn test_detail_with_address() {
        let detail = AlertDetail::from_entry(&entry(Some(patient(PatientState::default()))));
        assert_eq!(detail.name, "Grace Hopper");
        assert_eq!(detail.location.label(), "Address:");
        assert_eq!(detail.location.to_string(), "1 Navy Yard\nDC1 2AB");
        assert_eq!(detail.heartrate, "- BPM");
        assert_eq!(detail.time_of_fall, "09/03/2024 at 02:05 PM");
        assert_eq!(
            detail.emergency_contacts,
            vec!["[Husband] - Vincent Hopper - 07700 900123".to_owned()]
        );
        assert_eq!(
            detail.map_url.as_deref(),
            Some("https://maps.google.co.uk/place/1+Navy+Yard")
        );
    }

    #[test]
    fn test_detail_with_coordinates() {
        let state = PatientState {
            heartrate: Some(71),
            latitude: Some("51.5".to_owned()),
            longitude: Some("-0.12".to_owned()),
        };
        let detail = AlertDetail::from_entry(&entry(Some(patient(state))));
        assert_eq!(detail.location.label(), "Location:");
        assert_eq!(detail.location.to_string(), "Lon: -0.12, Lat: 51.5");
        assert_eq!(detail.heartrate, "71 BPM");
        assert_eq!(
            detail.map_url.as_deref(),
            Some("https://maps.google.co.uk/?q=51.5,-0.12")
        );
    }

    #[test]
    fn test_one_coordinate_falls_back_to_address() {
        let state = PatientState {
            latitude: Some("51.5".to_owned()),
            ..PatientState::default()
        };
        let detail = AlertDetail::from_entry(&entry(Some(patient(state))));
        assert_eq!(detail.location.label(), "Address:");
    }

    #[test]
    fn test_render_marks_selection() {
        let entry = entry(Some(patient(PatientState::default())));
        let view = ConsoleView {
            alerts: vec![AlertRow::from_entry(&entry)],
            selected: Some(AlertDetail::from_entry(&entry)),
            notice: Some("No alert selected".to_owned()),
        };
        let text = view.render();
        assert!(text.contains("> #1    [14:05] - Grace Hopper"));
        assert!(text.contains("Address:        1 Navy Yard, DC1 2AB"));
        assert!(text.contains("! No alert selected"));
    }
}
