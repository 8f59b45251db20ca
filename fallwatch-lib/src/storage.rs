//! Patient datastore backed by redb.
//!
//! The store mirrors the relational layout the operator tooling expects:
//! a `patients` table holding identity and the latest telemetry state, plus
//! `allergies` and `emergency_contacts` tables keyed by patient id. Rows are
//! JSON-encoded. redb serialises write transactions internally, but within
//! the console only the persistence writer issues telemetry updates; every
//! other component reads.

use crate::models::{
    EmergencyContact, NewPatient, PatientField, PatientId, PatientRecord, PatientState,
};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] redb::Error),

    #[error("Database error: {0}")]
    DatabaseError2(#[from] redb::DatabaseError),

    #[error("Storage error: {0}")]
    StorageError(#[from] redb::StorageError),

    #[error("Table error: {0}")]
    TableError(#[from] redb::TableError),

    #[error("Transaction error: {0}")]
    TransactionError(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    CommitError(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid patient id: '{id}'")]
    InvalidPatientId { id: String },

    #[error("Record not found: {id}")]
    RecordNotFound { id: u64 },

    #[error("Invalid value '{value}' for field {field}")]
    InvalidFieldValue { field: PatientField, value: String },
}

/// Table definitions for the database schema.
pub struct Tables;

impl Tables {
    /// Patient identity and latest state, keyed by patient id
    pub const PATIENTS: TableDefinition<'static, u64, &[u8]> = TableDefinition::new("patients");

    /// JSON list of allergy names per patient
    pub const ALLERGIES: TableDefinition<'static, u64, &[u8]> = TableDefinition::new("allergies");

    /// JSON list of emergency contacts per patient
    pub const EMERGENCY_CONTACTS: TableDefinition<'static, u64, &[u8]> =
        TableDefinition::new("emergency_contacts");

    /// Store metadata such as the id allocator
    pub const META: TableDefinition<'static, &str, u64> = TableDefinition::new("meta");
}

const NEXT_PATIENT_ID: &str = "next_patient_id";

/// Stored shape of a `patients` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PatientRow {
    firstname: String,
    lastname: String,
    address: String,
    postcode: String,
    #[serde(default)]
    heartrate: Option<u32>,
    #[serde(default)]
    latitude: Option<String>,
    #[serde(default)]
    longitude: Option<String>,
}

impl PatientRow {
    fn apply(&mut self, field: PatientField, value: &str) -> Result<(), StorageError> {
        let value = value.trim();
        let invalid = || StorageError::InvalidFieldValue {
            field,
            value: value.to_owned(),
        };

        match field {
            PatientField::Heartrate => {
                self.heartrate = Some(value.parse().map_err(|_parse_err| invalid())?);
            }
            PatientField::Latitude | PatientField::Longitude => {
                if value.is_empty() {
                    return Err(invalid());
                }
                if field == PatientField::Latitude {
                    self.latitude = Some(value.to_owned());
                } else {
                    self.longitude = Some(value.to_owned());
                }
            }
        }
        Ok(())
    }
}

/// Database manager for FallWatch patient storage.
pub struct DatabaseManager {
    db: Database,
}

impl DatabaseManager {
    /// Create (or open) a database and make sure every table exists.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path)?;
        let manager = Self { db };
        manager.initialize_schema()?;
        Ok(manager)
    }

    /// Open an existing database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::open(path)?;
        let manager = Self { db };
        manager.initialize_schema()?;
        Ok(manager)
    }

    fn initialize_schema(&self) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write()?;
        {
            write_txn.open_table(Tables::PATIENTS)?;
            write_txn.open_table(Tables::ALLERGIES)?;
            write_txn.open_table(Tables::EMERGENCY_CONTACTS)?;
            write_txn.open_table(Tables::META)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Register a new patient and return the allocated id.
    pub fn insert_patient(&self, patient: &NewPatient) -> Result<u64, StorageError> {
        let row = PatientRow {
            firstname: patient.firstname.clone(),
            lastname: patient.lastname.clone(),
            address: patient.address.clone(),
            postcode: patient.postcode.clone(),
            heartrate: None,
            latitude: None,
            longitude: None,
        };
        let encoded = serde_json::to_vec(&row)?;

        let write_txn = self.db.begin_write()?;
        let id = {
            let mut meta = write_txn.open_table(Tables::META)?;
            let id = meta.get(NEXT_PATIENT_ID)?.map_or(1, |guard| guard.value());
            meta.insert(NEXT_PATIENT_ID, id.saturating_add(1))?;

            let mut patients = write_txn.open_table(Tables::PATIENTS)?;
            patients.insert(id, encoded.as_slice())?;
            id
        };
        write_txn.commit()?;
        Ok(id)
    }

    /// Attach an allergy to an existing patient.
    pub fn add_allergy(&self, id: u64, name: &str) -> Result<(), StorageError> {
        self.append_to_list(Tables::ALLERGIES, id, name.to_owned())
    }

    /// Attach an emergency contact to an existing patient.
    pub fn add_emergency_contact(
        &self,
        id: u64,
        contact: &EmergencyContact,
    ) -> Result<(), StorageError> {
        self.append_to_list(Tables::EMERGENCY_CONTACTS, id, contact.clone())
    }

    fn append_to_list<T>(
        &self,
        table: TableDefinition<'static, u64, &'static [u8]>,
        id: u64,
        item: T,
    ) -> Result<(), StorageError>
    where
        T: Serialize + for<'de> Deserialize<'de>,
    {
        let write_txn = self.db.begin_write()?;
        {
            let patients = write_txn.open_table(Tables::PATIENTS)?;
            if patients.get(id)?.is_none() {
                return Err(StorageError::RecordNotFound { id });
            }

            let mut list_table = write_txn.open_table(table)?;
            let mut items: Vec<T> = match list_table.get(id)? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => Vec::new(),
            };
            items.push(item);
            let encoded = serde_json::to_vec(&items)?;
            list_table.insert(id, encoded.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Ids of every registered patient, ascending.
    pub fn get_patient_ids(&self) -> Result<Vec<u64>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let patients = read_txn.open_table(Tables::PATIENTS)?;

        let mut ids = Vec::new();
        for entry in patients.iter()? {
            let (key, _) = entry?;
            ids.push(key.value());
        }
        Ok(ids)
    }

    /// Fetch a full patient record, joined with allergies and contacts.
    pub fn get_patient(&self, id: u64) -> Result<Option<PatientRecord>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let patients = read_txn.open_table(Tables::PATIENTS)?;
        let Some(guard) = patients.get(id)? else {
            return Ok(None);
        };
        let row: PatientRow = serde_json::from_slice(guard.value())?;

        let allergies_table = read_txn.open_table(Tables::ALLERGIES)?;
        let allergies: Vec<String> = match allergies_table.get(id)? {
            Some(guard) => serde_json::from_slice(guard.value())?,
            None => Vec::new(),
        };

        let contacts_table = read_txn.open_table(Tables::EMERGENCY_CONTACTS)?;
        let emergency_contacts: Vec<EmergencyContact> = match contacts_table.get(id)? {
            Some(guard) => serde_json::from_slice(guard.value())?,
            None => Vec::new(),
        };

        Ok(Some(PatientRecord {
            id,
            firstname: row.firstname,
            lastname: row.lastname,
            address: row.address,
            postcode: row.postcode,
            allergies,
            emergency_contacts,
            state: PatientState {
                heartrate: row.heartrate,
                latitude: row.latitude,
                longitude: row.longitude,
            },
        }))
    }

    /// Fetch a patient by bus identifier. Non-numeric ids resolve to `None`.
    pub fn get_patient_by_id(
        &self,
        patient_id: &PatientId,
    ) -> Result<Option<PatientRecord>, StorageError> {
        match patient_id.as_key() {
            Some(id) => self.get_patient(id),
            None => Ok(None),
        }
    }

    /// Apply one telemetry field update to a patient row.
    pub fn apply_field_update(
        &self,
        patient_id: &PatientId,
        field: PatientField,
        value: &str,
    ) -> Result<(), StorageError> {
        let id = patient_id
            .as_key()
            .ok_or_else(|| StorageError::InvalidPatientId {
                id: patient_id.to_string(),
            })?;

        let write_txn = self.db.begin_write()?;
        {
            let mut patients = write_txn.open_table(Tables::PATIENTS)?;
            let mut row: PatientRow = match patients.get(id)? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => return Err(StorageError::RecordNotFound { id }),
            };
            row.apply(field, value)?;
            let encoded = serde_json::to_vec(&row)?;
            patients.insert(id, encoded.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<DatabaseStats, StorageError> {
        let read_txn = self.db.begin_read()?;
        let patients = read_txn.open_table(Tables::PATIENTS)?;
        let allergies_table = read_txn.open_table(Tables::ALLERGIES)?;
        let contacts_table = read_txn.open_table(Tables::EMERGENCY_CONTACTS)?;

        let mut allergies = 0;
        for entry in allergies_table.iter()? {
            let (_, guard) = entry?;
            allergies += serde_json::from_slice::<Vec<String>>(guard.value())?.len();
        }
        let mut emergency_contacts = 0;
        for entry in contacts_table.iter()? {
            let (_, guard) = entry?;
            emergency_contacts +=
                serde_json::from_slice::<Vec<EmergencyContact>>(guard.value())?.len();
        }

        Ok(DatabaseStats {
            patients: usize::try_from(patients.len()?).unwrap_or(usize::MAX),
            allergies,
            emergency_contacts,
        })
    }
}

/// Database statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseStats {
    pub patients: usize,
    pub allergies: usize,
    pub emergency_contacts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn patient(firstname: &str, lastname: &str) -> NewPatient {
        NewPatient {
            firstname: firstname.to_owned(),
            lastname: lastname.to_owned(),
            address: "6 Jedburgh Road, Arbury, Cambridgeshire".to_owned(),
            postcode: "EH46 7AD".to_owned(),
        }
    }

    #[test]
    fn test_database_creation() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        let manager = DatabaseManager::new(&db_path).unwrap();
        assert!(db_path.exists());
        assert!(manager.get_patient_ids().unwrap().is_empty());
    }

    #[test]
    fn test_insert_allocates_sequential_ids() {
        let temp_dir = tempdir().unwrap();
        let manager = DatabaseManager::new(temp_dir.path().join("test.redb")).unwrap();

        assert_eq!(manager.insert_patient(&patient("Daisy", "Riley")).unwrap(), 1);
        assert_eq!(manager.insert_patient(&patient("Eve", "Watkins")).unwrap(), 2);
        assert_eq!(manager.get_patient_ids().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_get_patient_joins_related_tables() {
        let temp_dir = tempdir().unwrap();
        let manager = DatabaseManager::new(temp_dir.path().join("test.redb")).unwrap();
        let id = manager.insert_patient(&patient("Daisy", "Riley")).unwrap();

        manager.add_allergy(id, "Penicillin").unwrap();
        manager.add_allergy(id, "Aspirin").unwrap();
        manager
            .add_emergency_contact(
                id,
                &EmergencyContact {
                    firstname: "Tom".to_owned(),
                    lastname: "Riley".to_owned(),
                    relationship: "Son".to_owned(),
                    phonenumber: "07700 900456".to_owned(),
                },
            )
            .unwrap();

        let record = manager.get_patient(id).unwrap().unwrap();
        assert_eq!(record.full_name(), "Daisy Riley");
        assert_eq!(record.allergies, vec!["Penicillin", "Aspirin"]);
        assert_eq!(record.emergency_contacts.len(), 1);
        assert_eq!(record.state, PatientState::default());
    }

    #[test]
    fn test_missing_patient_is_absent() {
        let temp_dir = tempdir().unwrap();
        let manager = DatabaseManager::new(temp_dir.path().join("test.redb")).unwrap();
        assert!(manager.get_patient(42).unwrap().is_none());
        assert!(
            manager
                .get_patient_by_id(&PatientId::new("not-a-number"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_related_rows_require_patient() {
        let temp_dir = tempdir().unwrap();
        let manager = DatabaseManager::new(temp_dir.path().join("test.redb")).unwrap();
        let result = manager.add_allergy(7, "Latex");
        assert!(matches!(result, Err(StorageError::RecordNotFound { id: 7 })));
    }

    #[test]
    fn test_apply_field_updates() {
        let temp_dir = tempdir().unwrap();
        let manager = DatabaseManager::new(temp_dir.path().join("test.redb")).unwrap();
        let id = manager.insert_patient(&patient("Eve", "Watkins")).unwrap();
        let patient_id = PatientId::from(id);

        manager
            .apply_field_update(&patient_id, PatientField::Heartrate, "70")
            .unwrap();
        manager
            .apply_field_update(&patient_id, PatientField::Heartrate, "72")
            .unwrap();
        manager
            .apply_field_update(&patient_id, PatientField::Latitude, "51.5")
            .unwrap();
        manager
            .apply_field_update(&patient_id, PatientField::Longitude, "-0.12")
            .unwrap();

        let state = manager.get_patient(id).unwrap().unwrap().state;
        assert_eq!(state.heartrate, Some(72));
        assert_eq!(state.coordinates(), Some(("51.5", "-0.12")));
    }

    #[test]
    fn test_apply_field_update_failures() {
        let temp_dir = tempdir().unwrap();
        let manager = DatabaseManager::new(temp_dir.path().join("test.redb")).unwrap();
        let id = manager.insert_patient(&patient("Eve", "Watkins")).unwrap();

        let bad_id =
            manager.apply_field_update(&PatientId::new("x"), PatientField::Heartrate, "70");
        assert!(matches!(bad_id, Err(StorageError::InvalidPatientId { .. })));

        let missing =
            manager.apply_field_update(&PatientId::from(99), PatientField::Heartrate, "70");
        assert!(matches!(missing, Err(StorageError::RecordNotFound { id: 99 })));

        let bad_value =
            manager.apply_field_update(&PatientId::from(id), PatientField::Heartrate, "fast");
        assert!(matches!(
            bad_value,
            Err(StorageError::InvalidFieldValue { .. })
        ));

        // Failed updates leave the row untouched
        let state = manager.get_patient(id).unwrap().unwrap().state;
        assert_eq!(state.heartrate, None);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        {
            let manager = DatabaseManager::new(&db_path).unwrap();
            manager.insert_patient(&patient("Daisy", "Riley")).unwrap();
        }
        let manager = DatabaseManager::open(&db_path).unwrap();
        assert_eq!(manager.get_patient_ids().unwrap(), vec![1]);
        assert_eq!(manager.insert_patient(&patient("Eve", "Watkins")).unwrap(), 2);
    }

    #[test]
    fn test_database_stats() {
        let temp_dir = tempdir().unwrap();
        let manager = DatabaseManager::new(temp_dir.path().join("test.redb")).unwrap();
        let id = manager.insert_patient(&patient("Daisy", "Riley")).unwrap();
        manager.insert_patient(&patient("Eve", "Watkins")).unwrap();
        manager.add_allergy(id, "Penicillin").unwrap();

        let stats = manager.get_stats().unwrap();
        assert_eq!(
            stats,
            DatabaseStats {
                patients: 2,
                allergies: 1,
                emergency_contacts: 0,
            }
        );
    }
}
