use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{LookupError, StartupError};

/// Shown and narrated in place of any field the table leaves empty.
pub const NOT_AVAILABLE: &str = "Informasi tidak tersedia";

/// One row of the medicine table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MedicineRecord {
    pub label: String,
    #[serde(alias = "nama_obat")]
    pub name: String,
    #[serde(default, alias = "golongan")]
    pub class: Option<String>,
    #[serde(default, rename = "type", alias = "jenis")]
    pub kind: Option<String>,
    #[serde(default, alias = "manfaat")]
    pub benefits: Option<String>,
    #[serde(default, alias = "aturan_minum")]
    pub dosage: Option<String>,
    #[serde(default, alias = "catatan")]
    pub notes: Option<String>,
    #[serde(default, alias = "efek_samping")]
    pub side_effects: Option<String>,
    #[serde(default, alias = "pantangan_makanan")]
    pub food_restrictions: Option<String>,
    #[serde(default, alias = "interaksi_negatif")]
    pub negative_interactions: Option<String>,
    #[serde(default, alias = "jika_lupa_minum")]
    pub missed_dose: Option<String>,
    #[serde(default, alias = "penyimpanan")]
    pub storage: Option<String>,
}

/// Field value, or [`NOT_AVAILABLE`] when absent or blank.
pub fn or_not_available(field: &Option<String>) -> &str {
    match field.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => NOT_AVAILABLE,
    }
}

/// Labels are compared after trimming surrounding whitespace.
pub fn normalize_label(label: &str) -> &str {
    label.trim()
}

/// Immutable medicine table indexed by label.
#[derive(Debug)]
pub struct RecordStore {
    records: HashMap<String, MedicineRecord>,
}

impl RecordStore {
    /// Load the CSV table from disk.
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        if !path.exists() {
            return Err(StartupError::TableMissing(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)
            .map_err(|e| StartupError::TableRead(format!("{}: {e}", path.display())))?;
        let store = Self::from_reader(file)?;
        log::info!("Loaded {} medicine records from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, StartupError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for row in reader.deserialize::<MedicineRecord>() {
            rows.push(row.map_err(|e| StartupError::TableRead(e.to_string()))?);
        }
        Self::from_records(rows)
    }

    pub fn from_records(rows: Vec<MedicineRecord>) -> Result<Self, StartupError> {
        let mut records = HashMap::with_capacity(rows.len());
        for mut record in rows {
            let key = normalize_label(&record.label).to_string();
            if key.is_empty() {
                return Err(StartupError::TableRead("row with an empty label".into()));
            }
            record.label = key.clone();
            if records.insert(key.clone(), record).is_some() {
                return Err(StartupError::DuplicateLabel(key));
            }
        }
        if records.is_empty() {
            return Err(StartupError::TableEmpty);
        }
        Ok(Self { records })
    }

    pub fn lookup(&self, label: &str) -> Result<&MedicineRecord, LookupError> {
        self.records
            .get(normalize_label(label))
            .ok_or_else(|| LookupError(label.to_string()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.records.contains_key(normalize_label(label))
    }

    /// All labels, sorted lexicographically.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.records.keys().cloned().collect();
        labels.sort();
        labels
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
