use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Public Parquet snapshot consolidating every monitored source.
pub const DEFAULT_SNAPSHOT_URL: &str =
    "https://auraprodstorage.blob.core.windows.net/public-parquet/consolidado.parquet";

/// Width of the moving average precomputed at assembly time.
pub const FIXED_WINDOW: usize = 15;

/// Largest window accepted by the on-demand aggregator.
pub const MAX_WINDOW: usize = 50;

/// Default period shown when no explicit date range is selected.
pub const DEFAULT_PERIOD_DAYS: i64 = 30;

// ---------------------------------------------------------------------------
// Per-source dataset descriptor
// ---------------------------------------------------------------------------

/// Immutable description of one wide-format dataset inside a workbook.
///
/// `columns[0]` is the date column, `columns[1..]` line up with
/// `hour_labels` one to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDatasetConfig {
    pub id: String,
    pub sheet: String,
    /// 0-based row holding the column headers; data starts on the next row.
    pub header_row: u32,
    /// Absolute 0-based column indices to retain (column A = 0).
    pub columns: Vec<u32>,
    /// Sensor-fault clamp: anything above this is dropped.
    pub max_value: f64,
    pub hour_labels: Vec<String>,
}

impl SourceDatasetConfig {
    /// Hour labels `"01:00"` … `"24:00"`.
    pub fn hourly_labels() -> Vec<String> {
        (1..=24).map(|h| format!("{h:02}:00")).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.columns.len() != self.hour_labels.len() + 1 {
            return Err(PipelineError::Config(format!(
                "dataset '{}': {} columns for {} hour labels (expected date column + one per label)",
                self.id,
                self.columns.len(),
                self.hour_labels.len()
            )));
        }
        let mut labels = BTreeSet::new();
        if let Some(dup) = self.hour_labels.iter().find(|l| !labels.insert(l.as_str())) {
            return Err(PipelineError::Config(format!(
                "dataset '{}': hour label '{dup}' is listed twice",
                self.id
            )));
        }
        if !self.max_value.is_finite() || self.max_value <= 0.0 {
            return Err(PipelineError::Config(format!(
                "dataset '{}': max_value must be positive, got {}",
                self.id, self.max_value
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

/// Column names of the long-format snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotColumns {
    pub timestamp: String,
    pub source: String,
    pub value: String,
}

impl Default for SnapshotColumns {
    fn default() -> Self {
        Self {
            timestamp: "DataHoraReal".to_string(),
            source: "Fonte".to_string(),
            value: "Valor".to_string(),
        }
    }
}

/// Where the long-format snapshot comes from and how often it expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// `http(s)://` URL or a local `.parquet` path.
    pub location: String,
    pub columns: SnapshotColumns,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            location: DEFAULT_SNAPSHOT_URL.to_string(),
            columns: SnapshotColumns::default(),
            poll_interval_secs: 300,
            timeout_secs: 30,
        }
    }
}

impl SnapshotSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn is_remote(&self) -> bool {
        self.location.starts_with("http://") || self.location.starts_with("https://")
    }
}

/// A local workbook watched by modification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookSettings {
    pub name: String,
    /// File the operator exports to.
    pub path: PathBuf,
    /// Copy the pipeline actually reads; only replaced on confirmation.
    pub working_copy: PathBuf,
    pub datasets: Vec<SourceDatasetConfig>,
}

/// Top-level settings, usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `None` disables the snapshot source.
    pub snapshot: Option<SnapshotSettings>,
    pub workbooks: Vec<WorkbookSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            snapshot: Some(SnapshotSettings::default()),
            workbooks: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings =
            serde_json::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::unavailable(path.display().to_string(), e))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(snapshot) = &self.snapshot {
            if snapshot.poll_interval_secs == 0 {
                return Err(PipelineError::Config(
                    "snapshot.poll_interval_secs must be at least 1".to_string(),
                ));
            }
        }
        let mut seen = BTreeSet::new();
        for workbook in &self.workbooks {
            for dataset in &workbook.datasets {
                dataset.validate()?;
                if !seen.insert(dataset.id.as_str()) {
                    return Err(PipelineError::Config(format!(
                        "dataset id '{}' is declared twice",
                        dataset.id
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Catalog – closed set of dataset records
// ---------------------------------------------------------------------------

/// Lookup table from dataset id to its descriptor and owning workbook.
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    entries: BTreeMap<String, (usize, SourceDatasetConfig)>,
}

impl DatasetCatalog {
    pub fn from_settings(settings: &Settings) -> Self {
        let entries = settings
            .workbooks
            .iter()
            .enumerate()
            .flat_map(|(wb, workbook)| {
                workbook
                    .datasets
                    .iter()
                    .map(move |ds| (ds.id.clone(), (wb, ds.clone())))
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Result<&SourceDatasetConfig> {
        self.entries
            .get(id)
            .map(|(_, ds)| ds)
            .ok_or_else(|| PipelineError::UnknownDataset(id.to_string()))
    }

    /// Index into `Settings::workbooks` of the workbook holding `id`.
    pub fn workbook_of(&self, id: &str) -> Result<usize> {
        self.entries
            .get(id)
            .map(|(wb, _)| *wb)
            .ok_or_else(|| PipelineError::UnknownDataset(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
