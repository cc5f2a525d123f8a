use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, warn};

use crate::cache::{ChangeStatus, DigestWatcher, MarkerCache, ModificationWatcher};
use crate::config::{DatasetCatalog, Settings, SnapshotColumns};
use crate::data::model::{SeriesCollection, TimeSeries};
use crate::data::sanitize::SanitizeStats;
use crate::data::snapshot::{source_from_settings, SnapshotSource};
use crate::data::{ingest_snapshot, ingest_workbook};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

struct SnapshotSlot {
    source: Box<dyn SnapshotSource>,
    watcher: DigestWatcher,
    columns: SnapshotColumns,
    cache: MarkerCache<SeriesCollection>,
}

/// Everything one `load_all` produced: the series that could be served and
/// the per-source errors. A failed dataset still appears in `series`, either
/// with its last-known-good data or empty. A failed snapshot contributes its
/// last cached collection; if it never loaded, its sources are unknown and
/// only the error is reported.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub series: SeriesCollection,
    pub errors: BTreeMap<String, PipelineError>,
}

/// The full pipeline state, independent of presentation.
///
/// Every trigger (refresh, periodic poll, operator confirmation) is a
/// `&mut self` call that runs to completion.
pub struct PipelineState {
    settings: Settings,
    catalog: DatasetCatalog,
    snapshot: Option<SnapshotSlot>,
    /// One slot per `settings.workbooks` entry, created on first use.
    watchers: Vec<Option<ModificationWatcher>>,
    series_cache: MarkerCache<TimeSeries>,
    /// Sanitizer tally of the latest rebuild of each dataset.
    pub last_stats: BTreeMap<String, SanitizeStats>,
}

impl PipelineState {
    pub fn new(settings: Settings) -> Result<Self> {
        let source = match &settings.snapshot {
            Some(snapshot) => Some(source_from_settings(snapshot)?),
            None => None,
        };
        Self::with_snapshot_source(settings, source)
    }

    /// Build with an explicit snapshot source instead of the configured one.
    pub fn with_snapshot_source(
        settings: Settings,
        source: Option<Box<dyn SnapshotSource>>,
    ) -> Result<Self> {
        settings.validate()?;
        let snapshot = match (source, &settings.snapshot) {
            (Some(source), Some(snap)) => Some(SnapshotSlot {
                source,
                watcher: DigestWatcher::new(snap.poll_interval()),
                columns: snap.columns.clone(),
                cache: MarkerCache::new(),
            }),
            (Some(_), None) => {
                return Err(PipelineError::Config(
                    "snapshot source given but snapshot settings are missing".to_string(),
                ))
            }
            (None, _) => None,
        };
        let catalog = DatasetCatalog::from_settings(&settings);
        let watchers = settings.workbooks.iter().map(|_| None).collect();
        info!(
            "pipeline ready: {} dataset(s), snapshot {}",
            catalog.len(),
            if snapshot.is_some() { "enabled" } else { "disabled" }
        );
        Ok(Self {
            settings,
            catalog,
            snapshot,
            watchers,
            series_cache: MarkerCache::new(),
            last_stats: BTreeMap::new(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &DatasetCatalog {
        &self.catalog
    }

    // -- Remote snapshot --

    /// Fetch, digest and (if the marker moved) re-ingest the snapshot.
    ///
    /// A failed fetch serves the previous collection when there is one.
    pub fn snapshot(&mut self) -> Result<Arc<SeriesCollection>> {
        let slot = self
            .snapshot
            .as_mut()
            .ok_or_else(|| PipelineError::Config("no snapshot configured".to_string()))?;
        let key = slot.source.location().to_string();

        let data = match slot.source.fetch() {
            Ok(data) => data,
            Err(e) => match slot.cache.peek(&key) {
                Some(previous) => {
                    warn!("{e}; serving cached snapshot");
                    return Ok(previous);
                }
                None => return Err(e),
            },
        };

        let marker = slot.watcher.observe(&data);
        let columns = &slot.columns;
        slot.cache
            .get_or_build(&key, &marker, || ingest_snapshot(&key, data, columns))
    }

    /// Successful snapshot rebuilds so far.
    pub fn snapshot_rebuilds(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.cache.rebuilds())
    }

    // -- Local workbooks --

    fn watcher(&mut self, index: usize) -> Result<&mut ModificationWatcher> {
        let workbook = &self.settings.workbooks[index];
        let slot = &mut self.watchers[index];
        if slot.is_none() {
            *slot = Some(ModificationWatcher::new(
                &workbook.path,
                &workbook.working_copy,
            )?);
        }
        slot.as_mut()
            .ok_or_else(|| PipelineError::Config(format!("workbook '{}' not watched", workbook.name)))
    }

    fn workbook_index(&self, name: &str) -> Result<usize> {
        self.settings
            .workbooks
            .iter()
            .position(|w| w.name == name)
            .ok_or_else(|| PipelineError::Config(format!("unknown workbook '{name}'")))
    }

    /// Assembled series of one dataset, read from its workbook's working
    /// copy. Rebuilt only when the accepted modification marker moved.
    pub fn dataset_series(&mut self, id: &str) -> Result<Arc<TimeSeries>> {
        let config = self.catalog.get(id)?.clone();
        let index = self.catalog.workbook_of(id)?;

        let (marker, path) = match self.watcher(index) {
            Ok(w) => (w.marker(), w.working_copy().to_path_buf()),
            Err(e) => return self.fall_back(id, e),
        };

        let stats = &mut self.last_stats;
        let built = self.series_cache.get_or_build(id, &marker, || {
            let (series, tally) = ingest_workbook(&path, &config)?;
            stats.insert(id.to_string(), tally);
            Ok(series)
        });
        match built {
            Ok(series) => Ok(series),
            Err(e) => self.fall_back(id, e),
        }
    }

    /// Serve last-known-good data when the source could not be reached.
    fn fall_back(&self, id: &str, err: PipelineError) -> Result<Arc<TimeSeries>> {
        match (&err, self.series_cache.peek(id)) {
            (PipelineError::SourceUnavailable { .. }, Some(previous)) => {
                warn!("{err}; serving cached '{id}'");
                Ok(previous)
            }
            _ => Err(err),
        }
    }

    /// Check one workbook for a newer export. Never swaps data.
    pub fn poll_workbook(&mut self, name: &str) -> Result<ChangeStatus> {
        let index = self.workbook_index(name)?;
        Ok(self.watcher(index)?.poll())
    }

    /// Poll every workbook; ones that cannot be watched are skipped.
    pub fn poll_workbooks(&mut self) -> Vec<(String, ChangeStatus)> {
        let mut out = Vec::new();
        for index in 0..self.settings.workbooks.len() {
            let name = self.settings.workbooks[index].name.clone();
            match self.watcher(index) {
                Ok(watcher) => out.push((name, watcher.poll())),
                Err(e) => warn!("workbook '{name}': {e}"),
            }
        }
        out
    }

    /// Operator confirmation: swap in the newer export and re-ingest its
    /// datasets. Returns `false` if there was nothing to accept.
    pub fn confirm_update(&mut self, name: &str) -> Result<bool> {
        let index = self.workbook_index(name)?;
        if !self.watcher(index)?.confirm()? {
            return Ok(false);
        }
        let ids: Vec<String> = self.settings.workbooks[index]
            .datasets
            .iter()
            .map(|d| d.id.clone())
            .collect();
        for id in ids {
            if let Err(e) = self.dataset_series(&id) {
                warn!("dataset '{id}' after update: {e}");
            }
        }
        Ok(true)
    }

    /// Successful dataset rebuilds so far.
    pub fn dataset_rebuilds(&self) -> usize {
        self.series_cache.rebuilds()
    }

    // -- Everything --

    /// Run every source once. One failing source never hides the others.
    pub fn load_all(&mut self) -> LoadReport {
        let mut report = LoadReport::default();

        if self.snapshot.is_some() {
            match self.snapshot() {
                Ok(collection) => report.series.extend(
                    collection
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone())),
                ),
                Err(e) => {
                    warn!("snapshot: {e}");
                    if let Some(slot) = &self.snapshot {
                        let key = slot.source.location().to_string();
                        if let Some(cached) = slot.cache.peek(&key) {
                            report
                                .series
                                .extend(cached.iter().map(|(k, v)| (k.clone(), v.clone())));
                        }
                        report.errors.insert(key, e);
                    }
                }
            }
        }

        let ids: Vec<String> = self.catalog.ids().map(str::to_string).collect();
        for id in ids {
            let series = match self.dataset_series(&id) {
                Ok(series) => TimeSeries::clone(&series),
                Err(e) => {
                    warn!("dataset '{id}': {e}");
                    report.errors.insert(id.clone(), e);
                    TimeSeries::empty(id.clone())
                }
            };
            if report.series.insert(id.clone(), series).is_some() {
                warn!("dataset '{id}' shadows a snapshot source with the same name");
            }
        }

        report
    }
}
