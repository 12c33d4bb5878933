//! Run and event controllers.
//!
//! These are the adapters the run loop calls at its fixed points. A
//! [`RunController`] prepares each worker before the first event and merges
//! the workers' output once every event is done; an [`EventController`]
//! turns one completed event into committed ntuple rows.

use std::path::PathBuf;
use std::sync::Arc;

use bl2sim_geometry::VolumeStore;
use serde::Deserialize;

use crate::correlator::EventCorrelator;
use crate::event::EventRecord;
use crate::output::{NtupleBook, OutputError, OutputFormat};
use crate::registry::{GeometryRegistry, RegistryError};
use crate::sensitive::SensitiveDetectorManager;

/// Where and how the merged ntuples are written.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Base name of the output files. Empty means unset: nothing is
    /// written.
    pub file_name: String,
    pub directory: PathBuf,
    pub format: OutputFormat,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            file_name: String::new(),
            directory: PathBuf::from("./output"),
            format: OutputFormat::Csv,
        }
    }
}

impl OutputSettings {
    /// Full base path, or `None` when no file name is set.
    pub fn base_path(&self) -> Option<PathBuf> {
        if self.file_name.trim().is_empty() {
            None
        } else {
            Some(self.directory.join(self.file_name.trim()))
        }
    }
}

/// Everything a worker owns for the duration of a run.
#[derive(Debug)]
pub struct WorkerState {
    pub index: usize,
    pub detectors: SensitiveDetectorManager,
    pub book: NtupleBook,
}

/// Run-level hooks.
#[derive(Debug, Clone)]
pub struct RunController {
    registry: Arc<GeometryRegistry>,
    correlator: Option<EventCorrelator>,
    output: OutputSettings,
}

impl RunController {
    pub fn new(
        registry: Arc<GeometryRegistry>,
        correlator: Option<EventCorrelator>,
        output: OutputSettings,
    ) -> Self {
        Self {
            registry,
            correlator,
            output,
        }
    }

    /// Prepare worker `index`: attach its sensitive detectors, create its
    /// ntuples and check the correlator target.
    pub fn begin_run(&self, index: usize, volumes: &VolumeStore) -> Result<WorkerState, RegistryError> {
        let mut detectors = SensitiveDetectorManager::new();
        self.registry.construct_sd_and_field(volumes, &mut detectors)?;

        let mut book = NtupleBook::new();
        let created = self.registry.setup_outputs(&mut book)?;
        log::debug!(
            "worker {}: {} hit collections, {} ntuples",
            index,
            detectors.collection_count(),
            created
        );

        if let Some(correlator) = &self.correlator {
            correlator.validate(&self.registry, &book)?;
        }

        Ok(WorkerState {
            index,
            detectors,
            book,
        })
    }

    /// The event-level controller workers use for this run.
    pub fn event_controller(&self) -> EventController {
        EventController {
            registry: Arc::clone(&self.registry),
            correlator: self.correlator.clone(),
        }
    }

    /// Merge the worker books in the order given and write the result.
    ///
    /// Returns the merged book and the files written. With no file name set
    /// the book is returned without writing anything.
    pub fn end_run(&self, books: Vec<NtupleBook>) -> Result<(NtupleBook, Vec<PathBuf>), OutputError> {
        let mut merged = NtupleBook::new();
        for book in books {
            merged.merge(book)?;
        }

        let files = match self.output.base_path() {
            Some(base) => merged.write(&base, self.output.format)?,
            None => {
                log::warn!("no output file name set; ntuples are not written");
                Vec::new()
            }
        };
        Ok((merged, files))
    }

    pub fn output(&self) -> &OutputSettings {
        &self.output
    }
}

/// Event-level hooks.
#[derive(Debug, Clone)]
pub struct EventController {
    registry: Arc<GeometryRegistry>,
    correlator: Option<EventCorrelator>,
}

impl EventController {
    pub fn begin_event(&self, event_id: u64) {
        log::trace!("begin event {}", event_id);
    }

    /// Stage every module's row, tag the correlator target, then commit.
    ///
    /// Rows are reset before staging, so a module's position columns stay
    /// zero in events without an annihilation photon.
    pub fn end_event(&self, event: &EventRecord, worker: &mut WorkerState) -> Result<(), RegistryError> {
        self.registry
            .fill_outputs(event, &worker.detectors, &mut worker.book)?;

        if let Some(correlator) = &self.correlator {
            correlator.process(event, &self.registry, &mut worker.book)?;
        }

        worker.book.add_bound_rows()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_name_is_unset() {
        let mut settings = OutputSettings::default();
        assert_eq!(settings.base_path(), None);
        settings.file_name = "  ".into();
        assert_eq!(settings.base_path(), None);
        settings.file_name = "bl2".into();
        assert_eq!(settings.base_path(), Some(PathBuf::from("./output/bl2")));
    }

    #[test]
    fn test_end_run_without_file_name_keeps_rows() {
        let controller = RunController::new(
            Arc::new(GeometryRegistry::new()),
            None,
            OutputSettings::default(),
        );
        let mut book = NtupleBook::new();
        let id = book.create_ntuple(crate::output::NtupleSchema::new("N", "t").column("a"));
        book.add_row(id).unwrap();

        let (merged, files) = controller.end_run(vec![book, NtupleBook::new()]).unwrap();
        assert!(files.is_empty());
        assert_eq!(merged.ntuple_by_name("N").unwrap().rows().len(), 1);
    }
}
