//! The run manager.
//!
//! [`RunManager`] owns the geometry for the whole session. Modules are
//! configured and constructed on the calling thread; each `beam_on` then
//! splits the requested events into contiguous chunks, one per worker, and
//! runs the chunks on a Rayon pool. Workers share the sealed registry and
//! volume store read-only and own their sensitive detectors and ntuples.
//! Worker books are merged in worker order, so merged rows follow event
//! order.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use bl2sim_geometry::{GeometryError, VolumeStore};
use rayon::prelude::*;
use thiserror::Error;

use crate::actions::{OutputSettings, RunController};
use crate::correlator::{CorrelatorConfig, EventCorrelator};
use crate::engine::{EngineError, TransportEngine};
use crate::module::{ConfigureError, GeometryModule};
use crate::output::{NtupleBook, OutputError};
use crate::registry::{GeometryRegistry, RegistryError};
use crate::sensitive::SensitiveDetectorManager;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Geometry setup failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Transport engine error in event {event_id}: {source}")]
    Engine {
        event_id: u64,
        #[source]
        source: EngineError,
    },

    #[error("Requested {requested} events but the engine '{engine}' only has {available}")]
    NotEnoughEvents {
        engine: String,
        requested: u64,
        available: u64,
    },

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// What a completed run produced.
#[derive(Debug)]
pub struct RunResult {
    pub run_id: u32,
    pub events: u64,
    pub workers: usize,
    /// Merged rows of every worker.
    pub book: NtupleBook,
    /// Files written at end of run.
    pub files: Vec<PathBuf>,
}

impl RunResult {
    /// `(ntuple name, row count)` for every ntuple.
    pub fn row_counts(&self) -> Vec<(String, usize)> {
        self.book
            .ntuples()
            .iter()
            .map(|nt| (nt.schema.name.clone(), nt.rows().len()))
            .collect()
    }
}

/// Session-level driver: geometry, settings and runs.
pub struct RunManager {
    registry: Arc<GeometryRegistry>,
    volumes: VolumeStore,
    master_detectors: SensitiveDetectorManager,
    threads: usize,
    output: OutputSettings,
    correlator: CorrelatorConfig,
    runs: u32,
}

impl RunManager {
    pub fn new(volumes: VolumeStore) -> Self {
        Self {
            registry: Arc::new(GeometryRegistry::new()),
            volumes,
            master_detectors: SensitiveDetectorManager::new(),
            threads: 1,
            output: OutputSettings::default(),
            correlator: CorrelatorConfig::default(),
            runs: 0,
        }
    }

    pub fn with_output(mut self, output: OutputSettings) -> Self {
        self.output = output;
        self
    }

    pub fn with_correlator(mut self, correlator: CorrelatorConfig) -> Self {
        self.correlator = correlator;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.set_threads(threads);
        self
    }

    /// Add a module. Fails once the geometry is constructed.
    pub fn register(&mut self, module: Box<dyn GeometryModule>) -> Result<(), RegistryError> {
        let name = module.name().to_string();
        Arc::get_mut(&mut self.registry)
            .ok_or(RegistryError::Sealed(name))?
            .register(module)
    }

    /// Route a runtime option to a module. Soft failure.
    pub fn configure(&mut self, module: &str, option: &str, value: &str) -> Result<(), ConfigureError> {
        match Arc::get_mut(&mut self.registry) {
            Some(registry) => registry.configure(module, option, value),
            None => Err(ConfigureError::GeometryFrozen(module.to_string())),
        }
    }

    pub fn set_file_name(&mut self, name: &str) {
        log::info!("output file name set to '{}'", name);
        self.output.file_name = name.to_string();
    }

    pub fn set_threads(&mut self, threads: usize) {
        if threads == 0 {
            log::warn!("thread count must be at least 1; keeping {}", self.threads);
            return;
        }
        self.threads = threads;
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Construct the geometry. Later calls do nothing.
    pub fn initialize(&mut self) -> Result<(), RunError> {
        if self.registry.is_constructed() {
            return Ok(());
        }
        let registry = Arc::get_mut(&mut self.registry)
            .ok_or_else(|| RegistryError::Sealed("geometry".into()))?;
        if registry.is_empty() {
            log::warn!("initialising an empty geometry");
        }
        registry.construct_all(&mut self.volumes, &mut self.master_detectors)?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.is_constructed()
    }

    pub fn registry(&self) -> &GeometryRegistry {
        &self.registry
    }

    pub fn volumes(&self) -> &VolumeStore {
        &self.volumes
    }

    pub fn output(&self) -> &OutputSettings {
        &self.output
    }

    /// Run `events` events from `engine`, initialising first if needed.
    pub fn beam_on(&mut self, events: u64, engine: &dyn TransportEngine) -> Result<RunResult, RunError> {
        self.initialize()?;

        if let Some(available) = engine.available_events() {
            if events > available {
                return Err(RunError::NotEnoughEvents {
                    engine: engine.name().to_string(),
                    requested: events,
                    available,
                });
            }
        }

        let run_id = self.runs;
        self.runs += 1;

        let correlator = self
            .correlator
            .enabled
            .then(|| EventCorrelator::new(self.correlator.clone()));
        let controller = RunController::new(Arc::clone(&self.registry), correlator, self.output.clone());

        let chunks = split_events(events, self.threads);
        let workers = chunks.len().max(1);
        log::info!(
            "run {} started: {} events from '{}' on {} worker(s)",
            run_id,
            events,
            engine.name(),
            workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| RunError::ThreadPool(e.to_string()))?;

        let volumes = &self.volumes;
        let books: Vec<NtupleBook> = if chunks.is_empty() {
            vec![controller.begin_run(0, volumes)?.book]
        } else {
            pool.install(|| {
                chunks
                    .into_par_iter()
                    .enumerate()
                    .map(|(index, range)| run_worker(&controller, index, range, volumes, engine))
                    .collect::<Result<Vec<_>, RunError>>()
            })?
        };

        let (book, files) = controller.end_run(books)?;
        log::info!("run {} finished: {} events", run_id, events);

        Ok(RunResult {
            run_id,
            events,
            workers,
            book,
            files,
        })
    }
}

impl std::fmt::Debug for RunManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunManager")
            .field("registry", &self.registry)
            .field("threads", &self.threads)
            .field("output", &self.output)
            .field("runs", &self.runs)
            .finish()
    }
}

/// Split `0..events` into at most `workers` contiguous, non-empty ranges
/// whose lengths differ by at most one.
pub fn split_events(events: u64, workers: usize) -> Vec<Range<u64>> {
    let workers = (workers.max(1) as u64).min(events);
    if workers == 0 {
        return Vec::new();
    }
    let base = events / workers;
    let extra = events % workers;
    let mut start = 0;
    (0..workers)
        .map(|i| {
            let len = base + u64::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

fn run_worker(
    controller: &RunController,
    index: usize,
    range: Range<u64>,
    volumes: &VolumeStore,
    engine: &dyn TransportEngine,
) -> Result<NtupleBook, RunError> {
    let mut worker = controller.begin_run(index, volumes)?;
    let events = controller.event_controller();
    log::debug!("worker {}: events {}..{}", index, range.start, range.end);

    for event_id in range {
        events.begin_event(event_id);
        let record = match engine.simulate(event_id, &worker.detectors) {
            Ok(record) => record,
            Err(source) => {
                log::error!("worker {}: engine failed at event {}: {}", index, event_id, source);
                return Err(RunError::Engine { event_id, source });
            }
        };
        if let Err(err) = events.end_event(&record, &mut worker) {
            log::error!("worker {}: aborting at event {}: {}", index, event_id, err);
            return Err(err.into());
        }
    }
    Ok(worker.book)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_events_contiguous_and_balanced() {
        let chunks = split_events(10, 3);
        assert_eq!(chunks, vec![0..4, 4..7, 7..10]);
        assert_eq!(split_events(2, 8), vec![0..1, 1..2]);
        assert_eq!(split_events(5, 0), vec![0..5]);
        assert!(split_events(0, 4).is_empty());
    }

    #[test]
    fn test_zero_threads_ignored() {
        let mut manager = RunManager::new(VolumeStore::new(100.0, "G4_Galactic").unwrap()).with_threads(4);
        manager.set_threads(0);
        assert_eq!(manager.threads(), 4);
    }
}
