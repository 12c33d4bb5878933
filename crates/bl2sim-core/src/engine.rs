//! Transport engine abstraction.
//!
//! The [`TransportEngine`] trait is the boundary to whatever tracks
//! particles through the geometry. The core never steps particles itself:
//! it asks the engine for one completed [`EventRecord`] at a time and
//! shapes the output around it.

use thiserror::Error;

use crate::event::EventRecord;
use crate::sensitive::SensitiveDetectorManager;

/// Errors originating from a transport engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine has no event {requested} (only {available} available)")]
    OutOfEvents { requested: u64, available: u64 },

    #[error("Hit collection '{0}' is not known to this worker's sensitive detectors")]
    UnknownCollection(String),

    #[error("Engine failure: {0}")]
    Failed(String),
}

/// Produces completed events.
///
/// One engine is shared by every worker of a run, so implementations must be
/// safe to call concurrently for distinct event ids.
pub trait TransportEngine: Sync {
    /// Short human-readable description, used in run logs.
    fn name(&self) -> &str;

    /// Number of events the engine can produce, if it is bounded.
    fn available_events(&self) -> Option<u64> {
        None
    }

    /// Transport event `event_id` and return its record.
    ///
    /// `detectors` is the calling worker's sensitive-detector manager; hit
    /// collections in the record must use its collection ids.
    fn simulate(
        &self,
        event_id: u64,
        detectors: &SensitiveDetectorManager,
    ) -> Result<EventRecord, EngineError>;
}
