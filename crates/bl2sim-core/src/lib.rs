//! # BL2 Core
//!
//! Orchestration layer of the BL2 simulation: composes independently written
//! geometry modules into one detector model, wires them to the transport
//! engine's sensitive detectors, and turns every completed event into ntuple
//! rows.
//!
//! ## Architecture
//!
//! Every part of the detector implements the [`module::GeometryModule`]
//! trait and is owned by a [`registry::GeometryRegistry`]. The
//! [`run::RunManager`] constructs the registry once, shares it read-only
//! with its workers, and drives events from a [`engine::TransportEngine`]
//! through the [`actions`] controllers.
//!
//! ## Modules
//!
//! - [`module`]: The geometry module trait and its error types.
//! - [`registry`]: Ordered, name-addressed module registry.
//! - [`sensitive`]: Sensitive detectors and hit-collection ids.
//! - [`event`]: Completed-event records, hits and trajectories.
//! - [`output`]: Ntuple book, merging and file writers.
//! - [`correlator`]: Annihilation-photon position tagging.
//! - [`actions`]: Run and event controllers.
//! - [`engine`]: Transport engine trait.
//! - [`run`]: Multi-worker run manager.
//! - [`command`]: Macro command parsing.

pub mod actions;
pub mod command;
pub mod correlator;
pub mod engine;
pub mod event;
pub mod module;
pub mod output;
pub mod registry;
pub mod run;
pub mod sensitive;
