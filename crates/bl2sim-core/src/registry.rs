//! The geometry registry.
//!
//! [`GeometryRegistry`] owns every [`GeometryModule`] for the lifetime of
//! the simulation, in registration order. It is built and constructed on
//! the setup thread, then sealed and shared read-only with the workers.
//!
//! Construction is a single pass in registration order. There is no
//! dependency sorting: a module whose mother is another module must be
//! registered after it, otherwise construction fails with
//! [`RegistryError::MotherNotConstructed`].
//!
//! A failed construction leaves partial volumes behind, so the registry
//! refuses any further construction or registration afterwards.

use std::collections::HashMap;

use bl2sim_geometry::{LogicalId, VolumeStore};
use indexmap::IndexMap;
use thiserror::Error;

use crate::event::EventRecord;
use crate::module::{ConfigureError, GeometryModule, ModuleError, PositionTagger};
use crate::output::{NtupleBook, OutputError};
use crate::sensitive::SensitiveDetectorManager;

/// Setup-phase registry failures. All of them end the run before any event.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("A geometry module named '{0}' is already registered")]
    DuplicateName(String),

    #[error("Geometry module not found: {0}")]
    NotFound(String),

    #[error("Cannot register '{0}': the geometry is already constructed")]
    Sealed(String),

    #[error("Geometry construction already failed: {0}")]
    ConstructionFailed(String),

    #[error("Module '{module}' needs mother '{mother}', which has not been constructed yet; register the mother first")]
    MotherNotConstructed { module: String, mother: String },

    #[error("Module '{module}' needs mother '{mother}', which has no envelope volume")]
    MotherHasNoEnvelope { module: String, mother: String },

    #[error("Module '{module}' does not provide {capability}")]
    MissingCapability {
        module: String,
        capability: &'static str,
    },

    #[error("Module '{module}': {source}")]
    Module {
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Ordered, name-addressed owner of all geometry modules.
#[derive(Default)]
pub struct GeometryRegistry {
    modules: IndexMap<String, Box<dyn GeometryModule>>,
    envelopes: HashMap<String, Option<LogicalId>>,
    sealed: bool,
    failed: Option<String>,
}

impl GeometryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module under its own name.
    pub fn register(&mut self, module: Box<dyn GeometryModule>) -> Result<(), RegistryError> {
        let name = module.name().to_string();
        if self.sealed {
            return Err(RegistryError::Sealed(name));
        }
        if let Some(reason) = &self.failed {
            return Err(RegistryError::ConstructionFailed(reason.clone()));
        }
        if self.modules.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        log::debug!("registered geometry module '{}'", name);
        self.modules.insert(name, module);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn GeometryModule, RegistryError> {
        self.modules
            .get(name)
            .map(|m| m.as_ref())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// The position-tagging entry point of module `name`.
    pub fn position_tagger(&self, name: &str) -> Result<&dyn PositionTagger, RegistryError> {
        self.lookup(name)?
            .as_position_tagger()
            .ok_or_else(|| RegistryError::MissingCapability {
                module: name.to_string(),
                capability: "position tagging",
            })
    }

    /// Route a runtime option to module `name`. Only valid before
    /// construction.
    pub fn configure(&mut self, name: &str, option: &str, value: &str) -> Result<(), ConfigureError> {
        if self.sealed || self.failed.is_some() {
            return Err(ConfigureError::GeometryFrozen(name.to_string()));
        }
        let module = self
            .modules
            .get_mut(name)
            .ok_or_else(|| ConfigureError::UnknownModule(name.to_string()))?;
        module.configure(option, value)?;
        log::info!("{}: {} = {}", name, option, value);
        Ok(())
    }

    /// Build every module in registration order, then attach sensitive
    /// detectors to `detectors` in the same order, then seal the registry.
    ///
    /// Runs at most once. After a failure every later call returns
    /// [`RegistryError::ConstructionFailed`] without touching the modules.
    pub fn construct_all(
        &mut self,
        volumes: &mut VolumeStore,
        detectors: &mut SensitiveDetectorManager,
    ) -> Result<(), RegistryError> {
        if self.sealed {
            return Ok(());
        }
        if let Some(reason) = &self.failed {
            return Err(RegistryError::ConstructionFailed(reason.clone()));
        }
        let built = self
            .construct_volumes(volumes)
            .and_then(|()| self.construct_sd_and_field(volumes, detectors));
        if let Err(err) = built {
            self.failed = Some(err.to_string());
            return Err(err);
        }
        self.sealed = true;
        log::info!(
            "geometry complete: {} modules, {} logical / {} physical volumes",
            self.modules.len(),
            volumes.logical_count(),
            volumes.physical_count()
        );
        Ok(())
    }

    fn construct_volumes(&mut self, volumes: &mut VolumeStore) -> Result<(), RegistryError> {
        if let Some(missing) = self
            .modules
            .values()
            .filter_map(|m| m.mother())
            .find(|mother| !self.modules.contains_key(*mother))
        {
            return Err(RegistryError::NotFound(missing.to_string()));
        }
        for (name, module) in self.modules.iter_mut() {
            let mother = match module.mother() {
                None => volumes.world(),
                Some(mother) => match self.envelopes.get(mother) {
                    Some(Some(envelope)) => *envelope,
                    Some(None) => {
                        return Err(RegistryError::MotherHasNoEnvelope {
                            module: name.clone(),
                            mother: mother.to_string(),
                        })
                    }
                    None => {
                        return Err(RegistryError::MotherNotConstructed {
                            module: name.clone(),
                            mother: mother.to_string(),
                        })
                    }
                },
            };
            let envelope = module
                .construct(mother, volumes)
                .map_err(|source| RegistryError::Module {
                    module: name.clone(),
                    source,
                })?;
            log::info!("constructed geometry module '{}'", name);
            self.envelopes.insert(name.clone(), envelope);
        }
        Ok(())
    }

    /// Attach every module's sensitive detectors to one worker's manager.
    pub fn construct_sd_and_field(
        &self,
        volumes: &VolumeStore,
        detectors: &mut SensitiveDetectorManager,
    ) -> Result<(), RegistryError> {
        for (name, module) in &self.modules {
            module
                .construct_sd_and_field(volumes, detectors)
                .map_err(|source| RegistryError::Module {
                    module: name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Create the ntuple of every module that declares one and bind it to
    /// the module. Returns the number of ntuples created.
    pub fn setup_outputs(&self, book: &mut NtupleBook) -> Result<usize, RegistryError> {
        let mut created = 0;
        for (name, module) in &self.modules {
            if let Some(schema) = module.setup_output() {
                let id = book.create_ntuple(schema);
                book.bind(name, id);
                log::info!("{}: output ntuple id {}", name, id.index());
                created += 1;
            }
        }
        Ok(created)
    }

    /// Stage this event's row for every module with an output binding.
    ///
    /// Rows are reset to zeros first. A module that fails with a non-fatal
    /// error gets an all-zero row and the event carries on; a fatal error
    /// aborts.
    pub fn fill_outputs(
        &self,
        event: &EventRecord,
        detectors: &SensitiveDetectorManager,
        book: &mut NtupleBook,
    ) -> Result<(), RegistryError> {
        for (name, module) in &self.modules {
            let Some(id) = book.binding(name) else {
                continue;
            };
            let row = book.row_mut(id)?;
            row.reset();
            if let Err(err) = module.fill_output(event, detectors, row) {
                if err.is_fatal() {
                    return Err(RegistryError::Module {
                        module: name.clone(),
                        source: err,
                    });
                }
                log::warn!(
                    "{}: event {}: {}; writing zero row",
                    name,
                    event.event_id(),
                    err
                );
                row.reset();
            }
        }
        Ok(())
    }

    /// Envelope volume returned by module `name` at construction.
    pub fn envelope(&self, name: &str) -> Option<LogicalId> {
        self.envelopes.get(name).copied().flatten()
    }

    pub fn is_constructed(&self) -> bool {
        self.sealed
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for GeometryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("sealed", &self.sealed)
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{NtupleSchema, OutputRow};
    use bl2sim_geometry::{Colour, Shape, Solid};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Builds one box named after itself and records the mother it got.
    struct BoxModule {
        name: String,
        mother: Option<String>,
        received_mother: Arc<std::sync::Mutex<Option<LogicalId>>>,
        constructs: Arc<AtomicUsize>,
        fail_sd: bool,
    }

    impl BoxModule {
        fn new(name: &str, mother: Option<&str>) -> Self {
            Self {
                name: name.into(),
                mother: mother.map(String::from),
                received_mother: Arc::default(),
                constructs: Arc::default(),
                fail_sd: false,
            }
        }

        fn failing_sd(mut self) -> Self {
            self.fail_sd = true;
            self
        }
    }

    impl GeometryModule for BoxModule {
        fn name(&self) -> &str {
            &self.name
        }

        fn mother(&self) -> Option<&str> {
            self.mother.as_deref()
        }

        fn construct(
            &mut self,
            mother: LogicalId,
            volumes: &mut VolumeStore,
        ) -> Result<Option<LogicalId>, ModuleError> {
            self.constructs.fetch_add(1, Ordering::SeqCst);
            *self.received_mother.lock().unwrap() = Some(mother);
            let lv = volumes.add_logical(
                Solid::new(self.name.clone(), Shape::boxed(10.0, 10.0, 10.0)),
                "G4_AIR",
                Colour::Grey,
            )?;
            volumes.place(lv, mother, Default::default(), 0)?;
            Ok(Some(lv))
        }

        fn construct_sd_and_field(
            &self,
            _volumes: &VolumeStore,
            _detectors: &mut SensitiveDetectorManager,
        ) -> Result<(), ModuleError> {
            if self.fail_sd {
                return Err(ModuleError::UnresolvedHitCollection(format!("{}/Edep", self.name)));
            }
            Ok(())
        }

        fn setup_output(&self) -> Option<NtupleSchema> {
            Some(NtupleSchema::new(format!("{}Out", self.name), "test").column("v"))
        }

        fn fill_output(
            &self,
            event: &EventRecord,
            _detectors: &SensitiveDetectorManager,
            row: &mut OutputRow,
        ) -> Result<(), ModuleError> {
            if event.event_id() == 13 {
                return Err(ModuleError::CopyIndexOutOfRange { copy_no: 13, copies: 1 });
            }
            row.set(0, event.event_id() as f64)?;
            Ok(())
        }
    }

    fn store() -> VolumeStore {
        VolumeStore::new(1000.0, "G4_Galactic").unwrap()
    }

    #[test]
    fn test_register_then_lookup_same_instance() {
        let mut registry = GeometryRegistry::new();
        registry.register(Box::new(BoxModule::new("A", None))).unwrap();
        registry.register(Box::new(BoxModule::new("B", None))).unwrap();

        let a1 = registry.lookup("A").unwrap() as *const dyn GeometryModule as *const ();
        let a2 = registry.lookup("A").unwrap() as *const dyn GeometryModule as *const ();
        assert_eq!(a1, a2);
        assert_eq!(registry.lookup("B").unwrap().name(), "B");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_duplicate_name_leaves_registry_unchanged() {
        let mut registry = GeometryRegistry::new();
        let first = BoxModule::new("A", None);
        let first_counter = first.constructs.clone();
        registry.register(Box::new(first)).unwrap();

        let err = registry
            .register(Box::new(BoxModule::new("A", Some("X"))))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(ref n) if n == "A"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("A").unwrap().mother(), None);

        let mut volumes = store();
        registry
            .construct_all(&mut volumes, &mut SensitiveDetectorManager::new())
            .unwrap();
        assert_eq!(first_counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lookup_missing_is_not_found() {
        let registry = GeometryRegistry::new();
        assert!(matches!(registry.lookup("Nope"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_child_receives_mother_envelope() {
        let mut registry = GeometryRegistry::new();
        let child = BoxModule::new("B", Some("A"));
        let received = child.received_mother.clone();
        registry.register(Box::new(BoxModule::new("A", None))).unwrap();
        registry.register(Box::new(child)).unwrap();

        let mut volumes = store();
        registry
            .construct_all(&mut volumes, &mut SensitiveDetectorManager::new())
            .unwrap();

        let a = registry.envelope("A").unwrap();
        assert_eq!(*received.lock().unwrap(), Some(a));
        assert_eq!(volumes.logical(a).unwrap().name, "A");
        assert!(registry.is_constructed());
    }

    #[test]
    fn test_reversed_order_fails_predictably() {
        let mut registry = GeometryRegistry::new();
        registry.register(Box::new(BoxModule::new("B", Some("A")))).unwrap();
        registry.register(Box::new(BoxModule::new("A", None))).unwrap();

        let mut volumes = store();
        let err = registry
            .construct_all(&mut volumes, &mut SensitiveDetectorManager::new())
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::MotherNotConstructed { ref module, ref mother } if module == "B" && mother == "A"
        ));
        assert!(!registry.is_constructed());
    }

    #[test]
    fn test_unregistered_mother_is_not_found() {
        let mut registry = GeometryRegistry::new();
        let a = BoxModule::new("A", None);
        let a_counter = a.constructs.clone();
        registry.register(Box::new(a)).unwrap();
        registry.register(Box::new(BoxModule::new("B", Some("Nope")))).unwrap();

        let mut volumes = store();
        let err = registry
            .construct_all(&mut volumes, &mut SensitiveDetectorManager::new())
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(ref n) if n == "Nope"));
        assert_eq!(a_counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_detector_attachment_leaves_registry_unsealed() {
        let mut registry = GeometryRegistry::new();
        let a = BoxModule::new("A", None).failing_sd();
        let a_counter = a.constructs.clone();
        registry.register(Box::new(a)).unwrap();

        let mut volumes = store();
        let mut sd = SensitiveDetectorManager::new();
        let err = registry.construct_all(&mut volumes, &mut sd).unwrap_err();
        assert!(matches!(err, RegistryError::Module { ref module, .. } if module == "A"));
        assert!(!registry.is_constructed());

        let err = registry.construct_all(&mut volumes, &mut sd).unwrap_err();
        assert!(matches!(err, RegistryError::ConstructionFailed(ref reason) if reason.contains("A/Edep")));
        assert!(!registry.is_constructed());
        assert_eq!(a_counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_after_failure_does_not_reconstruct() {
        let mut registry = GeometryRegistry::new();
        registry.register(Box::new(BoxModule::new("A", None))).unwrap();
        let b = BoxModule::new("B", None);
        let b_counter = b.constructs.clone();
        registry.register(Box::new(b)).unwrap();
        registry.register(Box::new(BoxModule::new("D", Some("C")))).unwrap();
        registry.register(Box::new(BoxModule::new("C", None))).unwrap();

        let mut volumes = store();
        let mut sd = SensitiveDetectorManager::new();
        assert!(matches!(
            registry.construct_all(&mut volumes, &mut sd),
            Err(RegistryError::MotherNotConstructed { .. })
        ));
        let logical_after_failure = volumes.logical_count();

        assert!(matches!(
            registry.register(Box::new(BoxModule::new("E", None))),
            Err(RegistryError::ConstructionFailed(_))
        ));
        assert_eq!(
            registry.configure("A", "x", "y"),
            Err(ConfigureError::GeometryFrozen("A".into()))
        );
        assert!(matches!(
            registry.construct_all(&mut volumes, &mut sd),
            Err(RegistryError::ConstructionFailed(_))
        ));
        assert_eq!(b_counter.load(Ordering::SeqCst), 1);
        assert_eq!(volumes.logical_count(), logical_after_failure);
    }

    #[test]
    fn test_sealed_after_construction() {
        let mut registry = GeometryRegistry::new();
        registry.register(Box::new(BoxModule::new("A", None))).unwrap();
        let mut volumes = store();
        registry
            .construct_all(&mut volumes, &mut SensitiveDetectorManager::new())
            .unwrap();

        assert!(matches!(
            registry.register(Box::new(BoxModule::new("C", None))),
            Err(RegistryError::Sealed(_))
        ));
        assert_eq!(
            registry.configure("A", "x", "y"),
            Err(ConfigureError::GeometryFrozen("A".into()))
        );
    }

    #[test]
    fn test_configure_routes_soft_errors() {
        let mut registry = GeometryRegistry::new();
        registry.register(Box::new(BoxModule::new("A", None))).unwrap();
        assert_eq!(
            registry.configure("Z", "x", "y"),
            Err(ConfigureError::UnknownModule("Z".into()))
        );
        assert!(matches!(
            registry.configure("A", "colour", "red"),
            Err(ConfigureError::UnknownOption { .. })
        ));
    }

    #[test]
    fn test_fill_outputs_in_order_with_sentinel_on_soft_error() {
        let mut registry = GeometryRegistry::new();
        registry.register(Box::new(BoxModule::new("A", None))).unwrap();
        registry.register(Box::new(BoxModule::new("B", None))).unwrap();
        let mut volumes = store();
        let mut sd = SensitiveDetectorManager::new();
        registry.construct_all(&mut volumes, &mut sd).unwrap();

        let mut book = NtupleBook::new();
        assert_eq!(registry.setup_outputs(&mut book).unwrap(), 2);
        for id in [5, 13] {
            registry
                .fill_outputs(&EventRecord::new(id), &sd, &mut book)
                .unwrap();
            book.add_bound_rows().unwrap();
        }
        let rows = book.ntuple_by_name("AOut").unwrap().column("v").unwrap();
        assert_eq!(rows, vec![5.0, 0.0]);
        assert_eq!(book.binding("B").map(|id| id.index()), Some(1));
    }

    #[test]
    fn test_position_tagger_capability_check() {
        let mut registry = GeometryRegistry::new();
        registry.register(Box::new(BoxModule::new("A", None))).unwrap();
        assert!(matches!(
            registry.position_tagger("A"),
            Err(RegistryError::MissingCapability { .. })
        ));
        assert!(matches!(
            registry.position_tagger("Q"),
            Err(RegistryError::NotFound(_))
        ));
    }
}
