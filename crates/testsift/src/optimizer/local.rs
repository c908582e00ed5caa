//! Optimizer backed by a snapshot on local disk.

use super::{Optimizable, OptimizationSession};
use crate::config::{snapshot_file_for, OptimizationOptions};
use crate::identity::TestIdentity;
use crate::registry::{ManifestRegistry, SourceRegistry};
use crate::snapshot::{Snapshot, SnapshotPrinter, UNKNOWN_DURATION};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Chooses and orders the test units of a run
pub trait Optimizer {
    /// Whether optimize calls do anything beyond passing units through
    fn can_optimize(&self) -> bool;

    /// Whether a single optional unit would be kept
    fn include<E: Optimizable>(&self, unit: &E, session: &mut OptimizationSession) -> bool;

    /// Optimize optional units with a fresh session
    fn optimize<E: Optimizable>(&self, optional: Vec<E>) -> Vec<E>;

    /// Minimize `optional`, append `mandatory`, then reorder everything kept
    fn optimize_with<E: Optimizable>(
        &self,
        mandatory: Vec<E>,
        optional: Vec<E>,
        session: &mut OptimizationSession,
    ) -> Vec<E>;
}

/// Sort key for fail-fast ordering; smaller runs earlier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FailFastKey {
    passed_last_time: bool,
    unaffected: bool,
    duration: i64,
}

/// [`Optimizer`] over a [`Snapshot`] and the current source registry
///
/// Any missing piece (options disabled, no registry, no snapshot, a stale
/// snapshot) turns every optimize call into a pass-through.
#[derive(Debug)]
pub struct LocalSnapshotOptimizer {
    snapshot: Option<Snapshot>,
    registry: Option<Box<dyn SourceRegistry>>,
    options: OptimizationOptions,
}

impl LocalSnapshotOptimizer {
    /// Optimizer over an already loaded snapshot and registry
    #[must_use]
    pub fn new(
        snapshot: Option<Snapshot>,
        registry: Option<Box<dyn SourceRegistry>>,
        options: OptimizationOptions,
    ) -> Self {
        if options.log_level.is_debug() {
            if let Some(snapshot) = &snapshot {
                SnapshotPrinter::log_debug(snapshot);
            }
        }
        Self {
            snapshot,
            registry,
            options,
        }
    }

    /// Load the snapshot and registry named by `options`
    ///
    /// Never fails: whatever cannot be loaded is logged and left absent.
    /// A stale snapshot is deleted.
    #[must_use]
    pub fn from_options(options: OptimizationOptions) -> Self {
        if let Err(e) = options.validate() {
            warn!(error = %e, "not optimizing");
            return Self::new(None, None, options);
        }
        let snapshot_file = options
            .snapshot_file
            .clone()
            .or_else(|| options.registry_file.as_deref().map(snapshot_file_for));

        let Some(snapshot_file) = snapshot_file else {
            info!("not optimizing: no snapshot file configured");
            return Self::new(None, None, options);
        };
        let Some(snapshot) = Snapshot::load_from(&snapshot_file) else {
            info!(path = %snapshot_file.display(), "not optimizing: no snapshot found");
            return Self::new(None, None, options);
        };

        if let Some(reason) = snapshot.too_stale_reason(options.max_compiles_before_stale_snapshot) {
            info!(path = %snapshot_file.display(), "discarding snapshot: {reason}");
            if let Err(e) = snapshot.delete() {
                warn!(path = %snapshot_file.display(), error = %e, "could not delete stale snapshot");
            }
            return Self::new(None, None, options);
        }

        let registry = match options.registry_file.as_deref() {
            None => {
                info!("not optimizing: no registry file configured");
                None
            }
            Some(path) => match ManifestRegistry::from_file(path) {
                Ok(registry) => Some(Box::new(registry) as Box<dyn SourceRegistry>),
                Err(e) => {
                    info!(
                        path = %path.display(),
                        error = %e,
                        "not optimizing: registry could not be loaded"
                    );
                    None
                }
            },
        };
        let snapshot = registry.as_ref().map(|_| snapshot);
        Self::new(snapshot, registry, options)
    }

    /// Options in effect
    #[must_use]
    pub fn options(&self) -> &OptimizationOptions {
        &self.options
    }

    /// Snapshot in use, if any
    #[must_use]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Whether the snapshot has seen too many builds
    #[must_use]
    pub fn is_too_stale(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| s.is_too_stale(self.options.max_compiles_before_stale_snapshot))
    }

    /// Every reason optimization is off, e.g. `[optimization disabled, no snapshot file]`
    #[must_use]
    pub fn cannot_optimize_cause(&self) -> String {
        let mut causes = Vec::new();
        if !self.options.enabled {
            causes.push("optimization disabled".to_string());
        }
        if self.registry.is_none() {
            causes.push("registry file not set".to_string());
        }
        match &self.snapshot {
            None => causes.push("no snapshot file".to_string()),
            Some(snapshot) => {
                if let Some(reason) =
                    snapshot.too_stale_reason(self.options.max_compiles_before_stale_snapshot)
                {
                    causes.push(reason);
                }
            }
        }
        format!("[{}]", causes.join(", "))
    }

    /// Tests known under the unit's name, stripping leading `/` segments
    /// until a match is found
    #[must_use]
    pub fn lookup_tests(&self, name: &str) -> Option<&BTreeSet<TestIdentity>> {
        let snapshot = self.snapshot.as_ref()?;
        let mut rest = name;
        loop {
            if let Some(tests) = snapshot.lookup_tests(rest) {
                return Some(tests);
            }
            let (_, tail) = rest.split_once('/')?;
            rest = tail;
        }
    }

    fn contains_failed(snapshot: &Snapshot, tests: &BTreeSet<TestIdentity>) -> bool {
        tests.iter().any(|test| snapshot.has_failed(test))
    }

    fn contains_affected(
        snapshot: &Snapshot,
        registry: &dyn SourceRegistry,
        tests: &BTreeSet<TestIdentity>,
        session: &mut OptimizationSession,
    ) -> bool {
        tests
            .iter()
            .any(|test| snapshot.is_affected_by_changes(test, registry, session))
    }

    /// Inclusion decision for one optional unit whose tests resolved to `tests`
    fn decide(
        &self,
        name: &str,
        tests: Option<&BTreeSet<TestIdentity>>,
        session: &mut OptimizationSession,
    ) -> bool {
        let debug_enabled = self.options.log_level.is_debug();
        let (Some(snapshot), Some(registry)) = (&self.snapshot, &self.registry) else {
            return true;
        };
        let Some(tests) = tests else {
            if debug_enabled {
                debug!(unit = name, "including: no previously executed test matches it");
            }
            return true;
        };
        if !self.options.minimize {
            if debug_enabled {
                debug!(unit = name, "including: minimization is off");
            }
            return true;
        }
        let failed = Self::contains_failed(snapshot, tests);
        let include =
            failed || Self::contains_affected(snapshot, registry.as_ref(), tests, session);
        if debug_enabled {
            if include {
                debug!(
                    unit = name,
                    previously_failed = failed,
                    "including: previously failed or affected by a change"
                );
            } else {
                debug!(unit = name, "excluding: neither previously failed nor affected by a change");
            }
        }
        include
    }

    fn fail_fast_key(
        &self,
        tests: Option<&BTreeSet<TestIdentity>>,
        session: &mut OptimizationSession,
    ) -> FailFastKey {
        let unknown = FailFastKey {
            passed_last_time: true,
            unaffected: false,
            duration: i64::MAX,
        };
        let (Some(snapshot), Some(registry), Some(tests)) = (&self.snapshot, &self.registry, tests)
        else {
            return unknown;
        };
        let measured = tests
            .iter()
            .any(|test| snapshot.duration(test) != UNKNOWN_DURATION);
        FailFastKey {
            passed_last_time: !Self::contains_failed(snapshot, tests),
            unaffected: !Self::contains_affected(snapshot, registry.as_ref(), tests, session),
            duration: if measured {
                snapshot.duration_of(tests)
            } else {
                i64::MAX
            },
        }
    }

    fn reorder<E: Optimizable>(
        &self,
        units: Vec<(E, Option<&BTreeSet<TestIdentity>>)>,
        session: &mut OptimizationSession,
    ) -> Vec<E> {
        if units.len() <= 1 {
            debug!("not reordering: at most one unit");
            return units.into_iter().map(|(unit, _)| unit).collect();
        }
        if self.options.is_reorder_failfast() {
            debug!("sorting units for fail-fast behaviour");
            let mut keyed: Vec<(FailFastKey, E)> = units
                .into_iter()
                .map(|(unit, tests)| (self.fail_fast_key(tests, session), unit))
                .collect();
            keyed.sort_by_key(|(key, _)| *key);
            if self.options.log_level.is_debug() {
                for (key, unit) in &keyed {
                    debug!(unit = %unit.name(), ?key, "fail-fast order");
                }
            }
            return keyed.into_iter().map(|(_, unit)| unit).collect();
        }
        let mut units: Vec<E> = units.into_iter().map(|(unit, _)| unit).collect();
        if self.options.is_reorder_randomly() {
            debug!("shuffling units");
            let mut rng = match self.options.shuffle_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            units.shuffle(&mut rng);
        }
        units
    }

    fn log_modified_paths(&self, session: &OptimizationSession) {
        if !self.options.log_level.is_verbose() {
            return;
        }
        if session.modified_paths().is_empty() {
            info!("no modified source files detected for the current test set");
        } else {
            for path in session.modified_paths() {
                info!(path = %path, "modified source file");
            }
        }
    }
}

impl Optimizer for LocalSnapshotOptimizer {
    fn can_optimize(&self) -> bool {
        self.options.enabled
            && self.registry.is_some()
            && self.snapshot.is_some()
            && !self.is_too_stale()
    }

    fn include<E: Optimizable>(&self, unit: &E, session: &mut OptimizationSession) -> bool {
        if !self.can_optimize() {
            return true;
        }
        let name = unit.name();
        self.decide(&name, self.lookup_tests(&name), session)
    }

    fn optimize<E: Optimizable>(&self, optional: Vec<E>) -> Vec<E> {
        let mut session = OptimizationSession::new(&self.options);
        self.optimize_with(Vec::new(), optional, &mut session)
    }

    fn optimize_with<E: Optimizable>(
        &self,
        mandatory: Vec<E>,
        optional: Vec<E>,
        session: &mut OptimizationSession,
    ) -> Vec<E> {
        let total = mandatory.len() + optional.len();
        session.add_original(total);

        if !self.can_optimize() {
            debug!(cause = %self.cannot_optimize_cause(), "passing units through unchanged");
            let mut result = mandatory;
            result.extend(optional);
            session.add_optimized(result.len());
            session.after_optimization(false);
            return result;
        }

        let mut kept = Vec::with_capacity(total);
        for unit in optional {
            let name = unit.name();
            let tests = self.lookup_tests(&name);
            let mut estimated = 0;
            if let (Some(tests), Some(snapshot)) = (tests, &self.snapshot) {
                session.add_found();
                estimated = snapshot.duration_of(tests);
                session.add_total_time(estimated);
            }
            if self.decide(&name, tests, session) {
                debug!(unit = %name, "including in optimized test run");
                kept.push((unit, tests));
            } else {
                debug!(unit = %name, "excluding from optimized test run");
                session.add_savings(estimated);
            }
        }
        self.log_modified_paths(session);

        for unit in mandatory {
            let tests = self.lookup_tests(&unit.name());
            kept.push((unit, tests));
        }

        let result = self.reorder(kept, session);
        session.add_optimized(result.len());
        session.after_optimization(true);
        result
    }
}
