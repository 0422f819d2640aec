//! Profile override resolution (§4.B "Profile override").
//!
//! A cluster-scoped `Profile` object lets an operator retarget a GVR's
//! classification, adapter field paths, forced severity, or debounce window
//! without redeploying. The discovery engine consults [`ProfileSet`] before
//! falling back to heuristics.

use dashmap::DashMap;

use crate::model::{Gvr, Severity};

/// One profile's override for a single GVR.
#[derive(Debug, Clone, Default)]
pub struct ProfileOverride {
    /// Forces this GVR to be treated as constraint-like even if the
    /// classification predicate would otherwise skip it.
    pub force_constraint_like: bool,
    /// Overrides the adapter chosen for this GVR, by adapter name.
    pub force_adapter: Option<String>,
    /// Overrides the severity an adapter would otherwise assign.
    pub force_severity: Option<Severity>,
    /// Overrides the evaluator/annotator debounce window for workloads
    /// matched by this GVR's constraints.
    pub force_debounce_secs: Option<u64>,
    /// Replaces the adapter's default selector field path.
    pub selector_path: Option<Vec<String>>,
    /// Replaces the adapter's default namespace-selector field path.
    pub namespace_selector_path: Option<Vec<String>>,
    /// Replaces the adapter's default effect field path.
    pub effect_path: Option<Vec<String>>,
    /// Replaces the adapter's default summary field path.
    pub summary_path: Option<Vec<String>>,
}

/// The resolved set of profile overrides, keyed by GVR.
///
/// Backed by a concurrent map (mirroring [`crate::dispatcher::DetailLevelResolver`])
/// since a `Profile` watch loop upserts into it from a background task while
/// the discovery engine and adapter pipeline read it from others. Last
/// upsert for a given GVR wins, mirroring how a later `kubectl apply` of a
/// `Profile` object supersedes an earlier one.
#[derive(Default)]
pub struct ProfileSet {
    overrides: DashMap<Gvr, ProfileOverride>,
}

impl ProfileSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, gvr: Gvr, profile_override: ProfileOverride) {
        self.overrides.insert(gvr, profile_override);
    }

    pub fn remove(&self, gvr: &Gvr) {
        self.overrides.remove(gvr);
    }

    #[must_use]
    pub fn get(&self, gvr: &Gvr) -> Option<ProfileOverride> {
        self.overrides.get(gvr).map(|entry| entry.value().clone())
    }

    /// Whether any registered profile forces `gvr` to be constraint-like.
    #[must_use]
    pub fn forces_constraint_like(&self, gvr: &Gvr) -> bool {
        self.overrides.get(gvr).is_some_and(|entry| entry.value().force_constraint_like)
    }
}
