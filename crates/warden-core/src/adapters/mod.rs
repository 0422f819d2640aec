//! Pluggable parsers from a cluster object to zero-or-more [`Constraint`]s,
//! and the registry that routes a GVR to the adapter responsible for it.

mod cilium_policy;
mod fallback;
mod gatekeeper;
mod istio;
mod kyverno;
mod limit_range;
mod network_policy;
mod resource_quota;
mod webhook_config;

pub use cilium_policy::CiliumPolicyAdapter;
pub use fallback::FallbackAdapter;
pub use gatekeeper::GatekeeperAdapter;
pub use istio::IstioAdapter;
pub use kyverno::KyvernoAdapter;
pub use limit_range::LimitRangeAdapter;
pub use network_policy::NetworkPolicyAdapter;
pub use resource_quota::ResourceQuotaAdapter;
pub use webhook_config::WebhookConfigAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Constraint, Gvr};

/// A pure parser from one source kind's object to the Constraints it implies.
///
/// `parse` must not mutate `object`; parse failures are reported as `Err` and
/// are never fatal to the caller's watch loop.
pub trait Adapter: Send + Sync {
    /// Stable identifier, used in metrics and Details provenance.
    fn name(&self) -> &'static str;

    /// The exact GVRs this adapter claims. Empty for group-based and fallback
    /// adapters, which are looked up by [`Registry::for_group`] or resolved as
    /// the last resort instead.
    fn handles(&self) -> &[Gvr] {
        &[]
    }

    /// Produces the Constraints implied by `object`, a single instance of a
    /// kind identified by `gvr`.
    ///
    /// # Errors
    /// Returns an error if `object` cannot be interpreted as this adapter's
    /// expected shape at all; a merely-incomplete object should instead
    /// degrade to a best-effort Constraint.
    fn parse(&self, gvr: &Gvr, object: &Value) -> Result<Vec<Constraint>>;
}

/// Maps a GVR, or a failing that a group, to the adapter responsible for it.
///
/// Exact-GVR registrations take priority over group registrations. Within a
/// group, the first adapter registered for it wins — this lets
/// dynamically-generated CRDs (Gatekeeper constraint kinds, for instance)
/// share one adapter without the registry needing to know every plural name
/// up front.
#[derive(Default)]
pub struct Registry {
    by_gvr: HashMap<Gvr, Arc<dyn Adapter>>,
    by_group: HashMap<String, Arc<dyn Adapter>>,
    by_name: HashMap<&'static str, Arc<dyn Adapter>>,
    fallback: Option<Arc<dyn Adapter>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry with every built-in adapter registered, per §4.B.
    #[must_use]
    pub fn with_builtin_adapters() -> Self {
        let mut registry = Self::new();
        registry.register_gvr_adapter(Arc::new(NetworkPolicyAdapter)).expect("built-in registration");
        registry.register_group_adapter("cilium.io", Arc::new(CiliumPolicyAdapter)).expect("built-in registration");
        registry.register_gvr_adapter(Arc::new(ResourceQuotaAdapter)).expect("built-in registration");
        registry.register_gvr_adapter(Arc::new(LimitRangeAdapter)).expect("built-in registration");
        registry.register_gvr_adapter(Arc::new(WebhookConfigAdapter::validating())).expect("built-in registration");
        registry.register_gvr_adapter(Arc::new(WebhookConfigAdapter::mutating())).expect("built-in registration");
        registry
            .register_group_adapter("constraints.gatekeeper.sh", Arc::new(GatekeeperAdapter))
            .expect("built-in registration");
        registry.register_group_adapter("kyverno.io", Arc::new(KyvernoAdapter)).expect("built-in registration");
        registry.register_group_adapter("security.istio.io", Arc::new(IstioAdapter)).expect("built-in registration");
        registry.set_fallback(Arc::new(FallbackAdapter));
        registry
    }

    /// Registers an adapter for each GVR returned by its `handles()`.
    ///
    /// # Errors
    /// Returns an error if any of those GVRs already has a different adapter
    /// registered.
    pub fn register_gvr_adapter(&mut self, adapter: Arc<dyn Adapter>) -> Result<()> {
        for gvr in adapter.handles() {
            self.register(gvr.clone(), adapter.clone())?;
        }
        Ok(())
    }

    /// Registers `adapter` for an exact `gvr`.
    ///
    /// # Errors
    /// Returns an error if `gvr` already maps to an adapter with a different
    /// name.
    pub fn register(&mut self, gvr: Gvr, adapter: Arc<dyn Adapter>) -> Result<()> {
        if let Some(existing) = self.by_gvr.get(&gvr) {
            if existing.name() != adapter.name() {
                return Err(Error::adapter(format!(
                    "gvr {gvr} already registered to adapter '{}', cannot register '{}'",
                    existing.name(),
                    adapter.name()
                )));
            }
        }
        self.by_name.insert(adapter.name(), adapter.clone());
        self.by_gvr.insert(gvr, adapter);
        Ok(())
    }

    /// Registers `adapter` for `group`, unless a different adapter was
    /// already registered for that group (first-registered wins).
    ///
    /// # Errors
    /// Never fails; kept fallible to mirror [`Self::register`]'s shape for
    /// callers that treat adapter registration uniformly.
    pub fn register_group_adapter(&mut self, group: &str, adapter: Arc<dyn Adapter>) -> Result<()> {
        self.by_name.entry(adapter.name()).or_insert_with(|| adapter.clone());
        self.by_group.entry(group.to_string()).or_insert(adapter);
        Ok(())
    }

    /// Removes the exact-GVR registration for `gvr`, if any.
    pub fn unregister(&mut self, gvr: &Gvr) {
        self.by_gvr.remove(gvr);
    }

    pub fn set_fallback(&mut self, adapter: Arc<dyn Adapter>) {
        self.by_name.insert(adapter.name(), adapter.clone());
        self.fallback = Some(adapter);
    }

    #[must_use]
    pub fn for_gvr(&self, gvr: &Gvr) -> Option<Arc<dyn Adapter>> {
        self.by_gvr.get(gvr).cloned()
    }

    #[must_use]
    pub fn for_group(&self, group: &str) -> Option<Arc<dyn Adapter>> {
        self.by_group.get(group).cloned()
    }

    /// Looks up an adapter by its stable `name()`, for a `Profile`'s
    /// `force_adapter` override.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.by_name.get(name).cloned()
    }

    /// Resolves the adapter that should parse an object of kind `gvr`:
    /// exact-GVR match, then group match, then the fallback.
    #[must_use]
    pub fn resolve(&self, gvr: &Gvr) -> Option<Arc<dyn Adapter>> {
        self.for_gvr(gvr).or_else(|| self.for_group(&gvr.group)).or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(&'static str, Vec<Gvr>);
    impl Adapter for Stub {
        fn name(&self) -> &'static str {
            self.0
        }
        fn handles(&self) -> &[Gvr] {
            &self.1
        }
        fn parse(&self, _gvr: &Gvr, _object: &Value) -> Result<Vec<Constraint>> {
            Ok(vec![])
        }
    }

    #[test]
    fn gvr_collision_with_different_adapter_fails() {
        let gvr = Gvr::new("networking.k8s.io", "v1", "networkpolicies");
        let mut registry = Registry::new();
        registry.register(gvr.clone(), Arc::new(Stub("a", vec![]))).unwrap();
        let err = registry.register(gvr, Arc::new(Stub("b", vec![]))).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::ADAPTER_PARSE_FAILED);
    }

    #[test]
    fn group_registration_first_wins() {
        let mut registry = Registry::new();
        registry.register_group_adapter("gatekeeper.sh", Arc::new(Stub("first", vec![]))).unwrap();
        registry.register_group_adapter("gatekeeper.sh", Arc::new(Stub("second", vec![]))).unwrap();
        assert_eq!(registry.for_group("gatekeeper.sh").unwrap().name(), "first");
    }

    #[test]
    fn resolve_prefers_exact_gvr_over_group() {
        let gvr = Gvr::new("constraints.gatekeeper.sh", "v1beta1", "k8srequiredlabels");
        let mut registry = Registry::new();
        registry.register_group_adapter("constraints.gatekeeper.sh", Arc::new(Stub("group", vec![]))).unwrap();
        registry.register(gvr.clone(), Arc::new(Stub("exact", vec![gvr.clone()]))).unwrap();
        assert_eq!(registry.resolve(&gvr).unwrap().name(), "exact");
    }

    #[test]
    fn resolve_falls_back_when_nothing_matches() {
        let mut registry = Registry::new();
        registry.set_fallback(Arc::new(Stub("fallback", vec![])));
        let gvr = Gvr::new("example.com", "v1", "widgets");
        assert_eq!(registry.resolve(&gvr).unwrap().name(), "fallback");
    }

    #[test]
    fn builtin_registry_resolves_core_kinds() {
        let registry = Registry::with_builtin_adapters();
        let netpol = Gvr::new("networking.k8s.io", "v1", "networkpolicies");
        assert_eq!(registry.resolve(&netpol).unwrap().name(), "network-policy");
        let unmatched = Gvr::new("example.com", "v1", "widgets");
        assert_eq!(registry.resolve(&unmatched).unwrap().name(), "generic-fallback");
    }

    #[test]
    fn by_name_finds_group_and_fallback_registrations() {
        let registry = Registry::with_builtin_adapters();
        assert_eq!(registry.by_name("cilium-policy").unwrap().name(), "cilium-policy");
        assert_eq!(registry.by_name("generic-fallback").unwrap().name(), "generic-fallback");
        assert!(registry.by_name("not-a-real-adapter").is_none());
    }
}
