//! The constraint-like classification predicate (§4.C).

use crate::adapters::Registry;
use crate::config::DiscoveryConfig;
use crate::model::Gvr;
use crate::profile::ProfileSet;

/// Known native quota/limit-range kinds, always constraint-like regardless of
/// configuration.
const NATIVE_QUOTA_KINDS: [(&str, &str, &str); 2] =
    [("", "v1", "resourcequotas"), ("", "v1", "limitranges")];

/// Reports whether `gvr` should be watched for constraints, per the §4.C
/// classification predicate: group allow-list, registered adapter, native
/// quota kind, plural-name hint, profile override, or an `io/is-policy=true`
/// schema annotation (passed in as `schema_marks_policy` since it comes from
/// the API server's CRD schema, not the GVR itself).
#[must_use]
pub fn is_constraint_like(
    gvr: &Gvr,
    schema_marks_policy: bool,
    config: &DiscoveryConfig,
    registry: &Registry,
    profiles: &ProfileSet,
) -> bool {
    if config.policy_group_allowlist.iter().any(|g| g == &gvr.group) {
        return true;
    }
    if registry.for_gvr(gvr).is_some() || registry.for_group(&gvr.group).is_some() {
        return true;
    }
    if NATIVE_QUOTA_KINDS.iter().any(|(g, v, r)| *g == gvr.group && *v == gvr.version && *r == gvr.resource) {
        return true;
    }
    if config.plural_name_hints.iter().any(|hint| gvr.resource.to_lowercase().contains(hint.as_str())) {
        return true;
    }
    if profiles.forces_constraint_like(gvr) {
        return true;
    }
    schema_marks_policy
}
