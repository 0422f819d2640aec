//! Property-based checks for invariants that must hold for every Constraint
//! and every detail-level pairing, not just the fixed cases the unit tests
//! cover.

use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest::proptest;
use warden_core::correlator::CorrelatedNotification;
use warden_core::dispatcher::render_message;
use warden_core::model::{DetailLevel, WorkloadRef};
use warden_test_support::fixtures::sample_constraint;

fn namespace_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn affected_namespaces_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(namespace_strategy(), 0..4)
}

fn detail_level_strategy() -> impl Strategy<Value = DetailLevel> {
    prop_oneof![Just(DetailLevel::Summary), Just(DetailLevel::Detailed), Just(DetailLevel::Full)]
}

/// A below-full detail level, for checking property 5's cross-namespace
/// redaction (full is exempt — it reveals everything by design).
fn below_full_level_strategy() -> impl Strategy<Value = DetailLevel> {
    prop_oneof![Just(DetailLevel::Summary), Just(DetailLevel::Detailed)]
}

/// A token with a distinguishing prefix so two independently generated
/// tokens can never collide with each other or with the adapter's static
/// phrasing ("network policy", "denies all ingress", etc.), making substring
/// containment checks between them unambiguous.
fn token_strategy(prefix: &'static str) -> impl Strategy<Value = String> {
    "[a-z0-9]{4,10}".prop_map(move |suffix| format!("{prefix}-{suffix}"))
}

proptest! {
    /// A constraint with an empty namespace and no explicit affected
    /// namespaces applies everywhere, regardless of what namespace is asked
    /// about, per `Constraint::applies_to_namespace`'s cluster-scoped
    /// catch-all rule.
    #[test]
    fn cluster_scoped_constraint_applies_to_any_namespace(queried in namespace_strategy()) {
        let mut constraint = sample_constraint("");
        constraint.namespace = String::new();
        constraint.affected_namespaces = vec![];
        prop_assert!(constraint.applies_to_namespace(&queried));
    }

    /// After normalization, `applies_to_namespace(namespace)` is true for the
    /// constraint's own namespace and every explicitly listed affected
    /// namespace, and the affected list never has duplicates.
    #[test]
    fn normalized_affected_namespaces_include_own_namespace_and_dedupe(
        namespace in namespace_strategy(),
        mut extra in affected_namespaces_strategy(),
    ) {
        let mut constraint = sample_constraint(&namespace);
        constraint.namespace = namespace.clone();
        extra.push(namespace.clone());
        constraint.affected_namespaces = extra;
        constraint.normalize_affected_namespaces();

        prop_assert!(constraint.applies_to_namespace(&namespace));
        let mut sorted = constraint.affected_namespaces.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(constraint.affected_namespaces, sorted);
    }

    /// The indexer's `by_namespace` index agrees with `Constraint::applies_to_namespace`
    /// for every constraint it holds, no matter the upsert order.
    #[test]
    fn indexer_by_namespace_matches_applies_to_namespace(
        namespaces in proptest::collection::vec(namespace_strategy(), 1..5),
        queried in namespace_strategy(),
    ) {
        let indexer = warden_core::indexer::Indexer::new();
        for (i, ns) in namespaces.iter().enumerate() {
            let mut c = sample_constraint(ns);
            c.uid = format!("c-{i}");
            indexer.upsert(c);
        }

        let found_uids: std::collections::BTreeSet<String> =
            indexer.by_namespace(&queried).into_iter().map(|c| c.uid).collect();
        let expected_uids: std::collections::BTreeSet<String> = indexer
            .all()
            .into_iter()
            .filter(|c| c.applies_to_namespace(&queried))
            .map(|c| c.uid)
            .collect();
        prop_assert_eq!(found_uids, expected_uids);
    }

    /// `DetailLevel`'s `min` always returns whichever operand is no more
    /// permissive, so clamping a requested level against a namespace ceiling
    /// can never widen visibility.
    #[test]
    fn detail_level_min_never_exceeds_either_operand(
        a in detail_level_strategy(),
        b in detail_level_strategy(),
    ) {
        let clamped = a.min(b);
        prop_assert!(clamped <= a);
        prop_assert!(clamped <= b);
    }

    /// Property 5: for every detail level below full, a rendered message for
    /// a cross-namespace constraint contains neither the constraint's name
    /// nor any string from its Details map.
    #[test]
    fn cross_namespace_message_withholds_name_and_details_below_full(
        constraint_name in token_strategy("name"),
        constraint_namespace in token_strategy("ns-constraint"),
        viewer_namespace in token_strategy("ns-viewer"),
        detail_value in token_strategy("detail"),
        level in below_full_level_strategy(),
    ) {
        let mut constraint = sample_constraint(&constraint_namespace);
        constraint.name = constraint_name.clone();
        constraint.namespace = constraint_namespace.clone();
        constraint.affected_namespaces = vec![constraint_namespace.clone()];
        constraint.details = BTreeMap::from([("key".to_string(), serde_json::json!(detail_value))]);

        let notification = CorrelatedNotification {
            workload: WorkloadRef {
                kind: "Deployment".to_string(),
                api_version: "apps/v1".to_string(),
                name: "web".to_string(),
                namespace: viewer_namespace.clone(),
                uid: "wl-1".to_string(),
            },
            constraint: constraint.clone(),
            reason: "FailedCreate".to_string(),
            message: "blocked".to_string(),
        };

        let message = render_message(&constraint, &notification, level);
        prop_assert!(!message.contains(&constraint_name));
        prop_assert!(!message.contains(&detail_value));
    }
}
