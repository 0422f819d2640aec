//! Label-selector matching: `matchLabels` + `matchExpressions` semantics
//! identical to the Kubernetes API server's, including the "absent selector
//! matches everything" rule used throughout §4 (workload selectors,
//! namespace selectors, adapter `podSelector`/`namespaceSelector` fields).

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

/// Reports whether `labels` satisfies `selector`.
///
/// `None` matches everything, matching the Constraint model's convention that
/// an absent `WorkloadSelector`/`NamespaceSelector` means "all in scope".
#[must_use]
pub fn matches(selector: Option<&LabelSelector>, labels: &BTreeMap<String, String>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    matches_strict(selector, labels)
}

/// Reports whether `labels` satisfies `selector`, treating a present-but-empty
/// selector (no `matchLabels`, no `matchExpressions`) as matching everything,
/// per Kubernetes semantics.
#[must_use]
pub fn matches_strict(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    if let Some(match_labels) = &selector.match_labels {
        for (k, v) in match_labels {
            if labels.get(k) != Some(v) {
                return false;
            }
        }
    }
    if let Some(expressions) = &selector.match_expressions {
        for expr in expressions {
            if !expression_matches(expr, labels) {
                return false;
            }
        }
    }
    true
}

fn expression_matches(
    expr: &k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let values = expr.values.as_deref().unwrap_or(&[]);
    match expr.operator.as_str() {
        "In" => labels.get(&expr.key).is_some_and(|v| values.contains(v)),
        "NotIn" => !labels.get(&expr.key).is_some_and(|v| values.contains(v)),
        "Exists" => labels.contains_key(&expr.key),
        "DoesNotExist" => !labels.contains_key(&expr.key),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn absent_selector_matches_everything() {
        assert!(matches(None, &labels(&[])));
        assert!(matches(None, &labels(&[("app", "checkout")])));
    }

    #[test]
    fn empty_selector_matches_everything() {
        let sel = LabelSelector { match_labels: None, match_expressions: None };
        assert!(matches_strict(&sel, &labels(&[("app", "checkout")])));
    }

    #[test]
    fn match_labels_requires_exact_value() {
        let sel = LabelSelector {
            match_labels: Some(BTreeMap::from([("app".to_string(), "checkout".to_string())])),
            match_expressions: None,
        };
        assert!(matches_strict(&sel, &labels(&[("app", "checkout"), ("tier", "frontend")])));
        assert!(!matches_strict(&sel, &labels(&[("app", "billing")])));
        assert!(!matches_strict(&sel, &labels(&[])));
    }

    #[test]
    fn match_expressions_in_and_not_in() {
        let sel = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".to_string(),
                operator: "In".to_string(),
                values: Some(vec!["frontend".to_string(), "api".to_string()]),
            }]),
        };
        assert!(matches_strict(&sel, &labels(&[("tier", "api")])));
        assert!(!matches_strict(&sel, &labels(&[("tier", "backend")])));
    }

    #[test]
    fn match_expressions_exists_and_does_not_exist() {
        let exists = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".to_string(),
                operator: "Exists".to_string(),
                values: None,
            }]),
        };
        assert!(matches_strict(&exists, &labels(&[("tier", "api")])));
        assert!(!matches_strict(&exists, &labels(&[])));

        let absent = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".to_string(),
                operator: "DoesNotExist".to_string(),
                values: None,
            }]),
        };
        assert!(absent_matches(&absent, &labels(&[])));
        assert!(!absent_matches(&absent, &labels(&[("tier", "api")])));
    }

    fn absent_matches(sel: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
        matches_strict(sel, labels)
    }

    #[test]
    fn combined_labels_and_expressions_both_must_hold() {
        let sel = LabelSelector {
            match_labels: Some(BTreeMap::from([("app".to_string(), "checkout".to_string())])),
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".to_string(),
                operator: "In".to_string(),
                values: Some(vec!["frontend".to_string()]),
            }]),
        };
        assert!(matches_strict(&sel, &labels(&[("app", "checkout"), ("tier", "frontend")])));
        assert!(!matches_strict(&sel, &labels(&[("app", "checkout"), ("tier", "backend")])));
    }
}
