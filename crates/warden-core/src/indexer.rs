//! Concurrent in-memory store of Constraints, with secondary indices
//! maintained incrementally and a drop-on-full change-subscription fan-out
//! (§4.D).

use std::collections::BTreeMap;
use std::sync::Mutex;

use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;

use crate::model::{Constraint, ConstraintType, Gvr};
use crate::selector;

/// One change the indexer fans out to subscribers.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Upserted(Constraint),
    Deleted(String),
}

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// The concurrent Constraint store. Every read method returns owned copies;
/// callers never see a reference into the live map.
#[derive(Default)]
pub struct Indexer {
    primary: DashMap<String, Constraint>,
    by_namespace: DashMap<String, DashSet<String>>,
    by_type: DashMap<ConstraintType, DashSet<String>>,
    by_source_gvr: DashMap<Gvr, DashSet<String>>,
    by_source_uid: DashMap<String, DashSet<String>>,
    subscribers: Mutex<Vec<mpsc::Sender<ChangeEvent>>>,
}

impl Indexer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a Constraint by UID, updating every secondary
    /// index incrementally, then notifies subscribers.
    pub fn upsert(&self, mut constraint: Constraint) {
        constraint.normalize_affected_namespaces();
        let uid = constraint.uid.clone();

        if let Some(previous) = self.primary.get(&uid) {
            self.unindex(&previous);
        }

        for ns in &constraint.affected_namespaces {
            self.by_namespace.entry(ns.clone()).or_default().insert(uid.clone());
        }
        if constraint.affected_namespaces.is_empty() {
            self.by_namespace.entry(String::new()).or_default().insert(uid.clone());
        }
        self.by_type.entry(constraint.constraint_type).or_default().insert(uid.clone());
        self.by_source_gvr.entry(constraint.source.clone()).or_default().insert(uid.clone());

        // The source UID is the Constraint UID itself when no subpath was
        // used to derive it; adapters that derive sub-UIDs track provenance
        // via this index keyed by the *Constraint* UID's prefix being
        // recoverable only when the adapter records it in Details. For
        // adapters that emit one Constraint per source object this is exact;
        // multi-Constraint adapters additionally register the mapping
        // explicitly via `register_source_uid`.
        self.by_source_uid.entry(uid.clone()).or_default().insert(uid.clone());

        self.primary.insert(uid.clone(), constraint.clone());
        self.notify(ChangeEvent::Upserted(constraint));
    }

    /// Registers that `constraint_uid` was derived from `source_uid`, so a
    /// later tombstone for `source_uid` removes it via
    /// [`Self::delete_by_source_uid`]. Adapters that derive multiple
    /// Constraint UIDs from one source object call this after `upsert`.
    pub fn register_source_uid(&self, source_uid: &str, constraint_uid: &str) {
        self.by_source_uid.entry(source_uid.to_string()).or_default().insert(constraint_uid.to_string());
    }

    /// Removes a Constraint by its own UID.
    pub fn delete(&self, uid: &str) {
        if let Some((_, constraint)) = self.primary.remove(uid) {
            self.unindex(&constraint);
            self.notify(ChangeEvent::Deleted(uid.to_string()));
        }
    }

    /// Removes every Constraint registered under `source_uid`, for the
    /// one-source-object-to-many-constraints case (§3 invariant).
    pub fn delete_by_source_uid(&self, source_uid: &str) {
        if let Some((_, uids)) = self.by_source_uid.remove(source_uid) {
            for uid in uids {
                self.delete(&uid);
            }
        }
    }

    fn unindex(&self, constraint: &Constraint) {
        for ns in &constraint.affected_namespaces {
            if let Some(set) = self.by_namespace.get(ns) {
                set.remove(&constraint.uid);
            }
        }
        if constraint.affected_namespaces.is_empty() {
            if let Some(set) = self.by_namespace.get("") {
                set.remove(&constraint.uid);
            }
        }
        if let Some(set) = self.by_type.get(&constraint.constraint_type) {
            set.remove(&constraint.uid);
        }
        if let Some(set) = self.by_source_gvr.get(&constraint.source) {
            set.remove(&constraint.uid);
        }
    }

    fn notify(&self, event: ChangeEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Registers a new change subscriber with a bounded, drop-on-full
    /// channel.
    pub fn subscribe(&self) -> mpsc::Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(tx);
        rx
    }

    /// Constraints whose `AffectedNamespaces` contains `namespace`, or is
    /// empty (cluster-scoped catch-all).
    #[must_use]
    pub fn by_namespace(&self, namespace: &str) -> Vec<Constraint> {
        let mut uids: Vec<String> = Vec::new();
        if let Some(set) = self.by_namespace.get(namespace) {
            uids.extend(set.iter().map(|u| u.clone()));
        }
        if !namespace.is_empty() {
            if let Some(set) = self.by_namespace.get("") {
                uids.extend(set.iter().map(|u| u.clone()));
            }
        }
        uids.sort();
        uids.dedup();
        uids.into_iter().filter_map(|uid| self.primary.get(&uid).map(|c| c.clone())).collect()
    }

    /// Restricts [`Self::by_namespace`] further by selector match against
    /// `labels`.
    #[must_use]
    pub fn by_labels(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Vec<Constraint> {
        self.by_namespace(namespace)
            .into_iter()
            .filter(|c| selector::matches(c.workload_selector.as_ref(), labels))
            .collect()
    }

    #[must_use]
    pub fn by_type(&self, constraint_type: ConstraintType) -> Vec<Constraint> {
        let Some(set) = self.by_type.get(&constraint_type) else {
            return vec![];
        };
        set.iter().filter_map(|uid| self.primary.get(uid.as_str()).map(|c| c.clone())).collect()
    }

    #[must_use]
    pub fn by_source_gvr(&self, gvr: &Gvr) -> Vec<Constraint> {
        let Some(set) = self.by_source_gvr.get(gvr) else {
            return vec![];
        };
        set.iter().filter_map(|uid| self.primary.get(uid.as_str()).map(|c| c.clone())).collect()
    }

    #[must_use]
    pub fn all(&self) -> Vec<Constraint> {
        self.primary.iter().map(|entry| entry.value().clone()).collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.primary.len()
    }

    #[must_use]
    pub fn get(&self, uid: &str) -> Option<Constraint> {
        self.primary.get(uid).map(|c| c.clone())
    }
}
