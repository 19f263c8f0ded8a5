//! Append-only audit chain for policy mutations.
//!
//! Every mutation records the content hash before and after the change.
//! The chain is verifiable per policy: ordered by timestamp, each entry's
//! `after_hash` must equal the next entry's `before_hash`, except where a
//! create begins a new chain. Verification reports gaps without rejecting
//! the chain.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use verdict_policy::{MutationAction, MutationRecord};
use verdict_primitives::{EventId, NULL_HASH};

/// One immutable audit record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: EventId,
    /// The mutated policy.
    pub policy_id: String,
    /// Policy content version after the mutation.
    pub policy_version: String,
    /// What happened.
    pub action: MutationAction,
    /// Identity that performed the mutation.
    pub actor: String,
    /// When the mutation happened.
    pub timestamp: DateTime<Utc>,
    /// Content hash before the mutation (`"null"` for create).
    pub before_hash: String,
    /// Content hash after the mutation.
    pub after_hash: String,
    /// Correlates the mutation with an inbound request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Open metadata map.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl AuditEntry {
    /// Builds an entry from an engine mutation record.
    #[must_use]
    pub fn from_mutation(record: &MutationRecord, correlation_id: Option<String>) -> Self {
        Self {
            id: EventId::random(),
            policy_id: record.policy_id.clone(),
            policy_version: record.policy_version.clone(),
            action: record.action,
            actor: record.actor.clone(),
            timestamp: Utc::now(),
            before_hash: record.before_hash.clone(),
            after_hash: record.after_hash.clone(),
            correlation_id,
            metadata: Map::new(),
        }
    }
}

/// A discontinuity found while verifying a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainGap {
    /// Position of the entry whose `before_hash` broke the chain.
    pub index: usize,
    /// Hash the previous entry ended with.
    pub expected: String,
    /// Hash the entry actually recorded.
    pub found: String,
}

/// Result of verifying one policy's audit chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditChainReport {
    /// The verified policy.
    pub policy_id: String,
    /// Entries examined.
    pub entries: usize,
    /// `true` when no gap was found.
    pub intact: bool,
    /// Every discontinuity, in order.
    pub gaps: Vec<ChainGap>,
}

/// Append-only store contract. There is deliberately no update or delete
/// operation; storage backends additionally enforce immutability with a
/// rule or trigger.
pub trait AuditStore: Send + Sync {
    /// Appends an entry.
    fn append(&self, entry: AuditEntry);

    /// Returns every entry for a policy, ordered by timestamp.
    fn entries_for(&self, policy_id: &str) -> Vec<AuditEntry>;

    /// Returns the total number of entries.
    fn len(&self) -> usize;

    /// Returns `true` when the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verifies the hash chain for one policy.
    fn verify(&self, policy_id: &str) -> AuditChainReport {
        let entries = self.entries_for(policy_id);
        let mut gaps = Vec::new();
        let mut expected = NULL_HASH.to_owned();

        for (index, entry) in entries.iter().enumerate() {
            // A create starts a fresh chain; everything else must link to
            // the previous entry's after_hash.
            let starts_chain = entry.action == MutationAction::Create;
            if !starts_chain && entry.before_hash != expected {
                gaps.push(ChainGap {
                    index,
                    expected: expected.clone(),
                    found: entry.before_hash.clone(),
                });
            }
            expected.clone_from(&entry.after_hash);
        }

        if !gaps.is_empty() {
            warn!(policy_id, gaps = gaps.len(), "audit chain has gaps");
        }

        AuditChainReport {
            policy_id: policy_id.to_owned(),
            entries: entries.len(),
            intact: gaps.is_empty(),
            gaps,
        }
    }
}

/// In-memory reference store used by tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, entry: AuditEntry) {
        self.entries.write().push(entry);
    }

    fn entries_for(&self, policy_id: &str) -> Vec<AuditEntry> {
        let mut entries: Vec<AuditEntry> = self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.policy_id == policy_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        entries
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(
        policy_id: &str,
        action: MutationAction,
        before: &str,
        after: &str,
        at: DateTime<Utc>,
    ) -> AuditEntry {
        AuditEntry {
            id: EventId::random(),
            policy_id: policy_id.into(),
            policy_version: "1.0.0".into(),
            action,
            actor: "tests".into(),
            timestamp: at,
            before_hash: before.into(),
            after_hash: after.into(),
            correlation_id: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn intact_chain_verifies() {
        use chrono::TimeZone;
        let store = InMemoryAuditStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store.append(entry("p", MutationAction::Create, NULL_HASH, "h1", t0));
        store.append(entry(
            "p",
            MutationAction::Edit,
            "h1",
            "h2",
            t0 + chrono::Duration::seconds(1),
        ));
        store.append(entry(
            "p",
            MutationAction::Disable,
            "h2",
            "h3",
            t0 + chrono::Duration::seconds(2),
        ));

        let report = store.verify("p");
        assert!(report.intact);
        assert_eq!(report.entries, 3);
    }

    #[test]
    fn gaps_are_reported_not_rejected() {
        use chrono::TimeZone;
        let store = InMemoryAuditStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store.append(entry("p", MutationAction::Create, NULL_HASH, "h1", t0));
        // Missing the h1 -> h2 edit.
        store.append(entry(
            "p",
            MutationAction::Edit,
            "h2",
            "h3",
            t0 + chrono::Duration::seconds(5),
        ));

        let report = store.verify("p");
        assert!(!report.intact);
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].index, 1);
        assert_eq!(report.gaps[0].expected, "h1");
        assert_eq!(report.gaps[0].found, "h2");
    }

    #[test]
    fn create_starts_a_fresh_chain() {
        use chrono::TimeZone;
        let store = InMemoryAuditStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store.append(entry("p", MutationAction::Create, NULL_HASH, "h1", t0));
        store.append(entry(
            "p",
            MutationAction::Delete,
            "h1",
            "h2",
            t0 + chrono::Duration::seconds(1),
        ));
        // Re-created after deletion: a new chain begins.
        store.append(entry(
            "p",
            MutationAction::Create,
            NULL_HASH,
            "h4",
            t0 + chrono::Duration::seconds(2),
        ));

        let report = store.verify("p");
        assert!(report.intact);
    }

    #[test]
    fn entries_are_scoped_per_policy() {
        use chrono::TimeZone;
        let store = InMemoryAuditStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store.append(entry("a", MutationAction::Create, NULL_HASH, "h1", t0));
        store.append(entry("b", MutationAction::Create, NULL_HASH, "h1", t0));

        assert_eq!(store.entries_for("a").len(), 1);
        assert_eq!(store.len(), 2);
        assert!(!store.is_empty());
    }
}
