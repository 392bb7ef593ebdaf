//! Per-agent audit trail.
//!
//! Append-only and blake3 hash-chained. Entries are built against the
//! current head without mutating the trail, and committed only after the
//! durable write succeeded. Only lifecycle events are recorded; raw
//! attestation receipts never enter the trail.

use crate::lifecycle::LifecycleEvent;
use bond_types::{AssetId, BondError, BondResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    pub index: u64,
    pub asset_id: AssetId,
    /// Record revision the event was committed with
    pub revision: u64,
    pub timestamp: DateTime<Utc>,
    pub event: Value,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditTrail {
    asset_id: AssetId,
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            entries: Vec::new(),
        }
    }

    /// Rebuild a trail from persisted entries and verify the chain.
    pub fn from_entries(asset_id: AssetId, entries: Vec<AuditEntry>) -> BondResult<Self> {
        let trail = Self { asset_id, entries };

        for (expected_index, entry) in trail.entries.iter().enumerate() {
            if entry.index != expected_index as u64 {
                return Err(BondError::Storage(format!(
                    "audit index gap for {} at position {} (found {})",
                    trail.asset_id, expected_index, entry.index
                )));
            }
        }
        if !trail.verify_chain() {
            return Err(BondError::Storage(format!(
                "audit hash-chain verification failed for {}",
                trail.asset_id
            )));
        }
        Ok(trail)
    }

    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn head_hash(&self) -> Option<&str> {
        self.entries.last().map(|entry| entry.entry_hash.as_str())
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for entry in &self.entries {
            if entry.previous_hash != previous_hash {
                return false;
            }
            let expected = compute_entry_hash(
                entry.index,
                &entry.asset_id,
                entry.revision,
                entry.timestamp,
                &entry.event,
                previous_hash.as_deref(),
            );
            if entry.entry_hash != expected {
                return false;
            }
            previous_hash = Some(entry.entry_hash.clone());
        }
        true
    }

    /// Build chained entries for `events` without touching the trail.
    pub fn build_entries(
        &self,
        revision: u64,
        events: &[LifecycleEvent],
        timestamp: DateTime<Utc>,
    ) -> BondResult<Vec<AuditEntry>> {
        let mut built = Vec::with_capacity(events.len());
        let mut index = self.entries.len() as u64;
        let mut previous_hash = self.head_hash().map(str::to_string);

        for event in events {
            let payload = serde_json::to_value(event)
                .map_err(|e| BondError::Storage(format!("audit event serialization: {e}")))?;
            let entry_hash = compute_entry_hash(
                index,
                &self.asset_id,
                revision,
                timestamp,
                &payload,
                previous_hash.as_deref(),
            );
            built.push(AuditEntry {
                entry_id: Uuid::new_v4().to_string(),
                index,
                asset_id: self.asset_id.clone(),
                revision,
                timestamp,
                event: payload,
                previous_hash: previous_hash.clone(),
                entry_hash: entry_hash.clone(),
            });
            previous_hash = Some(entry_hash);
            index += 1;
        }
        Ok(built)
    }

    /// Commit pre-built entries after durability succeeds.
    pub fn commit_entries(&mut self, entries: Vec<AuditEntry>) -> BondResult<()> {
        for entry in entries {
            let expected_index = self.entries.len() as u64;
            if entry.index != expected_index {
                return Err(BondError::Storage(format!(
                    "audit commit index mismatch: expected {}, got {}",
                    expected_index, entry.index
                )));
            }
            if entry.previous_hash.as_deref() != self.head_hash() {
                return Err(BondError::Storage(
                    "audit commit previous hash mismatch".to_string(),
                ));
            }
            self.entries.push(entry);
        }
        Ok(())
    }
}

fn compute_entry_hash(
    index: u64,
    asset_id: &AssetId,
    revision: u64,
    timestamp: DateTime<Utc>,
    event: &Value,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "index": index,
        "asset_id": asset_id,
        "revision": revision,
        "timestamp": timestamp,
        "event": event,
        "previous_hash": previous_hash,
    });

    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bond_types::{AgentState, CommandKind};

    fn transition(from: AgentState, to: AgentState) -> LifecycleEvent {
        LifecycleEvent::StateChanged {
            command: CommandKind::Activate,
            from,
            to,
        }
    }

    #[test]
    fn test_verifies_hash_chain() {
        let mut trail = AuditTrail::new(AssetId::new("nft-1"));
        let built = trail
            .build_entries(
                1,
                &[
                    transition(AgentState::Uninitialized, AgentState::PendingBond),
                    transition(AgentState::PendingBond, AgentState::Active),
                ],
                Utc::now(),
            )
            .unwrap();
        assert!(trail.is_empty());
        trail.commit_entries(built).unwrap();
        assert_eq!(trail.len(), 2);
        assert!(trail.verify_chain());

        let restored =
            AuditTrail::from_entries(AssetId::new("nft-1"), trail.entries().to_vec()).unwrap();
        assert_eq!(restored, trail);
    }

    #[test]
    fn test_detects_tampered_entries() {
        let mut trail = AuditTrail::new(AssetId::new("nft-1"));
        let built = trail
            .build_entries(
                1,
                &[transition(AgentState::Active, AgentState::Frozen)],
                Utc::now(),
            )
            .unwrap();
        trail.commit_entries(built).unwrap();

        let mut entries = trail.entries().to_vec();
        entries[0].event = serde_json::json!({"tampered": true});
        assert!(AuditTrail::from_entries(AssetId::new("nft-1"), entries).is_err());
    }

    #[test]
    fn test_rejects_stale_commit() {
        let mut trail = AuditTrail::new(AssetId::new("nft-1"));
        let event = [transition(AgentState::Active, AgentState::Frozen)];
        let first = trail.build_entries(1, &event, Utc::now()).unwrap();
        let stale = trail.build_entries(1, &event, Utc::now()).unwrap();
        trail.commit_entries(first).unwrap();
        assert!(trail.commit_entries(stale).is_err());
    }
}
