//! # Event Log
//!
//! Append-only log of everything observable at the system boundary: role
//! changes, verification outcomes, mints, links, access grants, trades, and
//! ledger administration. Every mutating operation records exactly one event
//! after its state change commits, giving external indexers a durable,
//! ordered notification stream.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use parking_lot::RwLock;
use veridata_core::{AccountId, Amount, AssetId, Fingerprint, LedgerId};

use crate::policy::Capability;
use crate::verification::VerificationRecord;

/// Notification emitted by a committed state change
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    CapabilityGranted {
        account: AccountId,
        capability: Capability,
    },
    CapabilityRevoked {
        account: AccountId,
        capability: Capability,
    },
    /// Full attestation plus the asset minted from it (NO_ASSET if none)
    VerificationSubmitted {
        record: VerificationRecord,
        asset_id: AssetId,
    },
    AssetMinted {
        asset_id: AssetId,
        owner: AccountId,
        fingerprint: Fingerprint,
    },
    LedgerLinked {
        asset_id: AssetId,
        ledger_id: LedgerId,
    },
    AccessGranted {
        asset_id: AssetId,
        account: AccountId,
        payment: Amount,
    },
    AssetTransferred {
        asset_id: AssetId,
        from: AccountId,
        to: AccountId,
    },
    AssetBurned {
        asset_id: AssetId,
    },
    AssetListed {
        asset_id: AssetId,
        seller: AccountId,
        price: Amount,
    },
    ListingCancelled {
        asset_id: AssetId,
    },
    ListingPriceUpdated {
        asset_id: AssetId,
        price: Amount,
    },
    AssetSold {
        asset_id: AssetId,
        seller: AccountId,
        buyer: AccountId,
        price: Amount,
    },
    CreditsPurchased {
        ledger_id: LedgerId,
        account: AccountId,
        amount: Amount,
        cost: Amount,
        refunded: Amount,
    },
    CreditsTransferred {
        ledger_id: LedgerId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    UnitPriceSet {
        ledger_id: LedgerId,
        unit_price: Amount,
    },
    MaxSupplySet {
        ledger_id: LedgerId,
        max_supply: Amount,
    },
    TreasuryWithdrawn {
        ledger_id: LedgerId,
        to: AccountId,
        amount: Amount,
    },
}

/// An event with its position in the log and commit timestamp
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// 1-based sequence number, dense and strictly increasing
    pub seq: u64,
    /// Commit time, Utc seconds
    pub timestamp: i64,
    pub event: MarketEvent,
}

/// Shared append-only event log
pub struct EventLog {
    events: RwLock<Vec<RecordedEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Append an event, assigning the next sequence number
    pub fn record(&self, event: MarketEvent) -> u64 {
        let mut events = self.events.write();
        let seq = events.len() as u64 + 1;
        events.push(RecordedEvent {
            seq,
            timestamp: chrono::Utc::now().timestamp(),
            event,
        });
        seq
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Snapshot of all events from a sequence number onward (1-based)
    pub fn since(&self, seq: u64) -> Vec<RecordedEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.seq >= seq)
            .cloned()
            .collect()
    }

    /// Snapshot of the full log
    pub fn all(&self) -> Vec<RecordedEvent> {
        self.events.read().clone()
    }

    /// Most recent event, if any
    pub fn last(&self) -> Option<RecordedEvent> {
        self.events.read().last().cloned()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience handle shared by all components
pub type SharedEvents = Arc<EventLog>;
