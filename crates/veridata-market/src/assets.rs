//! # Asset Ledger
//!
//! Ownership and access control for verified-dataset assets. An asset exists
//! iff it was minted, and minting is gated on the fingerprint's latest
//! attestation having passed. Each asset links to at most one credit ledger,
//! exactly once; the link never resets.
//!
//! ## Asset lifecycle
//!
//! ```text
//! nonexistent ──mint──► minted ──link──► linked ──(listed ⇄ unlisted)──► burned
//!                                  │
//!                                  └── one-way: no unlink exists
//! ```
//!
//! ## Access gates
//!
//! Two distinct gates exist and can disagree, preserving the source
//! system's observable behavior:
//!
//! - `has_access` / `request_access`: the authorized-reader set. Canonical
//!   for content + key release. Standing membership, survives ownership
//!   changes and balance changes.
//! - `content_ref_for`: display-layer gate on live linked-ledger balance.
//!   An account that spent its credits loses this gate while keeping
//!   `has_access`, and vice versa.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;
use veridata_core::{
    valid_content_ref, AccountId, Amount, AssetId, Fingerprint, LedgerId, MarketError, Result,
};

use crate::credits::CreditsHub;
use crate::events::{EventLog, MarketEvent};
use crate::policy::{AuthorityPolicy, Capability};
use crate::verification::VerificationRegistry;

/// Link state of an asset's payment ledger; transitions only Unlinked → Linked
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LedgerLink {
    Unlinked,
    Linked { ledger_id: LedgerId },
}

/// A uniquely owned, transferable record over a verified dataset
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub owner: AccountId,
    pub content_ref: String,
    pub fingerprint: Fingerprint,
    pub link: LedgerLink,
    pub authorized_readers: HashSet<AccountId>,
    pub is_private: bool,
    /// Present only for private assets; released through access paths
    decryption_key: Option<String>,
    /// Mint time, Utc seconds
    pub minted_at: i64,
}

impl Asset {
    fn bundle(&self) -> AccessBundle {
        AccessBundle {
            content_ref: self.content_ref.clone(),
            decryption_key: self.decryption_key.clone(),
        }
    }
}

/// Content reference plus decryption key released by an access grant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessBundle {
    pub content_ref: String,
    /// None for public assets or when the key fetch fell back
    pub decryption_key: Option<String>,
}

/// Parameters for minting a new asset
#[derive(Clone, Debug)]
pub struct MintRequest {
    pub content_ref: String,
    pub fingerprint: Fingerprint,
    pub is_private: bool,
    pub decryption_key: Option<String>,
    pub recipient: AccountId,
}

/// The central entity store: unique asset identities, ownership, links,
/// reader sets, and operator approvals
pub struct AssetLedger {
    policy: Arc<AuthorityPolicy>,
    registry: Arc<VerificationRegistry>,
    credits: Arc<CreditsHub>,
    events: Arc<EventLog>,
    assets: RwLock<HashMap<AssetId, Asset>>,
    /// Per-asset delegated transfer rights (cleared on transfer)
    approvals: RwLock<HashMap<AssetId, AccountId>>,
    next_id: AtomicU64,
}

impl AssetLedger {
    pub fn new(
        policy: Arc<AuthorityPolicy>,
        registry: Arc<VerificationRegistry>,
        credits: Arc<CreditsHub>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            policy,
            registry,
            credits,
            events,
            assets: RwLock::new(HashMap::new()),
            approvals: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Mint a new asset for a verified fingerprint
    ///
    /// Caller must hold `MintAsset`; the fingerprint's latest attestation
    /// must have passed. Ids are sequential, 1-based, never reused.
    pub fn mint(&self, caller: &AccountId, request: MintRequest) -> Result<AssetId> {
        self.policy.require(caller, Capability::MintAsset)?;
        if !valid_content_ref(&request.content_ref) {
            return Err(MarketError::InvalidInput(format!(
                "content_ref '{}' is empty or has an unaccepted scheme",
                request.content_ref
            )));
        }
        if request.recipient.is_zero() {
            return Err(MarketError::InvalidInput("recipient account is zero".into()));
        }
        if !self.registry.is_verified(&request.fingerprint) {
            return Err(MarketError::NotAuthorized(format!(
                "fingerprint {} has no passing verification",
                request.fingerprint
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let asset = Asset {
            id,
            owner: request.recipient,
            content_ref: request.content_ref,
            fingerprint: request.fingerprint,
            link: LedgerLink::Unlinked,
            authorized_readers: HashSet::from([request.recipient]),
            is_private: request.is_private,
            decryption_key: if request.is_private {
                request.decryption_key
            } else {
                None
            },
            minted_at: chrono::Utc::now().timestamp(),
        };
        self.assets.write().insert(id, asset);

        info!(asset = id, owner = %request.recipient, fingerprint = %request.fingerprint, "asset minted");
        self.events.record(MarketEvent::AssetMinted {
            asset_id: id,
            owner: request.recipient,
            fingerprint: request.fingerprint,
        });
        Ok(id)
    }

    /// Attach a credit ledger to an asset, one time only
    ///
    /// Restricted to the `LinkLedger` capability (the minting authority).
    /// The ledger id must resolve in the hub, and both sides of the link
    /// are stamped atomically from the caller's perspective.
    pub fn link_ledger(&self, caller: &AccountId, asset_id: AssetId, ledger_id: LedgerId) -> Result<()> {
        self.policy.require(caller, Capability::LinkLedger)?;

        let ledger = self.credits.get(&ledger_id).ok_or(MarketError::InvalidTarget)?;
        {
            let mut assets = self.assets.write();
            let asset = assets.get_mut(&asset_id).ok_or(MarketError::AssetNotFound(asset_id))?;
            if let LedgerLink::Linked { .. } = asset.link {
                return Err(MarketError::AlreadyLinked(asset_id));
            }
            // The ledger side is itself one-time; a ledger serving another
            // asset is rejected here before either side is stamped. The asset
            // entry stays locked so it cannot vanish between the two writes.
            ledger.link_to_asset(asset_id)?;
            asset.link = LedgerLink::Linked { ledger_id };
        }

        info!(asset = asset_id, ledger = %ledger_id, "ledger linked");
        self.events.record(MarketEvent::LedgerLinked { asset_id, ledger_id });
        Ok(())
    }

    /// Obtain the content reference and key, paying for access if needed
    ///
    /// Free for the owner and existing readers. Otherwise requires a
    /// positive payment moved to the current owner through the linked
    /// ledger. The caller joins the reader set before the external transfer
    /// runs and is removed again if it fails.
    pub fn request_access(&self, caller: &AccountId, asset_id: AssetId, payment: Amount) -> Result<AccessBundle> {
        let (owner, link, bundle, already_authorized) = {
            let assets = self.assets.read();
            let asset = assets.get(&asset_id).ok_or(MarketError::AssetNotFound(asset_id))?;
            (
                asset.owner,
                asset.link,
                asset.bundle(),
                asset.owner == *caller || asset.authorized_readers.contains(caller),
            )
        };

        if already_authorized {
            return Ok(bundle);
        }

        let LedgerLink::Linked { ledger_id } = link else {
            return Err(MarketError::NoLedgerLinked(asset_id));
        };
        if payment == 0 {
            return Err(MarketError::PaymentRequired(asset_id));
        }
        let ledger = self.credits.get(&ledger_id).ok_or(MarketError::LedgerNotFound)?;

        // Effects before the external ledger call
        if let Some(asset) = self.assets.write().get_mut(&asset_id) {
            asset.authorized_readers.insert(*caller);
        }
        if let Err(e) = ledger.transfer(caller, &owner, payment) {
            if let Some(asset) = self.assets.write().get_mut(&asset_id) {
                asset.authorized_readers.remove(caller);
            }
            return Err(MarketError::PaymentFailed(e.to_string()));
        }

        info!(asset = asset_id, account = %caller, payment, "access granted");
        self.events.record(MarketEvent::AccessGranted {
            asset_id,
            account: *caller,
            payment,
        });
        Ok(bundle)
    }

    /// Whether an account is the owner or an authorized reader
    pub fn has_access(&self, asset_id: AssetId, account: &AccountId) -> bool {
        self.assets
            .read()
            .get(&asset_id)
            .map(|a| a.owner == *account || a.authorized_readers.contains(account))
            .unwrap_or(false)
    }

    /// Delegate transfer rights for one asset to an operator
    pub fn approve(&self, caller: &AccountId, asset_id: AssetId, operator: AccountId) -> Result<()> {
        let assets = self.assets.read();
        let asset = assets.get(&asset_id).ok_or(MarketError::AssetNotFound(asset_id))?;
        if asset.owner != *caller {
            return Err(MarketError::NotOwner(*caller, asset_id));
        }
        drop(assets);
        self.approvals.write().insert(asset_id, operator);
        Ok(())
    }

    /// Current approved operator for an asset, if any
    pub fn approved_operator(&self, asset_id: AssetId) -> Option<AccountId> {
        self.approvals.read().get(&asset_id).copied()
    }

    pub fn is_approved(&self, asset_id: AssetId, operator: &AccountId) -> bool {
        self.approved_operator(asset_id) == Some(*operator)
    }

    /// Reassign ownership
    ///
    /// Caller must be `from` or the approved operator. The new owner joins
    /// the reader set; the previous owner's read access is deliberately not
    /// revoked. The operator approval is consumed by the transfer.
    pub fn transfer(&self, caller: &AccountId, asset_id: AssetId, from: &AccountId, to: &AccountId) -> Result<()> {
        let mut assets = self.assets.write();
        let asset = assets.get_mut(&asset_id).ok_or(MarketError::AssetNotFound(asset_id))?;
        if asset.owner != *from {
            return Err(MarketError::NotOwner(*from, asset_id));
        }
        if caller != from && self.approvals.read().get(&asset_id) != Some(caller) {
            return Err(MarketError::NotAuthorized(format!(
                "account {} may not transfer asset {}",
                caller, asset_id
            )));
        }
        asset.owner = *to;
        asset.authorized_readers.insert(*to);
        drop(assets);
        self.approvals.write().remove(&asset_id);

        info!(asset = asset_id, from = %from, to = %to, "asset transferred");
        self.events.record(MarketEvent::AssetTransferred {
            asset_id,
            from: *from,
            to: *to,
        });
        Ok(())
    }

    /// Display-layer content reference gate
    ///
    /// Passes for the owner, or for any holder of at least one unit of the
    /// linked ledger's credits. Intentionally checks live balance rather
    /// than the reader set (see module docs).
    pub fn content_ref_for(&self, caller: &AccountId, asset_id: AssetId) -> Result<String> {
        let (owner, link, content_ref) = {
            let assets = self.assets.read();
            let asset = assets.get(&asset_id).ok_or(MarketError::AssetNotFound(asset_id))?;
            (asset.owner, asset.link, asset.content_ref.clone())
        };
        if owner == *caller {
            return Ok(content_ref);
        }
        if let LedgerLink::Linked { ledger_id } = link {
            if let Some(ledger) = self.credits.get(&ledger_id) {
                if ledger.balance_of(caller) >= 1 {
                    return Ok(content_ref);
                }
            }
        }
        Err(MarketError::NotAuthorized(format!(
            "account {} holds no credits for asset {}",
            caller, asset_id
        )))
    }

    /// Destroy an asset irreversibly; requires `BurnAsset`
    pub fn burn(&self, caller: &AccountId, asset_id: AssetId) -> Result<()> {
        self.policy.require(caller, Capability::BurnAsset)?;
        if self.assets.write().remove(&asset_id).is_none() {
            return Err(MarketError::AssetNotFound(asset_id));
        }
        self.approvals.write().remove(&asset_id);

        info!(asset = asset_id, "asset burned");
        self.events.record(MarketEvent::AssetBurned { asset_id });
        Ok(())
    }

    /// Point lookup
    pub fn asset(&self, asset_id: AssetId) -> Result<Asset> {
        self.assets
            .read()
            .get(&asset_id)
            .cloned()
            .ok_or(MarketError::AssetNotFound(asset_id))
    }

    pub fn owner_of(&self, asset_id: AssetId) -> Result<AccountId> {
        Ok(self.asset(asset_id)?.owner)
    }

    pub fn exists(&self, asset_id: AssetId) -> bool {
        self.assets.read().contains_key(&asset_id)
    }
}
