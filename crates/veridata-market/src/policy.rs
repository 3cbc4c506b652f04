//! # Authorization Policy
//!
//! Capability-based authorization for all privileged operations. Instead of
//! hard-coded role tables inside each component, a single `AuthorityPolicy`
//! is injected everywhere and queried with `has_capability`, so the policy
//! can be swapped or tested in isolation.
//!
//! ## Capabilities
//!
//! | Capability | Grants |
//! |------------|--------|
//! | `SubmitVerification` | writing attestations to the registry |
//! | `MintAsset` | minting assets for verified fingerprints |
//! | `LinkLedger` | attaching a credit ledger to an asset |
//! | `BurnAsset` | irreversible asset destruction |
//! | `ManageRoles` | granting and revoking capabilities |
//!
//! The genesis account holds every capability. Further grants are gated on
//! `ManageRoles` and emit change notifications into the event log.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;
use veridata_core::{AccountId, MarketError, Result};

use crate::events::{EventLog, MarketEvent};

/// Privileged actions an account can be authorized for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Write verification attestations (the verifier role)
    SubmitVerification,
    /// Mint assets for verified fingerprints (the minting authority)
    MintAsset,
    /// Link a credit ledger to an asset
    LinkLedger,
    /// Burn assets irreversibly
    BurnAsset,
    /// Grant and revoke capabilities (the admin role)
    ManageRoles,
}

impl Capability {
    /// All capabilities, used to seed the genesis account
    pub const ALL: [Capability; 5] = [
        Capability::SubmitVerification,
        Capability::MintAsset,
        Capability::LinkLedger,
        Capability::BurnAsset,
        Capability::ManageRoles,
    ];
}

/// Capability table queried by every component before a privileged mutation
pub struct AuthorityPolicy {
    grants: RwLock<HashMap<AccountId, HashSet<Capability>>>,
    events: Arc<EventLog>,
}

impl AuthorityPolicy {
    /// Create a policy whose genesis account holds every capability
    pub fn genesis(admin: AccountId, events: Arc<EventLog>) -> Self {
        let mut grants = HashMap::new();
        grants.insert(admin, Capability::ALL.into_iter().collect());
        Self {
            grants: RwLock::new(grants),
            events,
        }
    }

    /// Check whether an account holds a capability
    pub fn has_capability(&self, account: &AccountId, capability: Capability) -> bool {
        self.grants
            .read()
            .get(account)
            .map(|caps| caps.contains(&capability))
            .unwrap_or(false)
    }

    /// Require a capability, failing with `NotAuthorized` when missing
    pub fn require(&self, account: &AccountId, capability: Capability) -> Result<()> {
        if self.has_capability(account, capability) {
            Ok(())
        } else {
            Err(MarketError::NotAuthorized(format!(
                "account {} lacks {:?}",
                account, capability
            )))
        }
    }

    /// Grant a capability to an account; caller must hold `ManageRoles`
    pub fn grant(
        &self,
        caller: &AccountId,
        account: AccountId,
        capability: Capability,
    ) -> Result<()> {
        self.require(caller, Capability::ManageRoles)?;
        self.grants
            .write()
            .entry(account)
            .or_default()
            .insert(capability);
        info!(account = %account, ?capability, "capability granted");
        self.events.record(MarketEvent::CapabilityGranted {
            account,
            capability,
        });
        Ok(())
    }

    /// Revoke a capability from an account; caller must hold `ManageRoles`
    pub fn revoke(
        &self,
        caller: &AccountId,
        account: AccountId,
        capability: Capability,
    ) -> Result<()> {
        self.require(caller, Capability::ManageRoles)?;
        if let Some(caps) = self.grants.write().get_mut(&account) {
            caps.remove(&capability);
        }
        info!(account = %account, ?capability, "capability revoked");
        self.events.record(MarketEvent::CapabilityRevoked {
            account,
            capability,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AccountId, AuthorityPolicy) {
        let admin = AccountId::from_seed(b"admin");
        let events = Arc::new(EventLog::new());
        (admin, AuthorityPolicy::genesis(admin, events))
    }

    #[test]
    fn test_genesis_holds_all_capabilities() {
        let (admin, policy) = setup();
        for cap in Capability::ALL {
            assert!(policy.has_capability(&admin, cap));
        }
    }

    #[test]
    fn test_grant_and_revoke() {
        let (admin, policy) = setup();
        let verifier = AccountId::from_seed(b"verifier");

        assert!(!policy.has_capability(&verifier, Capability::SubmitVerification));
        policy
            .grant(&admin, verifier, Capability::SubmitVerification)
            .unwrap();
        assert!(policy.has_capability(&verifier, Capability::SubmitVerification));
        // Granting one capability does not leak others
        assert!(!policy.has_capability(&verifier, Capability::ManageRoles));

        policy
            .revoke(&admin, verifier, Capability::SubmitVerification)
            .unwrap();
        assert!(!policy.has_capability(&verifier, Capability::SubmitVerification));
    }

    #[test]
    fn test_grant_requires_manage_roles() {
        let (_, policy) = setup();
        let stranger = AccountId::from_seed(b"stranger");
        let target = AccountId::from_seed(b"target");

        let err = policy
            .grant(&stranger, target, Capability::MintAsset)
            .unwrap_err();
        assert!(matches!(err, MarketError::NotAuthorized(_)));
    }
}
