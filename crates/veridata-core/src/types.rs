//! Core type definitions for Veridata
//!
//! Identifiers are 256-bit values. Accounts and dataset fingerprints are
//! opaque keys supplied by callers; ledger ids are derived with BLAKE3.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Balance / payment amount in minimal units
pub type Amount = u128;

/// Sequential asset identifier, 1-based and never reused
pub type AssetId = u64;

/// Raw 256-bit hash value (verification hashes)
pub type Hash256 = [u8; 32];

/// Sentinel asset id meaning "no asset was minted"
pub const NO_ASSET: AssetId = 0;

/// Scaling factor for credit unit pricing: cost = amount * unit_price / UNIT_SCALE
pub const UNIT_SCALE: Amount = 1_000_000;

/// URI schemes accepted for content and report references
pub const ALLOWED_URI_SCHEMES: [&str; 2] = ["ipfs://", "https://"];

/// Check that a content/report reference is non-empty and carries an accepted scheme
pub fn valid_content_ref(uri: &str) -> bool {
    !uri.is_empty() && ALLOWED_URI_SCHEMES.iter().any(|s| uri.starts_with(s))
}

/// AccountId - Unique identifier for accounts (wallets, contracts, roles)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId {
    id: [u8; 32],
}

impl AccountId {
    pub const fn new(id: [u8; 32]) -> Self {
        Self { id }
    }

    /// Derive an account id from arbitrary seed bytes
    pub fn from_seed(seed: &[u8]) -> Self {
        Self {
            id: *blake3::hash(seed).as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.id
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.id)
    }

    pub fn is_zero(&self) -> bool {
        self.id == [0u8; 32]
    }

    /// Zero/null account (burn target, unset fields)
    pub const ZERO: Self = Self { id: [0u8; 32] };
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

/// Fingerprint - Content-derived key identifying a dataset across verification versions
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint {
    hash: [u8; 32],
}

impl Fingerprint {
    pub const fn new(hash: [u8; 32]) -> Self {
        Self { hash }
    }

    /// Compute a fingerprint from dataset content bytes
    pub fn from_content(content: &[u8]) -> Self {
        Self {
            hash: *blake3::hash(content).as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn is_zero(&self) -> bool {
        self.hash == [0u8; 32]
    }

    pub const ZERO: Self = Self { hash: [0u8; 32] };
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// LedgerId - Unique identifier for a fungible credit ledger instance
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerId {
    id: [u8; 32],
}

impl LedgerId {
    pub const fn new(id: [u8; 32]) -> Self {
        Self { id }
    }

    /// Derive a ledger id from its creator and creation sequence number
    pub fn derive(creator: &AccountId, seq: u64) -> Self {
        let mut input = creator.as_bytes().to_vec();
        input.extend_from_slice(&seq.to_le_bytes());
        Self {
            id: *blake3::hash(&input).as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.id
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// The account that holds this ledger's base-currency float
    pub fn treasury_account(&self) -> AccountId {
        AccountId::new(self.id)
    }
}

impl fmt::Debug for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}
