//! # Veridata Core
//!
//! Shared types for the Veridata verified-dataset registry:
//!
//! - `AccountId`, `Fingerprint`, `LedgerId` - 256-bit identifiers
//! - `Amount`, `AssetId` - balances and sequential asset ids
//! - `MarketError` - the single error taxonomy used across all components
//!
//! ## Identity model
//!
//! Accounts and dataset fingerprints are opaque 256-bit keys supplied by
//! callers; the registry never derives meaning from their contents. Ledger
//! ids are BLAKE3-derived from the creator and a sequence number, and double
//! as the account holding each ledger's base-currency float.

pub mod error;
pub mod types;

pub use error::{MarketError, Result};
pub use types::*;
