//! # Veridata Market
//!
//! A verified-asset registry for AI-vetted datasets. Trusted verifiers
//! record quality attestations; passing attestations gate the minting of
//! uniquely owned, transferable asset records; each asset links permanently
//! to one fungible credit ledger; and an exchange mediates sales and paid
//! access atomically.
//!
//! ## Components
//!
//! ```text
//!   verifier ──► VerificationRegistry ──passed──► AssetLedger ──link──┐
//!                 (append-only versions)          (ownership,         │
//!                                                  reader sets)       ▼
//!                                                      ▲         CreditsHub
//!                                                      │         (per-asset
//!   buyer ─────► Exchange ────payment/transfer─────────┘          ledgers)
//!                 (listings, atomic sale)
//! ```
//!
//! Every state-mutating operation runs to completion or fails atomically;
//! the only concurrency hazard is reentrancy, handled with checks-effects-
//! interactions ordering plus an explicit guard on sale-clearing paths.
//!
//! ## Authorization
//!
//! All privileged operations consult an injected [`policy::AuthorityPolicy`]
//! rather than per-component role tables. [`hub::VeridataHub::genesis`]
//! bootstraps a fully wired system.

pub mod assets;
pub mod credits;
pub mod events;
pub mod exchange;
pub mod hub;
pub mod policy;
pub mod verification;

// Re-exports
pub use assets::{AccessBundle, Asset, AssetLedger, LedgerLink, MintRequest};
pub use credits::{BaseCurrency, CreditsConfig, CreditsHub, CreditsLedger, NativeVault};
pub use events::{EventLog, MarketEvent, RecordedEvent};
pub use exchange::{Exchange, Listing};
pub use hub::{VeridataHub, VerificationOutcome};
pub use policy::{AuthorityPolicy, Capability};
pub use verification::{VerificationInput, VerificationRecord, VerificationRegistry};
