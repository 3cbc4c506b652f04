//! Error types for Veridata registry operations

use crate::types::{AccountId, Amount, AssetId, Fingerprint};
use thiserror::Error;

/// Result type alias for Veridata operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Errors that can occur across the registry, ledgers, and exchange
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    // === Authorization ===
    /// Caller lacks the capability or ownership required for the action
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Caller is not the current owner of the asset
    #[error("account {0} is not the owner of asset {1}")]
    NotOwner(AccountId, AssetId),

    // === Validation ===
    /// Malformed or out-of-range argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Lookup target does not resolve to a registered ledger
    #[error("ledger reference does not resolve to a registered ledger")]
    InvalidTarget,

    // === Lookups ===
    /// No verification record stored for the fingerprint/version
    #[error("verification record not found: {fingerprint} v{version}")]
    RecordNotFound {
        fingerprint: Fingerprint,
        version: u32,
    },

    /// Asset does not exist (never minted or burned)
    #[error("asset not found: {0}")]
    AssetNotFound(AssetId),

    /// Ledger instance not found
    #[error("ledger not found")]
    LedgerNotFound,

    // === One-time transitions ===
    /// Asset already has a linked ledger; the link is permanent
    #[error("asset {0} already has a linked ledger")]
    AlreadyLinked(AssetId),

    /// Asset already has an active listing
    #[error("asset {0} is already listed")]
    AlreadyListed(AssetId),

    // === Ledger constraints ===
    /// Debit would overdraw the account
    #[error("insufficient balance: account {account} has {available}, needs {required}")]
    InsufficientBalance {
        account: AccountId,
        available: Amount,
        required: Amount,
    },

    /// Delegated transfer exceeds the remaining allowance
    #[error("insufficient allowance: spender {spender} has {available}, needs {required}")]
    InsufficientAllowance {
        spender: AccountId,
        available: Amount,
        required: Amount,
    },

    /// Base-currency value sent does not cover the purchase cost
    #[error("insufficient payment: sent {sent}, cost {cost}")]
    InsufficientPayment { sent: Amount, cost: Amount },

    /// Mint would push total supply past the configured maximum
    #[error("max supply exceeded: minted {minted} + {requested} > {max}")]
    MaxSupplyExceeded {
        minted: Amount,
        requested: Amount,
        max: Amount,
    },

    // === Access / exchange preconditions ===
    /// Asset has no linked ledger yet, so no payment path exists
    #[error("asset {0} has no linked ledger")]
    NoLedgerLinked(AssetId),

    /// Access requires a positive payment from a non-authorized caller
    #[error("payment required for access to asset {0}")]
    PaymentRequired(AssetId),

    /// Asset has no active listing
    #[error("asset {0} is not for sale")]
    NotForSale(AssetId),

    /// Exchange has not been approved to move the asset
    #[error("exchange not approved to transfer asset {0}")]
    NotApproved(AssetId),

    /// Asset is linked to a different ledger than this one
    #[error("asset {0} is not linked to this ledger")]
    NotLinked(AssetId),

    // === Downstream call failures ===
    /// Ownership transfer did not succeed
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// Payment leg of an operation did not succeed
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// Refund of excess base currency did not succeed
    #[error("refund of excess payment failed")]
    RefundFailed,

    // === Reentrancy ===
    /// Mutating operation re-entered while already in progress
    #[error("reentrant call rejected")]
    ReentrantCall,
}

impl MarketError {
    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::NotAuthorized(_) | Self::NotOwner(_, _) => 2001,
            Self::InvalidInput(_) | Self::InvalidTarget => 2002,
            Self::RecordNotFound { .. } | Self::AssetNotFound(_) | Self::LedgerNotFound => 2003,
            Self::AlreadyLinked(_) | Self::AlreadyListed(_) => 2004,
            Self::InsufficientBalance { .. }
            | Self::InsufficientAllowance { .. }
            | Self::InsufficientPayment { .. }
            | Self::MaxSupplyExceeded { .. } => 2005,
            Self::NoLedgerLinked(_) | Self::PaymentRequired(_) => 2006,
            Self::NotForSale(_) | Self::NotApproved(_) | Self::NotLinked(_) => 2007,
            Self::TransferFailed(_) | Self::PaymentFailed(_) | Self::RefundFailed => 2008,
            Self::ReentrantCall => 2009,
        }
    }

    /// Check if the caller can recover by changing inputs and retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. }
                | Self::InsufficientAllowance { .. }
                | Self::InsufficientPayment { .. }
                | Self::PaymentFailed(_)
                | Self::PaymentRequired(_)
                | Self::ReentrantCall
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MarketError::NotAuthorized("mint".into());
        assert_eq!(err.code(), 2001);

        let err = MarketError::AlreadyLinked(7);
        assert_eq!(err.code(), 2004);

        let err = MarketError::RefundFailed;
        assert_eq!(err.code(), 2008);
    }

    #[test]
    fn test_error_display() {
        let err = MarketError::InsufficientPayment { sent: 10, cost: 25 };
        let msg = format!("{}", err);
        assert!(msg.contains("sent 10"));
        assert!(msg.contains("cost 25"));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(MarketError::PaymentRequired(1).is_recoverable());
        assert!(MarketError::InsufficientAllowance {
            spender: AccountId::ZERO,
            available: 0,
            required: 10,
        }
        .is_recoverable());
        assert!(!MarketError::AlreadyLinked(1).is_recoverable());
        assert!(!MarketError::NotAuthorized("burn".into()).is_recoverable());
    }
}
