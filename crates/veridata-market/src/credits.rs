//! # Access Credits
//!
//! Fungible payment/access token ledgers. Each `CreditsLedger` instance is
//! created through the `CreditsHub`, prices its units against the base
//! currency, and is permanently linked to at most one asset. Balances pay
//! for asset purchases on the exchange and for read access to content.
//!
//! ## Purchase flow
//!
//! ```text
//! purchase(amount, sent) ──► cost = amount * unit_price / UNIT_SCALE
//!        │ checks: supply cap, sent >= cost
//!        ▼
//!   withdraw `sent` from buyer ──► mint `amount` credits ──► refund excess
//!                                        │ refund fails: unwind everything
//! ```
//!
//! The base-currency channel is behind the `BaseCurrency` trait so tests can
//! inject refund failures; the whole purchase unwinds rather than silently
//! keeping the excess.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};
use veridata_core::{
    AccountId, Amount, AssetId, LedgerId, MarketError, Result, UNIT_SCALE,
};

use crate::assets::{AccessBundle, AssetLedger};
use crate::events::{EventLog, MarketEvent};

/// Base-currency payment channel
///
/// The chain-native unit purchases are paid in. Implementations must make
/// `withdraw` fail rather than overdraw.
pub trait BaseCurrency: Send + Sync {
    fn balance_of(&self, account: &AccountId) -> Amount;
    /// Credit an account; may fail when the receiving side rejects value
    fn deposit(&self, account: &AccountId, amount: Amount) -> Result<()>;
    /// Debit an account; fails with `InsufficientBalance` on overdraw
    fn withdraw(&self, account: &AccountId, amount: Amount) -> Result<()>;
}

/// In-memory base-currency vault
pub struct NativeVault {
    balances: RwLock<HashMap<AccountId, Amount>>,
}

impl NativeVault {
    pub fn new() -> Self {
        Self {
            balances: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for NativeVault {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseCurrency for NativeVault {
    fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.read().get(account).copied().unwrap_or(0)
    }

    fn deposit(&self, account: &AccountId, amount: Amount) -> Result<()> {
        *self.balances.write().entry(*account).or_insert(0) += amount;
        Ok(())
    }

    fn withdraw(&self, account: &AccountId, amount: Amount) -> Result<()> {
        let mut balances = self.balances.write();
        let balance = balances.entry(*account).or_insert(0);
        if *balance < amount {
            return Err(MarketError::InsufficientBalance {
                account: *account,
                available: *balance,
                required: amount,
            });
        }
        *balance -= amount;
        Ok(())
    }
}

/// Pricing and supply parameters for a new ledger
#[derive(Clone, Copy, Debug)]
pub struct CreditsConfig {
    /// Base-currency cost per UNIT_SCALE credits
    pub unit_price: Amount,
    pub max_supply: Amount,
}

struct CreditsState {
    balances: HashMap<AccountId, Amount>,
    allowances: HashMap<(AccountId, AccountId), Amount>,
    total_minted: Amount,
    unit_price: Amount,
    max_supply: Amount,
    /// One-time back-reference to the asset this ledger prices
    linked_asset: Option<AssetId>,
    /// Base currency collected from purchases, available to `withdraw`
    float: Amount,
}

/// One fungible credit ledger instance
pub struct CreditsLedger {
    id: LedgerId,
    /// Ledger administrator (creator); gates price/supply/withdraw
    owner: AccountId,
    base: Arc<dyn BaseCurrency>,
    state: RwLock<CreditsState>,
    events: Arc<EventLog>,
}

impl CreditsLedger {
    fn new(
        id: LedgerId,
        owner: AccountId,
        config: CreditsConfig,
        base: Arc<dyn BaseCurrency>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            id,
            owner,
            base,
            state: RwLock::new(CreditsState {
                balances: HashMap::new(),
                allowances: HashMap::new(),
                total_minted: 0,
                unit_price: config.unit_price,
                max_supply: config.max_supply,
                linked_asset: None,
                float: 0,
            }),
            events,
        }
    }

    pub fn id(&self) -> LedgerId {
        self.id
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.state.read().balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.state
            .read()
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_minted(&self) -> Amount {
        self.state.read().total_minted
    }

    pub fn unit_price(&self) -> Amount {
        self.state.read().unit_price
    }

    pub fn linked_asset(&self) -> Option<AssetId> {
        self.state.read().linked_asset
    }

    /// Mint credits against base-currency value
    ///
    /// `sent` is the value attached to the call; the excess over cost is
    /// refunded synchronously. A failed refund unwinds the whole purchase.
    /// Returns the cost actually charged.
    pub fn purchase(&self, caller: &AccountId, amount: Amount, sent: Amount) -> Result<Amount> {
        if amount == 0 {
            return Err(MarketError::InvalidInput("purchase amount is zero".into()));
        }

        let cost = {
            let state = self.state.read();
            // Overflow of the running total counts as exceeding the cap
            match state.total_minted.checked_add(amount) {
                Some(total) if total <= state.max_supply => {}
                _ => {
                    return Err(MarketError::MaxSupplyExceeded {
                        minted: state.total_minted,
                        requested: amount,
                        max: state.max_supply,
                    });
                }
            }
            amount
                .checked_mul(state.unit_price)
                .map(|c| c / UNIT_SCALE)
                .ok_or_else(|| MarketError::InvalidInput("purchase cost overflows".into()))?
        };
        if sent < cost {
            return Err(MarketError::InsufficientPayment { sent, cost });
        }

        // Take the attached value, then mutate local state, then refund.
        self.base.withdraw(caller, sent)?;
        {
            let mut state = self.state.write();
            *state.balances.entry(*caller).or_insert(0) += amount;
            state.total_minted += amount;
            state.float += cost;
        }

        let refund = sent - cost;
        if refund > 0 {
            if self.base.deposit(caller, refund).is_err() {
                // Unwind: burn the minted credits and return the full payment
                {
                    let mut state = self.state.write();
                    if let Some(balance) = state.balances.get_mut(caller) {
                        *balance -= amount;
                    }
                    state.total_minted -= amount;
                    state.float -= cost;
                }
                if self.base.deposit(caller, sent).is_err() {
                    warn!(ledger = %self.id, account = %caller, "purchase unwind could not return payment");
                }
                return Err(MarketError::RefundFailed);
            }
        }

        info!(ledger = %self.id, account = %caller, amount, cost, "credits purchased");
        self.events.record(MarketEvent::CreditsPurchased {
            ledger_id: self.id,
            account: *caller,
            amount,
            cost,
            refunded: refund,
        });
        Ok(cost)
    }

    /// Move credits from the caller to another account
    pub fn transfer(&self, caller: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.transfer_internal(caller, to, amount)?;
        self.events.record(MarketEvent::CreditsTransferred {
            ledger_id: self.id,
            from: *caller,
            to: *to,
            amount,
        });
        Ok(())
    }

    /// Authorize a spender to move up to `amount` of the caller's credits
    pub fn approve(&self, caller: &AccountId, spender: &AccountId, amount: Amount) {
        self.state
            .write()
            .allowances
            .insert((*caller, *spender), amount);
    }

    /// Delegated transfer; consumes allowance, not just checks it
    pub fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        {
            let mut state = self.state.write();
            let allowance = state.allowances.get(&(*from, *spender)).copied().unwrap_or(0);
            if allowance < amount {
                return Err(MarketError::InsufficientAllowance {
                    spender: *spender,
                    available: allowance,
                    required: amount,
                });
            }
            state.allowances.insert((*from, *spender), allowance - amount);
        }
        if let Err(e) = self.transfer_internal(from, to, amount) {
            // Restore the allowance consumed above
            let mut state = self.state.write();
            *state.allowances.entry((*from, *spender)).or_insert(0) += amount;
            return Err(e);
        }
        self.events.record(MarketEvent::CreditsTransferred {
            ledger_id: self.id,
            from: *from,
            to: *to,
            amount,
        });
        Ok(())
    }

    /// Pay `amount` credits to the asset's current owner for read access
    ///
    /// Convenience path over `AssetLedger::request_access`; fails with
    /// `NotLinked` when the asset's linked ledger is not this instance.
    pub fn redeem_for_access(
        &self,
        caller: &AccountId,
        amount: Amount,
        asset_id: AssetId,
        assets: &AssetLedger,
    ) -> Result<AccessBundle> {
        if self.state.read().linked_asset != Some(asset_id) {
            return Err(MarketError::NotLinked(asset_id));
        }
        assets.request_access(caller, asset_id, amount)
    }

    /// Update the unit price; ledger owner only
    pub fn set_price(&self, caller: &AccountId, unit_price: Amount) -> Result<()> {
        self.require_owner(caller)?;
        self.state.write().unit_price = unit_price;
        self.events.record(MarketEvent::UnitPriceSet {
            ledger_id: self.id,
            unit_price,
        });
        Ok(())
    }

    /// Update the supply cap; cannot go below what is already minted
    pub fn set_max_supply(&self, caller: &AccountId, max_supply: Amount) -> Result<()> {
        self.require_owner(caller)?;
        let mut state = self.state.write();
        if max_supply < state.total_minted {
            return Err(MarketError::InvalidInput(format!(
                "max supply {} below minted supply {}",
                max_supply, state.total_minted
            )));
        }
        state.max_supply = max_supply;
        drop(state);
        self.events.record(MarketEvent::MaxSupplySet {
            ledger_id: self.id,
            max_supply,
        });
        Ok(())
    }

    /// Withdraw collected base currency; ledger owner only
    pub fn withdraw(&self, caller: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.require_owner(caller)?;
        {
            let mut state = self.state.write();
            if state.float < amount {
                return Err(MarketError::InsufficientBalance {
                    account: self.id.treasury_account(),
                    available: state.float,
                    required: amount,
                });
            }
            state.float -= amount;
        }
        if let Err(e) = self.base.deposit(to, amount) {
            self.state.write().float += amount;
            return Err(MarketError::TransferFailed(e.to_string()));
        }
        self.events.record(MarketEvent::TreasuryWithdrawn {
            ledger_id: self.id,
            to: *to,
            amount,
        });
        Ok(())
    }

    /// Return allowance consumed by a delegated transfer that was unwound
    pub(crate) fn restore_allowance(&self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        let mut state = self.state.write();
        let entry = state.allowances.entry((*owner, *spender)).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Record the one-time asset back-reference; called by the asset ledger
    pub(crate) fn link_to_asset(&self, asset_id: AssetId) -> Result<()> {
        let mut state = self.state.write();
        if let Some(existing) = state.linked_asset {
            return Err(MarketError::AlreadyLinked(existing));
        }
        state.linked_asset = Some(asset_id);
        Ok(())
    }

    fn require_owner(&self, caller: &AccountId) -> Result<()> {
        if *caller == self.owner {
            Ok(())
        } else {
            Err(MarketError::NotAuthorized(format!(
                "account {} is not the ledger owner",
                caller
            )))
        }
    }

    fn transfer_internal(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        let mut state = self.state.write();
        let from_balance = state.balances.get(from).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(MarketError::InsufficientBalance {
                account: *from,
                available: from_balance,
                required: amount,
            });
        }
        state.balances.insert(*from, from_balance - amount);
        *state.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }
}

/// Registry of all credit ledger instances
///
/// `link_ledger` resolves references through the hub; an id that does not
/// resolve here is an `InvalidTarget`.
pub struct CreditsHub {
    base: Arc<dyn BaseCurrency>,
    events: Arc<EventLog>,
    ledgers: RwLock<HashMap<LedgerId, Arc<CreditsLedger>>>,
    next_seq: AtomicU64,
}

impl CreditsHub {
    pub fn new(base: Arc<dyn BaseCurrency>, events: Arc<EventLog>) -> Self {
        Self {
            base,
            events,
            ledgers: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Create a new ledger instance owned by `creator`
    pub fn create_ledger(&self, creator: &AccountId, config: CreditsConfig) -> Result<LedgerId> {
        if config.max_supply == 0 {
            return Err(MarketError::InvalidInput("max supply is zero".into()));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let id = LedgerId::derive(creator, seq);
        let ledger = Arc::new(CreditsLedger::new(
            id,
            *creator,
            config,
            self.base.clone(),
            self.events.clone(),
        ));
        self.ledgers.write().insert(id, ledger);
        info!(ledger = %id, owner = %creator, "credit ledger created");
        Ok(id)
    }

    pub fn get(&self, id: &LedgerId) -> Option<Arc<CreditsLedger>> {
        self.ledgers.read().get(id).cloned()
    }

    pub fn contains(&self, id: &LedgerId) -> bool {
        self.ledgers.read().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Base currency that fails the next deposit to a chosen account once
    struct FlakyVault {
        inner: NativeVault,
        fail_next_deposit: RwLock<Option<AccountId>>,
    }

    impl FlakyVault {
        fn new() -> Self {
            Self {
                inner: NativeVault::new(),
                fail_next_deposit: RwLock::new(None),
            }
        }

        fn fail_next_deposit_to(&self, account: AccountId) {
            *self.fail_next_deposit.write() = Some(account);
        }
    }

    impl BaseCurrency for FlakyVault {
        fn balance_of(&self, account: &AccountId) -> Amount {
            self.inner.balance_of(account)
        }

        fn deposit(&self, account: &AccountId, amount: Amount) -> Result<()> {
            let mut fail = self.fail_next_deposit.write();
            if *fail == Some(*account) {
                *fail = None;
                return Err(MarketError::TransferFailed("deposit rejected".into()));
            }
            self.inner.deposit(account, amount)
        }

        fn withdraw(&self, account: &AccountId, amount: Amount) -> Result<()> {
            self.inner.withdraw(account, amount)
        }
    }

    fn setup() -> (Arc<NativeVault>, CreditsHub, AccountId) {
        let vault = Arc::new(NativeVault::new());
        let events = Arc::new(EventLog::new());
        let hub = CreditsHub::new(vault.clone(), events);
        let owner = AccountId::from_seed(b"ledger-owner");
        (vault, hub, owner)
    }

    fn config() -> CreditsConfig {
        CreditsConfig {
            unit_price: UNIT_SCALE, // 1 base unit per credit
            max_supply: 1_000,
        }
    }

    #[test]
    fn test_purchase_exact_payment() {
        let (vault, hub, owner) = setup();
        let buyer = AccountId::from_seed(b"buyer");
        vault.deposit(&buyer, 500).unwrap();

        let id = hub.create_ledger(&owner, config()).unwrap();
        let ledger = hub.get(&id).unwrap();

        let cost = ledger.purchase(&buyer, 200, 200).unwrap();
        assert_eq!(cost, 200);
        assert_eq!(ledger.balance_of(&buyer), 200);
        assert_eq!(ledger.total_minted(), 200);
        assert_eq!(vault.balance_of(&buyer), 300);
    }

    #[test]
    fn test_purchase_overpayment_refunds_exactly() {
        let (vault, hub, owner) = setup();
        let buyer = AccountId::from_seed(b"buyer");
        vault.deposit(&buyer, 500).unwrap();

        let id = hub.create_ledger(&owner, config()).unwrap();
        let ledger = hub.get(&id).unwrap();

        ledger.purchase(&buyer, 100, 175).unwrap();
        // Net base-currency loss is exactly the cost
        assert_eq!(vault.balance_of(&buyer), 400);
        assert_eq!(ledger.balance_of(&buyer), 100);
    }

    #[test]
    fn test_purchase_insufficient_payment() {
        let (vault, hub, owner) = setup();
        let buyer = AccountId::from_seed(b"buyer");
        vault.deposit(&buyer, 500).unwrap();

        let id = hub.create_ledger(&owner, config()).unwrap();
        let ledger = hub.get(&id).unwrap();

        let err = ledger.purchase(&buyer, 100, 50).unwrap_err();
        assert_eq!(err, MarketError::InsufficientPayment { sent: 50, cost: 100 });
        assert_eq!(ledger.balance_of(&buyer), 0);
        assert_eq!(vault.balance_of(&buyer), 500);
    }

    #[test]
    fn test_purchase_respects_max_supply() {
        let (vault, hub, owner) = setup();
        let buyer = AccountId::from_seed(b"buyer");
        vault.deposit(&buyer, 10_000).unwrap();

        let id = hub.create_ledger(&owner, config()).unwrap();
        let ledger = hub.get(&id).unwrap();

        ledger.purchase(&buyer, 900, 900).unwrap();
        let err = ledger.purchase(&buyer, 200, 200).unwrap_err();
        assert!(matches!(err, MarketError::MaxSupplyExceeded { .. }));
        assert_eq!(ledger.total_minted(), 900);
    }

    #[test]
    fn test_purchase_amount_near_max_rejected_without_overflow() {
        let (vault, hub, owner) = setup();
        let buyer = AccountId::from_seed(b"buyer");
        vault.deposit(&buyer, 500).unwrap();

        let id = hub.create_ledger(&owner, config()).unwrap();
        let ledger = hub.get(&id).unwrap();
        ledger.purchase(&buyer, 100, 100).unwrap();

        // An amount that would wrap the running total must hit the supply
        // cap, not bypass it
        let err = ledger.purchase(&buyer, Amount::MAX - 50, 0).unwrap_err();
        assert!(matches!(err, MarketError::MaxSupplyExceeded { .. }));
        assert_eq!(ledger.total_minted(), 100);
        assert_eq!(ledger.balance_of(&buyer), 100);
        assert_eq!(vault.balance_of(&buyer), 400);
    }

    #[test]
    fn test_refund_failure_unwinds_purchase() {
        let vault = Arc::new(FlakyVault::new());
        let events = Arc::new(EventLog::new());
        let hub = CreditsHub::new(vault.clone(), events);
        let owner = AccountId::from_seed(b"ledger-owner");
        let buyer = AccountId::from_seed(b"buyer");
        vault.inner.deposit(&buyer, 500).unwrap();

        let id = hub.create_ledger(&owner, config()).unwrap();
        let ledger = hub.get(&id).unwrap();

        vault.fail_next_deposit_to(buyer);
        let err = ledger.purchase(&buyer, 100, 150).unwrap_err();
        assert_eq!(err, MarketError::RefundFailed);
        // Nothing minted, full payment returned by the unwind
        assert_eq!(ledger.balance_of(&buyer), 0);
        assert_eq!(ledger.total_minted(), 0);
        assert_eq!(vault.balance_of(&buyer), 500);
    }

    #[test]
    fn test_transfer_and_allowances() {
        let (vault, hub, owner) = setup();
        let alice = AccountId::from_seed(b"alice");
        let bob = AccountId::from_seed(b"bob");
        let spender = AccountId::from_seed(b"spender");
        vault.deposit(&alice, 1_000).unwrap();

        let id = hub.create_ledger(&owner, config()).unwrap();
        let ledger = hub.get(&id).unwrap();
        ledger.purchase(&alice, 500, 500).unwrap();

        ledger.transfer(&alice, &bob, 100).unwrap();
        assert_eq!(ledger.balance_of(&bob), 100);

        let err = ledger.transfer(&bob, &alice, 200).unwrap_err();
        assert!(matches!(err, MarketError::InsufficientBalance { .. }));

        // Allowance is consumed, not just checked
        ledger.approve(&alice, &spender, 150);
        ledger.transfer_from(&spender, &alice, &bob, 120).unwrap();
        assert_eq!(ledger.allowance(&alice, &spender), 30);
        let err = ledger.transfer_from(&spender, &alice, &bob, 100).unwrap_err();
        assert!(matches!(err, MarketError::InsufficientAllowance { .. }));
    }

    #[test]
    fn test_admin_operations_owner_gated() {
        let (vault, hub, owner) = setup();
        let stranger = AccountId::from_seed(b"stranger");
        let buyer = AccountId::from_seed(b"buyer");
        vault.deposit(&buyer, 1_000).unwrap();

        let id = hub.create_ledger(&owner, config()).unwrap();
        let ledger = hub.get(&id).unwrap();
        ledger.purchase(&buyer, 300, 300).unwrap();

        assert!(ledger.set_price(&stranger, 5).is_err());
        ledger.set_price(&owner, 2 * UNIT_SCALE).unwrap();
        assert_eq!(ledger.unit_price(), 2 * UNIT_SCALE);

        // Supply floor is what is already minted
        assert!(ledger.set_max_supply(&owner, 100).is_err());
        ledger.set_max_supply(&owner, 400).unwrap();

        // Collected float is withdrawable by the owner only
        assert!(ledger.withdraw(&stranger, &stranger, 1).is_err());
        ledger.withdraw(&owner, &owner, 300).unwrap();
        assert_eq!(vault.balance_of(&owner), 300);
        assert!(ledger.withdraw(&owner, &owner, 1).is_err());
    }

    #[test]
    fn test_link_to_asset_is_one_time() {
        let (_, hub, owner) = setup();
        let id = hub.create_ledger(&owner, config()).unwrap();
        let ledger = hub.get(&id).unwrap();

        ledger.link_to_asset(4).unwrap();
        assert_eq!(ledger.linked_asset(), Some(4));
        assert_eq!(ledger.link_to_asset(9), Err(MarketError::AlreadyLinked(4)));
        assert_eq!(ledger.linked_asset(), Some(4));
    }
}
