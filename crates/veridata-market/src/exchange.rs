//! # Exchange
//!
//! Listing and atomic sale of assets, priced in each asset's linked credit
//! ledger. Sales follow checks-effects-interactions: the listing is
//! deactivated and bookkeeping recorded before the payment and ownership
//! calls run, and a per-exchange reentrancy guard rejects re-entered
//! clearing operations outright.
//!
//! ## Sale flow
//!
//! ```text
//! buy(asset) ── guard Idle→InProgress
//!     │ checks: active listing, linked ledger
//!     │ effects: listing.active = false
//!     │ interactions: pay seller ── fail ──► restore listing, PaymentFailed
//!     │               transfer asset ── fail ──► undo payment, restore listing
//!     └─► fetch access bundle (content-ref-only fallback) ── guard → Idle
//! ```
//!
//! A payment failure leaves the listing in storage exactly as if `buy` was
//! never called.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};
use veridata_core::{AccountId, Amount, AssetId, MarketError, Result};

use crate::assets::{AccessBundle, AssetLedger, LedgerLink};
use crate::credits::CreditsHub;
use crate::events::{EventLog, MarketEvent};

/// An active or historical sale offer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub asset_id: AssetId,
    pub seller: AccountId,
    /// Price in the asset's linked ledger units
    pub price: Amount,
    pub active: bool,
}

/// Reentrancy guard: Idle → InProgress → Idle, entry rejected when busy
struct OpGuard {
    busy: AtomicBool,
}

impl OpGuard {
    fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    fn enter(&self) -> Result<OpToken<'_>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(MarketError::ReentrantCall);
        }
        Ok(OpToken { guard: self })
    }
}

/// RAII token returning the guard to Idle on drop
struct OpToken<'a> {
    guard: &'a OpGuard,
}

impl Drop for OpToken<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

/// Atomic sale and payment-for-access mediator
pub struct Exchange {
    /// Account identity the exchange acts under when moving assets and
    /// spending buyer allowances
    identity: AccountId,
    assets: Arc<AssetLedger>,
    credits: Arc<CreditsHub>,
    events: Arc<EventLog>,
    listings: RwLock<HashMap<AssetId, Listing>>,
    guard: OpGuard,
}

impl Exchange {
    pub fn new(
        identity: AccountId,
        assets: Arc<AssetLedger>,
        credits: Arc<CreditsHub>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            identity,
            assets,
            credits,
            events,
            listings: RwLock::new(HashMap::new()),
            guard: OpGuard::new(),
        }
    }

    pub fn identity(&self) -> AccountId {
        self.identity
    }

    /// Offer an asset for sale
    ///
    /// Caller must own the asset, a ledger must be linked, and the exchange
    /// must already hold transfer approval. One active listing per asset.
    pub fn list(&self, caller: &AccountId, asset_id: AssetId, price: Amount) -> Result<()> {
        if price == 0 {
            return Err(MarketError::InvalidInput("listing price is zero".into()));
        }
        let asset = self.assets.asset(asset_id)?;
        if asset.owner != *caller {
            return Err(MarketError::NotOwner(*caller, asset_id));
        }
        let LedgerLink::Linked { .. } = asset.link else {
            return Err(MarketError::NoLedgerLinked(asset_id));
        };
        if asset.content_ref.is_empty() {
            return Err(MarketError::InvalidInput("asset has no content reference".into()));
        }
        if !self.assets.is_approved(asset_id, &self.identity) {
            return Err(MarketError::NotApproved(asset_id));
        }

        let mut listings = self.listings.write();
        if listings.get(&asset_id).map(|l| l.active).unwrap_or(false) {
            return Err(MarketError::AlreadyListed(asset_id));
        }
        listings.insert(
            asset_id,
            Listing {
                asset_id,
                seller: *caller,
                price,
                active: true,
            },
        );
        drop(listings);

        info!(asset = asset_id, seller = %caller, price, "asset listed");
        self.events.record(MarketEvent::AssetListed {
            asset_id,
            seller: *caller,
            price,
        });
        Ok(())
    }

    /// Purchase a listed asset
    ///
    /// Pays the seller from the buyer's allowance to the exchange on the
    /// linked ledger, then transfers ownership. Any failure before the
    /// ownership transfer commits restores the listing untouched.
    pub fn buy(&self, buyer: &AccountId, asset_id: AssetId) -> Result<AccessBundle> {
        let _token = self.guard.enter()?;

        let (seller, price) = {
            let listings = self.listings.read();
            match listings.get(&asset_id) {
                Some(listing) if listing.active => (listing.seller, listing.price),
                _ => return Err(MarketError::NotForSale(asset_id)),
            }
        };
        let asset = self.assets.asset(asset_id)?;
        let LedgerLink::Linked { ledger_id } = asset.link else {
            return Err(MarketError::NoLedgerLinked(asset_id));
        };
        let ledger = self.credits.get(&ledger_id).ok_or(MarketError::LedgerNotFound)?;

        // Effects: clear the listing before any external call
        self.set_listing_active(asset_id, false);

        // Interaction 1: payment, buyer → seller through the buyer's allowance
        if let Err(e) = ledger.transfer_from(&self.identity, buyer, &seller, price) {
            self.set_listing_active(asset_id, true);
            return Err(MarketError::PaymentFailed(e.to_string()));
        }

        // Interaction 2: ownership transfer under the seller's approval
        if let Err(e) = self.assets.transfer(&self.identity, asset_id, &seller, buyer) {
            self.set_listing_active(asset_id, true);
            // Undo the payment, including the allowance the payment leg consumed
            if ledger.transfer(&seller, buyer, price).is_err() {
                warn!(asset = asset_id, "sale unwind could not return payment");
                return Err(MarketError::TransferFailed(format!(
                    "{}; refund of {} credits to the buyer also failed",
                    e, price
                )));
            }
            ledger.restore_allowance(buyer, &self.identity, price);
            return Err(MarketError::TransferFailed(e.to_string()));
        }

        info!(asset = asset_id, seller = %seller, buyer = %buyer, price, "asset sold");
        self.events.record(MarketEvent::AssetSold {
            asset_id,
            seller,
            buyer: *buyer,
            price,
        });

        // Buyer is owner now; fetch the bundle, falling back to the bare
        // content reference rather than failing a completed sale.
        match self.assets.request_access(buyer, asset_id, 0) {
            Ok(bundle) => Ok(bundle),
            Err(e) => {
                warn!(asset = asset_id, error = %e, "access fetch after sale failed");
                Ok(AccessBundle {
                    content_ref: asset.content_ref,
                    decryption_key: None,
                })
            }
        }
    }

    /// Change the price of an active listing; seller only
    pub fn update_price(&self, caller: &AccountId, asset_id: AssetId, price: Amount) -> Result<()> {
        if price == 0 {
            return Err(MarketError::InvalidInput("listing price is zero".into()));
        }
        let mut listings = self.listings.write();
        let listing = match listings.get_mut(&asset_id) {
            Some(l) if l.active => l,
            _ => return Err(MarketError::NotForSale(asset_id)),
        };
        if listing.seller != *caller {
            return Err(MarketError::NotOwner(*caller, asset_id));
        }
        listing.price = price;
        drop(listings);
        self.events.record(MarketEvent::ListingPriceUpdated { asset_id, price });
        Ok(())
    }

    /// Withdraw an active listing; seller only
    pub fn cancel(&self, caller: &AccountId, asset_id: AssetId) -> Result<()> {
        let _token = self.guard.enter()?;
        {
            let mut listings = self.listings.write();
            let listing = match listings.get_mut(&asset_id) {
                Some(l) if l.active => l,
                _ => return Err(MarketError::NotForSale(asset_id)),
            };
            if listing.seller != *caller {
                return Err(MarketError::NotOwner(*caller, asset_id));
            }
            listing.active = false;
        }
        info!(asset = asset_id, "listing cancelled");
        self.events.record(MarketEvent::ListingCancelled { asset_id });
        Ok(())
    }

    pub fn get_listing(&self, asset_id: AssetId) -> Option<Listing> {
        self.listings.read().get(&asset_id).cloned()
    }

    /// Whether the exchange currently holds transfer approval for an asset
    pub fn check_approval(&self, asset_id: AssetId) -> bool {
        self.assets.is_approved(asset_id, &self.identity)
    }

    fn set_listing_active(&self, asset_id: AssetId, active: bool) {
        if let Some(listing) = self.listings.write().get_mut(&asset_id) {
            listing.active = active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credits::{BaseCurrency, CreditsConfig, CreditsLedger, NativeVault};
    use crate::policy::AuthorityPolicy;
    use crate::verification::tests::sample_input;
    use crate::verification::VerificationRegistry;
    use veridata_core::{Fingerprint, UNIT_SCALE};

    struct Fixture {
        seller: AccountId,
        buyer: AccountId,
        vault: Arc<NativeVault>,
        assets: Arc<AssetLedger>,
        exchange: Exchange,
        asset_id: AssetId,
        ledger: Arc<CreditsLedger>,
    }

    /// Mint a linked asset to `seller` and fund `buyer` with 500 credits
    fn setup() -> Fixture {
        let admin = AccountId::from_seed(b"admin");
        let seller = AccountId::from_seed(b"seller");
        let buyer = AccountId::from_seed(b"buyer");
        let events = Arc::new(EventLog::new());
        let policy = Arc::new(AuthorityPolicy::genesis(admin, events.clone()));
        let vault = Arc::new(NativeVault::new());
        let registry = Arc::new(VerificationRegistry::new(policy.clone()));
        let credits = Arc::new(CreditsHub::new(vault.clone(), events.clone()));
        let assets = Arc::new(AssetLedger::new(
            policy,
            registry.clone(),
            credits.clone(),
            events.clone(),
        ));
        let exchange = Exchange::new(
            AccountId::from_seed(b"exchange"),
            assets.clone(),
            credits.clone(),
            events,
        );

        let fp = Fingerprint::from_content(b"ds1");
        registry.submit(&admin, &sample_input(fp, true)).unwrap();
        let asset_id = assets
            .mint(
                &admin,
                crate::assets::MintRequest {
                    content_ref: "ipfs://QmContent".into(),
                    fingerprint: fp,
                    is_private: true,
                    decryption_key: Some("secret-key".into()),
                    recipient: seller,
                },
            )
            .unwrap();
        let ledger_id = credits
            .create_ledger(
                &admin,
                CreditsConfig {
                    unit_price: UNIT_SCALE,
                    max_supply: 100_000,
                },
            )
            .unwrap();
        assets.link_ledger(&admin, asset_id, ledger_id).unwrap();

        let ledger = credits.get(&ledger_id).unwrap();
        vault.deposit(&buyer, 500).unwrap();
        ledger.purchase(&buyer, 500, 500).unwrap();

        Fixture {
            seller,
            buyer,
            vault,
            assets,
            exchange,
            asset_id,
            ledger,
        }
    }

    fn approve_and_list(fx: &Fixture, price: Amount) {
        fx.assets
            .approve(&fx.seller, fx.asset_id, fx.exchange.identity())
            .unwrap();
        fx.exchange.list(&fx.seller, fx.asset_id, price).unwrap();
    }

    #[test]
    fn test_list_preconditions() {
        let fx = setup();

        // Not approved yet
        assert_eq!(
            fx.exchange.list(&fx.seller, fx.asset_id, 100),
            Err(MarketError::NotApproved(fx.asset_id))
        );
        assert!(!fx.exchange.check_approval(fx.asset_id));

        // Non-owner cannot list
        fx.assets
            .approve(&fx.seller, fx.asset_id, fx.exchange.identity())
            .unwrap();
        assert!(matches!(
            fx.exchange.list(&fx.buyer, fx.asset_id, 100),
            Err(MarketError::NotOwner(_, _))
        ));

        fx.exchange.list(&fx.seller, fx.asset_id, 100).unwrap();
        assert_eq!(
            fx.exchange.list(&fx.seller, fx.asset_id, 120),
            Err(MarketError::AlreadyListed(fx.asset_id))
        );
    }

    #[test]
    fn test_buy_happy_path() {
        let fx = setup();
        approve_and_list(&fx, 100);

        fx.ledger.approve(&fx.buyer, &fx.exchange.identity(), 100);
        let bundle = fx.exchange.buy(&fx.buyer, fx.asset_id).unwrap();

        assert_eq!(bundle.content_ref, "ipfs://QmContent");
        assert_eq!(bundle.decryption_key.as_deref(), Some("secret-key"));
        assert_eq!(fx.assets.owner_of(fx.asset_id).unwrap(), fx.buyer);
        assert!(!fx.exchange.get_listing(fx.asset_id).unwrap().active);
        assert_eq!(fx.ledger.balance_of(&fx.seller), 100);
        assert_eq!(fx.ledger.balance_of(&fx.buyer), 400);
        assert!(fx.assets.has_access(fx.asset_id, &fx.buyer));
    }

    #[test]
    fn test_buy_without_allowance_restores_listing() {
        let fx = setup();
        approve_and_list(&fx, 100);

        // No allowance granted: payment leg fails
        let err = fx.exchange.buy(&fx.buyer, fx.asset_id).unwrap_err();
        assert!(matches!(err, MarketError::PaymentFailed(_)));

        // Listing is exactly as if buy were never called
        let listing = fx.exchange.get_listing(fx.asset_id).unwrap();
        assert!(listing.active);
        assert_eq!(listing.price, 100);
        assert_eq!(fx.assets.owner_of(fx.asset_id).unwrap(), fx.seller);
        assert_eq!(fx.ledger.balance_of(&fx.seller), 0);
        assert_eq!(fx.ledger.balance_of(&fx.buyer), 500);
    }

    #[test]
    fn test_buy_transfer_failure_unwinds_payment_and_allowance() {
        let fx = setup();
        approve_and_list(&fx, 100);
        fx.ledger.approve(&fx.buyer, &fx.exchange.identity(), 100);

        // Seller redirects the operator approval after listing, so the
        // ownership leg fails after the payment leg succeeded
        let other = AccountId::from_seed(b"other-operator");
        fx.assets.approve(&fx.seller, fx.asset_id, other).unwrap();

        let err = fx.exchange.buy(&fx.buyer, fx.asset_id).unwrap_err();
        assert!(matches!(err, MarketError::TransferFailed(_)));

        // Nothing moved: ownership, balances, allowance, and listing are all
        // back to their pre-buy state
        assert_eq!(fx.assets.owner_of(fx.asset_id).unwrap(), fx.seller);
        assert_eq!(fx.ledger.balance_of(&fx.buyer), 500);
        assert_eq!(fx.ledger.balance_of(&fx.seller), 0);
        assert_eq!(fx.ledger.allowance(&fx.buyer, &fx.exchange.identity()), 100);
        assert!(fx.exchange.get_listing(fx.asset_id).unwrap().active);
    }

    #[test]
    fn test_buy_unlisted_asset() {
        let fx = setup();
        assert_eq!(
            fx.exchange.buy(&fx.buyer, fx.asset_id),
            Err(MarketError::NotForSale(fx.asset_id))
        );
    }

    #[test]
    fn test_update_price_and_cancel() {
        let fx = setup();
        approve_and_list(&fx, 100);

        assert!(matches!(
            fx.exchange.update_price(&fx.buyer, fx.asset_id, 50),
            Err(MarketError::NotOwner(_, _))
        ));
        fx.exchange.update_price(&fx.seller, fx.asset_id, 80).unwrap();
        assert_eq!(fx.exchange.get_listing(fx.asset_id).unwrap().price, 80);

        fx.exchange.cancel(&fx.seller, fx.asset_id).unwrap();
        assert!(!fx.exchange.get_listing(fx.asset_id).unwrap().active);
        assert_eq!(
            fx.exchange.cancel(&fx.seller, fx.asset_id),
            Err(MarketError::NotForSale(fx.asset_id))
        );

        // Listing and unlisting can cycle while minted
        fx.exchange.list(&fx.seller, fx.asset_id, 90).unwrap();
        assert!(fx.exchange.get_listing(fx.asset_id).unwrap().active);
    }

    #[test]
    fn test_relist_after_sale_by_new_owner() {
        let fx = setup();
        approve_and_list(&fx, 100);
        fx.ledger.approve(&fx.buyer, &fx.exchange.identity(), 100);
        fx.exchange.buy(&fx.buyer, fx.asset_id).unwrap();

        // Old owner cannot relist; new owner can after approving
        assert!(fx.exchange.list(&fx.seller, fx.asset_id, 100).is_err());
        fx.assets
            .approve(&fx.buyer, fx.asset_id, fx.exchange.identity())
            .unwrap();
        fx.exchange.list(&fx.buyer, fx.asset_id, 150).unwrap();
    }

    #[test]
    fn test_reentrancy_guard_rejects_nested_entry() {
        let fx = setup();
        let token = fx.exchange.guard.enter().unwrap();
        assert_eq!(
            fx.exchange.buy(&fx.buyer, fx.asset_id),
            Err(MarketError::ReentrantCall)
        );
        drop(token);
        // Guard returns to Idle once the operation finishes
        assert_eq!(
            fx.exchange.buy(&fx.buyer, fx.asset_id),
            Err(MarketError::NotForSale(fx.asset_id))
        );
    }

    #[test]
    fn test_buyer_with_exact_funds_scenario() {
        // Mirrors the end-to-end trade scenario: balance >= price and
        // allowance in place, seller credited exactly the price
        let fx = setup();
        approve_and_list(&fx, 500);
        fx.ledger.approve(&fx.buyer, &fx.exchange.identity(), 500);
        fx.exchange.buy(&fx.buyer, fx.asset_id).unwrap();
        assert_eq!(fx.ledger.balance_of(&fx.buyer), 0);
        assert_eq!(fx.ledger.balance_of(&fx.seller), 500);

        // Base-currency vault untouched by the credit-denominated sale
        assert_eq!(fx.vault.balance_of(&fx.buyer), 0);
    }
}
