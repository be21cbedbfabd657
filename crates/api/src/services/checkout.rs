//! Checkout orchestration: payment intents and order placement.
//!
//! [`CheckoutService::confirm_payment`] turns a succeeded payment intent and
//! the user's cart into an order:
//!
//! 1. Validate input (intent id, shipping address) before any external call.
//! 2. Resolve the user.
//! 3. Return the existing order if this intent was already confirmed.
//! 4. Verify the intent succeeded and was created for this user.
//! 5. Reload and price the cart; it must be non-empty and match the intent.
//! 6. Place the order in one transaction (lock, re-check, insert, clear cart).
//! 7. Notify the operator. Failure is logged; the order stands.
//!
//! Nothing is written before step 6, and step 6 is all-or-nothing.

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use tee_studio_core::pricing::CATALOG_CURRENCY;
use tee_studio_core::{
    Amount, Currency, Email, PaymentIntentStatus, ShippingAddress, ShippingAddressError, UserId,
};

use crate::clients::{CreateIntent, PaymentError, PaymentGateway, PaymentIntent};
use crate::db::{CartStore, OrderStore, RepositoryError, UserStore};
use crate::models::{Order, PlaceOrder, PlaceOrderOutcome};
use crate::services::cart::price_cart;
use crate::services::notifications::{Notification, NotificationService};

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("payment_intent_id is required")]
    MissingPaymentIntent,

    #[error("invalid shipping address: {0}")]
    InvalidShippingAddress(#[from] ShippingAddressError),

    #[error("user not found")]
    UserNotFound,

    /// The intent has not reached a succeeded state.
    #[error("payment not confirmed (status: {0})")]
    PaymentNotConfirmed(PaymentIntentStatus),

    /// The intent, or the order it produced, belongs to another user.
    #[error("payment intent belongs to another user")]
    PaymentOwnerMismatch,

    #[error("cart is empty")]
    EmptyCart,

    /// The intent was created for a different cart total.
    #[error("payment amount {charged} does not match cart total {expected}")]
    AmountMismatch { charged: Amount, expected: Amount },

    /// The intent was charged in a currency other than the catalog's.
    #[error("payment currency {charged} does not match catalog currency {expected}")]
    CurrencyMismatch { charged: Currency, expected: Currency },

    /// The service is configured to charge in a currency prices are not kept in.
    #[error("cannot charge in {0}: catalog prices are in {CATALOG_CURRENCY}")]
    UnsupportedCurrency(Currency),

    /// The cart changed while the order was being placed.
    #[error("cart changed during checkout, please review your cart")]
    CartChanged,

    #[error("test payments are only available with a test-mode key")]
    TestModeRequired,

    #[error("cart total overflow")]
    Overflow,

    #[error("payment processor error: {0}")]
    Payment(#[from] PaymentError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// What the browser needs to complete a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentSummary {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub amount: Amount,
    pub currency: Currency,
}

/// Result of a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub order: Order,
    /// `true` when the intent had already been confirmed and nothing was written.
    pub replayed: bool,
}

/// Shipping address used by the test flow when none is supplied.
#[must_use]
pub fn test_shipping_address() -> ShippingAddress {
    ShippingAddress {
        name: "Test User".to_owned(),
        address: "1-1-1 Chiyoda".to_owned(),
        city: "Chiyoda-ku, Tokyo".to_owned(),
        postal_code: "100-0001".to_owned(),
        country: "Japan".to_owned(),
    }
}

/// Checkout orchestrator.
pub struct CheckoutService<'a> {
    users: &'a dyn UserStore,
    carts: &'a dyn CartStore,
    orders: &'a dyn OrderStore,
    payments: &'a dyn PaymentGateway,
    notifications: NotificationService<'a>,
    currency: Currency,
}

impl<'a> CheckoutService<'a> {
    /// Create a new checkout service.
    #[must_use]
    pub const fn new(
        users: &'a dyn UserStore,
        carts: &'a dyn CartStore,
        orders: &'a dyn OrderStore,
        payments: &'a dyn PaymentGateway,
        notifications: NotificationService<'a>,
        currency: Currency,
    ) -> Self {
        Self {
            users,
            carts,
            orders,
            payments,
            notifications,
            currency,
        }
    }

    /// Create a payment intent for the user's current cart total.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` if there is nothing to pay for, or
    /// `CheckoutError::Payment` if the processor fails.
    #[instrument(skip(self), fields(%user_id))]
    pub async fn create_intent(&self, user_id: UserId) -> Result<IntentSummary, CheckoutError> {
        let request = self.intent_request(user_id).await?;
        let intent = self.payments.create_intent(&request).await?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            PaymentError::Parse("payment intent has no client secret".to_owned())
        })?;

        tracing::info!(payment_intent_id = %intent.id, amount = request.amount.minor(), "Payment intent created");
        Ok(IntentSummary {
            client_secret,
            payment_intent_id: intent.id,
            amount: intent.amount,
            currency: intent.currency,
        })
    }

    /// Confirm a payment and materialize the user's cart as an order.
    ///
    /// Re-submitting the same `payment_intent_id` after success returns the
    /// original order without writing anything.
    ///
    /// # Errors
    ///
    /// See [`CheckoutError`]. No error leaves partial order or cart state.
    #[instrument(skip(self, shipping_address), fields(%user_id))]
    pub async fn confirm_payment(
        &self,
        user_id: UserId,
        payment_intent_id: &str,
        shipping_address: ShippingAddress,
    ) -> Result<Confirmation, CheckoutError> {
        let payment_intent_id = payment_intent_id.trim();
        if payment_intent_id.is_empty() {
            return Err(CheckoutError::MissingPaymentIntent);
        }
        let shipping_address = shipping_address.validate()?;

        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(CheckoutError::UserNotFound)?;

        if let Some(order) = self.existing_order(user_id, payment_intent_id).await? {
            tracing::info!(order_id = %order.id, "Payment already confirmed, returning existing order");
            return Ok(Confirmation {
                order,
                replayed: true,
            });
        }

        let intent = self.payments.retrieve(payment_intent_id).await?;
        verify_intent(&intent, user_id)?;

        let cart = self.carts.list(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let (lines, total) = price_cart(&cart).ok_or(CheckoutError::Overflow)?;
        if intent.currency != CATALOG_CURRENCY {
            tracing::warn!(
                payment_intent_id,
                charged = %intent.currency,
                "Payment currency does not match catalog"
            );
            return Err(CheckoutError::CurrencyMismatch {
                charged: intent.currency,
                expected: CATALOG_CURRENCY,
            });
        }
        if intent.amount != total {
            tracing::warn!(
                payment_intent_id,
                charged = intent.amount.minor(),
                expected = total.minor(),
                "Payment amount does not match cart"
            );
            return Err(CheckoutError::AmountMismatch {
                charged: intent.amount,
                expected: total,
            });
        }

        let outcome = self
            .orders
            .place_order(PlaceOrder {
                user_id,
                payment_intent_id: payment_intent_id.to_owned(),
                shipping_address,
                currency: CATALOG_CURRENCY,
                lines,
                total,
            })
            .await?;

        let order = match outcome {
            PlaceOrderOutcome::Created(order) => order,
            // A concurrent confirmation of the same intent won the race.
            PlaceOrderOutcome::DuplicatePayment | PlaceOrderOutcome::CartChanged => {
                return match self.existing_order(user_id, payment_intent_id).await? {
                    Some(order) => Ok(Confirmation {
                        order,
                        replayed: true,
                    }),
                    None => Err(CheckoutError::CartChanged),
                };
            }
        };

        tracing::info!(order_id = %order.id, total = order.total_amount.minor(), "Order placed");
        self.notify_order_placed(&order, &user.email).await;

        Ok(Confirmation {
            order,
            replayed: false,
        })
    }

    /// Pay for the cart with an auto-confirmed test intent, then confirm it.
    ///
    /// Only available when the gateway runs in test mode.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::TestModeRequired` outside test mode, plus
    /// everything [`Self::confirm_payment`] can return.
    #[instrument(skip(self, shipping_address), fields(%user_id))]
    pub async fn test_flow(
        &self,
        user_id: UserId,
        shipping_address: Option<ShippingAddress>,
    ) -> Result<Confirmation, CheckoutError> {
        if !self.payments.is_test_mode() {
            return Err(CheckoutError::TestModeRequired);
        }

        let request = self.intent_request(user_id).await?;
        let intent = self.payments.create_confirmed_test_intent(&request).await?;

        self.confirm_payment(
            user_id,
            &intent.id,
            shipping_address.unwrap_or_else(test_shipping_address),
        )
        .await
    }

    async fn intent_request(&self, user_id: UserId) -> Result<CreateIntent, CheckoutError> {
        if self.currency != CATALOG_CURRENCY {
            return Err(CheckoutError::UnsupportedCurrency(self.currency));
        }
        let cart = self.carts.list(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let (_, total) = price_cart(&cart).ok_or(CheckoutError::Overflow)?;

        Ok(CreateIntent {
            amount: total,
            currency: self.currency,
            user_id,
        })
    }

    /// The order already placed for this intent, if it is the user's.
    async fn existing_order(
        &self,
        user_id: UserId,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, CheckoutError> {
        match self.orders.find_by_payment_intent(payment_intent_id).await? {
            Some(order) if order.user_id == user_id => Ok(Some(order)),
            Some(_) => Err(CheckoutError::PaymentOwnerMismatch),
            None => Ok(None),
        }
    }

    async fn notify_order_placed(&self, order: &Order, customer: &Email) {
        let sent = self
            .notifications
            .send(&Notification::OrderConfirmation { order }, customer)
            .await;
        if !sent {
            tracing::warn!(order_id = %order.id, "Order placed but confirmation email was not sent");
        }
    }
}

fn verify_intent(intent: &PaymentIntent, user_id: UserId) -> Result<(), CheckoutError> {
    if !intent.status.is_succeeded() {
        return Err(CheckoutError::PaymentNotConfirmed(intent.status.clone()));
    }
    // Every intent created here carries its owner; one without is foreign.
    if intent.user_id() != Some(user_id) {
        return Err(CheckoutError::PaymentOwnerMismatch);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tee_studio_core::{DesignId, OrderStatus};

    use super::*;
    use crate::models::NewCartItem;
    use crate::testing::{FakePaymentGateway, InMemoryStore, RecordingMailer};

    struct Harness {
        store: InMemoryStore,
        payments: FakePaymentGateway,
        mailer: RecordingMailer,
        admin: Email,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: InMemoryStore::new(),
                payments: FakePaymentGateway::new(),
                mailer: RecordingMailer::new(),
                admin: Email::parse("ops@teestudio.example").unwrap(),
            }
        }

        fn checkout(&self) -> CheckoutService<'_> {
            self.checkout_in(Currency::Jpy)
        }

        fn checkout_in(&self, currency: Currency) -> CheckoutService<'_> {
            CheckoutService::new(
                &self.store,
                &self.store,
                &self.store,
                &self.payments,
                NotificationService::new(&self.mailer, &self.admin),
                currency,
            )
        }

        /// A user with one cart line: design 7-like, qty 2, M / White.
        async fn user_with_cart(&self, quantity: u32) -> (UserId, DesignId) {
            let user = self.store.seed_user("taro@example.jp").await;
            let design = self.store.seed_design(user.id).await;
            self.store
                .insert_cart_item(NewCartItem {
                    user_id: user.id,
                    design_id: design.id,
                    quantity,
                    size: "M".to_string(),
                    color: "White".to_string(),
                    design_config: None,
                })
                .await;
            (user.id, design.id)
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Taro Yamada".to_string(),
            address: "1-1-1 Chiyoda".to_string(),
            city: "Tokyo".to_string(),
            postal_code: "100-0001".to_string(),
            country: "Japan".to_string(),
        }
    }

    #[tokio::test]
    async fn test_confirm_creates_order_and_clears_cart() {
        let h = Harness::new();
        let (user_id, design_id) = h.user_with_cart(2).await;
        let intent = h
            .payments
            .succeeded_intent(Amount::from_minor(6000), user_id);

        let confirmation = h
            .checkout()
            .confirm_payment(user_id, &intent, address())
            .await
            .unwrap();
        let order = confirmation.order;

        assert!(!confirmation.replayed);
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.total_amount, Amount::from_minor(6000));
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].design_id, design_id);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[0].unit_price, Amount::from_minor(3000));
        assert!(h.store.cart_items(user_id).await.is_empty());
        assert_eq!(h.mailer.sent().len(), 1);
        assert_eq!(h.mailer.sent()[0].subject, format!("[Forward] New order #{}", order.id));
    }

    #[tokio::test]
    async fn test_unsucceeded_intent_writes_nothing() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(1).await;
        let intent = h.payments.intent_with_status(
            Amount::from_minor(3000),
            user_id,
            PaymentIntentStatus::Canceled,
        );

        let err = h
            .checkout()
            .confirm_payment(user_id, &intent, address())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::PaymentNotConfirmed(PaymentIntentStatus::Canceled)
        ));
        assert_eq!(h.store.cart_items(user_id).await.len(), 1);
        assert!(h.store.orders_for(user_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_replay_returns_same_order_without_new_writes() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(2).await;
        let intent = h
            .payments
            .succeeded_intent(Amount::from_minor(6000), user_id);
        let checkout = h.checkout();

        let first = checkout
            .confirm_payment(user_id, &intent, address())
            .await
            .unwrap();
        let second = checkout
            .confirm_payment(user_id, &intent, address())
            .await
            .unwrap();

        assert!(second.replayed);
        assert_eq!(first.order.id, second.order.id);
        assert_eq!(h.store.orders_for(user_id).await.len(), 1);
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_cart_is_conflict() {
        let h = Harness::new();
        let user = h.store.seed_user("a@example.com").await;
        let intent = h
            .payments
            .succeeded_intent(Amount::from_minor(3000), user.id);

        let err = h
            .checkout()
            .confirm_payment(user.id, &intent, address())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));
        assert!(h.store.orders_for(user.id).await.is_empty());

        assert!(matches!(
            h.checkout().create_intent(user.id).await,
            Err(CheckoutError::EmptyCart)
        ));
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_rejected() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(2).await;
        let intent = h
            .payments
            .succeeded_intent(Amount::from_minor(5000), user_id);

        let err = h
            .checkout()
            .confirm_payment(user_id, &intent, address())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::AmountMismatch { .. }));
        assert_eq!(h.store.cart_items(user_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_intent_for_another_user_is_rejected() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(1).await;
        let intent = h
            .payments
            .succeeded_intent(Amount::from_minor(3000), UserId::new(999));

        let err = h
            .checkout()
            .confirm_payment(user_id, &intent, address())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentOwnerMismatch));
    }

    #[tokio::test]
    async fn test_validation_precedes_external_calls() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(1).await;
        let mut bad_address = address();
        bad_address.postal_code = " ".to_string();

        let err = h
            .checkout()
            .confirm_payment(user_id, "pi_whatever", bad_address)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidShippingAddress(_)));

        let err = h
            .checkout()
            .confirm_payment(user_id, "  ", address())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::MissingPaymentIntent));
        assert_eq!(h.payments.retrieve_count(), 0);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_order() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(2).await;
        let intent = h
            .payments
            .succeeded_intent(Amount::from_minor(6000), user_id);
        h.mailer.fail();

        let confirmation = h
            .checkout()
            .confirm_payment(user_id, &intent, address())
            .await
            .unwrap();

        assert_eq!(
            h.store.orders_for(user_id).await[0].id,
            confirmation.order.id
        );
        assert!(h.store.cart_items(user_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_cart_change_during_placement_rolls_back() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(2).await;
        let intent = h
            .payments
            .succeeded_intent(Amount::from_minor(6000), user_id);
        h.store.change_cart_before_next_order();

        let err = h
            .checkout()
            .confirm_payment(user_id, &intent, address())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::CartChanged));
        assert!(h.store.orders_for(user_id).await.is_empty());
        assert!(!h.store.cart_items(user_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_create_intent_uses_canonical_total() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(3).await;

        let summary = h.checkout().create_intent(user_id).await.unwrap();

        assert_eq!(summary.amount, Amount::from_minor(9000));
        assert_eq!(summary.currency, Currency::Jpy);
        assert!(!summary.client_secret.is_empty());
        let intent = h.payments.intent(&summary.payment_intent_id).unwrap();
        assert_eq!(intent.user_id(), Some(user_id));
    }

    #[tokio::test]
    async fn test_test_flow_requires_test_mode() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(1).await;

        h.payments.set_test_mode(false);
        assert!(matches!(
            h.checkout().test_flow(user_id, None).await,
            Err(CheckoutError::TestModeRequired)
        ));

        h.payments.set_test_mode(true);
        let confirmation = h.checkout().test_flow(user_id, None).await.unwrap();
        assert_eq!(confirmation.order.total_amount, Amount::from_minor(3000));
        assert_eq!(confirmation.order.shipping_address, test_shipping_address());
    }

    #[tokio::test]
    async fn test_non_catalog_charge_currency_is_refused() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(2).await;
        let checkout = h.checkout_in(Currency::Usd);

        assert!(matches!(
            checkout.create_intent(user_id).await,
            Err(CheckoutError::UnsupportedCurrency(Currency::Usd))
        ));
        assert!(matches!(
            checkout.test_flow(user_id, None).await,
            Err(CheckoutError::UnsupportedCurrency(Currency::Usd))
        ));

        assert!(h.store.orders_for(user_id).await.is_empty());
        assert_eq!(h.store.cart_items(user_id).await.len(), 1);
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_intent_in_other_currency_is_rejected() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(2).await;
        let intent =
            h.payments
                .succeeded_intent_in(Amount::from_minor(6000), Currency::Usd, user_id);

        // Same digits as the cart total, wrong money.
        let err = h
            .checkout_in(Currency::Usd)
            .confirm_payment(user_id, &intent, address())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::CurrencyMismatch {
                charged: Currency::Usd,
                expected: Currency::Jpy,
            }
        ));
        assert!(h.store.orders_for(user_id).await.is_empty());
        assert_eq!(h.store.cart_items(user_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_intent_without_owner_is_rejected() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(1).await;
        let intent = h.payments.unowned_intent(Amount::from_minor(3000));

        let err = h
            .checkout()
            .confirm_payment(user_id, &intent, address())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::PaymentOwnerMismatch));
        assert!(h.store.orders_for(user_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_confirmations_of_one_intent_place_one_order() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(2).await;
        let intent = h
            .payments
            .succeeded_intent(Amount::from_minor(6000), user_id);
        let checkout = h.checkout();

        let (first, second) = tokio::join!(
            checkout.confirm_payment(user_id, &intent, address()),
            checkout.confirm_payment(user_id, &intent, address()),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.order.id, second.order.id);
        assert_eq!(
            [first.replayed, second.replayed]
                .iter()
                .filter(|replayed| **replayed)
                .count(),
            1
        );
        assert_eq!(h.store.orders_for(user_id).await.len(), 1);
        assert!(h.store.cart_items(user_id).await.is_empty());
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_intents_cannot_spend_one_cart_twice() {
        let h = Harness::new();
        let (user_id, _) = h.user_with_cart(2).await;
        let first_intent = h
            .payments
            .succeeded_intent(Amount::from_minor(6000), user_id);
        let second_intent = h
            .payments
            .succeeded_intent(Amount::from_minor(6000), user_id);
        let checkout = h.checkout();

        let (first, second) = tokio::join!(
            checkout.confirm_payment(user_id, &first_intent, address()),
            checkout.confirm_payment(user_id, &second_intent, address()),
        );
        let outcomes = [first, second];

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(CheckoutError::CartChanged)))
                .count(),
            1
        );
        assert_eq!(h.store.orders_for(user_id).await.len(), 1);
        assert_eq!(h.mailer.sent().len(), 1);
    }
}
