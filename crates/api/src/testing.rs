//! In-memory doubles for every store and external client.
//!
//! Compiled for unit tests and behind the `test-support` feature for the
//! integration-test crate. Nothing here talks to the network or a database.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use tee_studio_core::{
    Amount, CartItemId, Currency, DesignId, Email, OrderId, OrderItemId, OrderStatus,
    PaymentIntentStatus, Placement, ShippingAddress, UserId,
};

use crate::clients::{
    ArtifactStore, CreateIntent, EmailError, GenerationError, ImageGenerator, Mailer,
    OutgoingEmail, PaymentError, PaymentGateway, PaymentIntent, StorageError, TranslationError,
    Translator,
};
use crate::db::{CartStore, DesignStore, OrderStore, RepositoryError, UserStore};
use crate::models::{
    CartItem, Design, NewCartItem, NewDesign, Order, OrderItem, OrderLine, PlaceOrder,
    PlaceOrderOutcome, User, UserCredentials,
};

// =============================================================================
// Stores
// =============================================================================

#[derive(Default)]
struct Tables {
    users: Vec<UserCredentials>,
    designs: Vec<Design>,
    cart_items: Vec<CartItem>,
    orders: Vec<Order>,
}

/// All four stores over one set of in-memory tables.
///
/// `place_order` holds the table lock for its whole body, which gives the
/// same all-or-nothing behavior as the `PostgreSQL` transaction.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    next_id: AtomicI32,
    change_cart_before_order: AtomicBool,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Insert a user with an unusable password hash.
    pub async fn seed_user(&self, email: &str) -> User {
        let email = Email::parse(email).unwrap();
        self.create(&email, "seeded-without-password").await.unwrap()
    }

    /// Insert a design owned by `user_id`.
    pub async fn seed_design(&self, user_id: UserId) -> Design {
        DesignStore::insert(
            self,
            NewDesign {
                user_id,
                prompt: "a cat surfing".to_string(),
                translated_prompt: None,
                image_url: "https://artifacts.test/designs/seed.png".to_string(),
                storage_key: "designs/seed.png".to_string(),
                placement: Placement::default(),
            },
        )
        .await
        .unwrap()
    }

    /// Insert a processing order with no items.
    pub async fn seed_order(&self, user_id: UserId, total: Amount) -> Order {
        let now = Utc::now();
        let id = OrderId::new(self.next_id());
        let order = Order {
            id,
            user_id,
            status: OrderStatus::Processing,
            total_amount: total,
            currency: Currency::Jpy,
            payment_intent_id: format!("pi_seed_{id}"),
            shipping_address: ShippingAddress {
                name: "Seed Customer".to_string(),
                address: "1-1-1 Chiyoda".to_string(),
                city: "Tokyo".to_string(),
                postal_code: "100-0001".to_string(),
                country: "Japan".to_string(),
            },
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.orders.push(order.clone());
        order
    }

    pub async fn insert_cart_item(&self, item: NewCartItem) -> CartItem {
        CartStore::insert(self, item).await.unwrap()
    }

    pub async fn list_designs(&self, user_id: UserId) -> Vec<Design> {
        self.list_for_user_designs(user_id).await
    }

    pub async fn cart_items(&self, user_id: UserId) -> Vec<CartItem> {
        CartStore::list(self, user_id).await.unwrap()
    }

    pub async fn orders_for(&self, user_id: UserId) -> Vec<Order> {
        OrderStore::list_for_user(self, user_id).await.unwrap()
    }

    /// Simulate a concurrent cart edit landing between pricing and placement.
    pub fn change_cart_before_next_order(&self) {
        self.change_cart_before_order.store(true, Ordering::SeqCst);
    }

    async fn list_for_user_designs(&self, user_id: UserId) -> Vec<Design> {
        let tables = self.tables.lock().await;
        let mut designs: Vec<Design> = tables
            .designs
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        designs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        designs
    }
}

fn cart_matches(current: &[&CartItem], lines: &[OrderLine]) -> bool {
    current.len() == lines.len()
        && current.iter().zip(lines).all(|(item, line)| {
            item.id == line.cart_item_id
                && item.design_id == line.design_id
                && item.quantity == line.quantity
                && item.size == line.size
                && item.color == line.color
        })
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create(&self, email: &Email, password_hash: &str) -> Result<User, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|c| &c.user.email == email) {
            return Err(RepositoryError::Conflict("email already registered".to_string()));
        }
        let user = User {
            id: UserId::new(self.next_id()),
            email: email.clone(),
            is_admin: false,
            created_at: Utc::now(),
        };
        tables.users.push(UserCredentials {
            user: user.clone(),
            password_hash: password_hash.to_owned(),
        });
        Ok(user)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .find(|c| c.user.id == id)
            .map(|c| c.user.clone()))
    }

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|c| &c.user.email == email).cloned())
    }

    async fn set_admin(&self, email: &Email, is_admin: bool) -> Result<User, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let credentials = tables
            .users
            .iter_mut()
            .find(|c| &c.user.email == email)
            .ok_or(RepositoryError::NotFound)?;
        credentials.user.is_admin = is_admin;
        Ok(credentials.user.clone())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl DesignStore for InMemoryStore {
    async fn insert(&self, design: NewDesign) -> Result<Design, RepositoryError> {
        let design = Design {
            id: DesignId::new(self.next_id()),
            user_id: design.user_id,
            prompt: design.prompt,
            translated_prompt: design.translated_prompt,
            image_url: design.image_url,
            storage_key: design.storage_key,
            placement: design.placement,
            created_at: Utc::now(),
        };
        self.tables.lock().await.designs.push(design.clone());
        Ok(design)
    }

    async fn get(&self, id: DesignId) -> Result<Option<Design>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.designs.iter().find(|d| d.id == id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Design>, RepositoryError> {
        Ok(self.list_for_user_designs(user_id).await)
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn list(&self, user_id: UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cart_items
            .iter()
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, item: NewCartItem) -> Result<CartItem, RepositoryError> {
        let item = CartItem {
            id: CartItemId::new(self.next_id()),
            user_id: item.user_id,
            design_id: item.design_id,
            quantity: item.quantity,
            size: item.size,
            color: item.color,
            design_config: item.design_config,
            created_at: Utc::now(),
        };
        self.tables.lock().await.cart_items.push(item.clone());
        Ok(item)
    }

    async fn update_quantity(
        &self,
        user_id: UserId,
        id: CartItemId,
        quantity: u32,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .cart_items
            .iter_mut()
            .find(|item| item.id == id && item.user_id == user_id)
            .map(|item| {
                item.quantity = quantity;
                item.clone()
            }))
    }

    async fn delete(&self, user_id: UserId, id: CartItemId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let before = tables.cart_items.len();
        tables
            .cart_items
            .retain(|item| !(item.id == id && item.user_id == user_id));
        Ok(tables.cart_items.len() < before)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn place_order(&self, order: PlaceOrder) -> Result<PlaceOrderOutcome, RepositoryError> {
        // Let concurrent checkouts reach this point before either takes the lock.
        tokio::task::yield_now().await;
        let mut tables = self.tables.lock().await;

        if self.change_cart_before_order.swap(false, Ordering::SeqCst) {
            if let Some(item) = tables
                .cart_items
                .iter_mut()
                .find(|item| item.user_id == order.user_id)
            {
                item.quantity += 1;
            }
        }

        let current: Vec<&CartItem> = tables
            .cart_items
            .iter()
            .filter(|item| item.user_id == order.user_id)
            .collect();
        if !cart_matches(&current, &order.lines) {
            return Ok(PlaceOrderOutcome::CartChanged);
        }
        if tables
            .orders
            .iter()
            .any(|o| o.payment_intent_id == order.payment_intent_id)
        {
            return Ok(PlaceOrderOutcome::DuplicatePayment);
        }

        let now = Utc::now();
        let items = order
            .lines
            .iter()
            .map(|line| OrderItem {
                id: OrderItemId::new(self.next_id()),
                design_id: line.design_id,
                quantity: line.quantity,
                size: line.size.clone(),
                color: line.color.clone(),
                unit_price: line.unit_price,
            })
            .collect();
        let created = Order {
            id: OrderId::new(self.next_id()),
            user_id: order.user_id,
            status: OrderStatus::Processing,
            total_amount: order.total,
            currency: order.currency,
            payment_intent_id: order.payment_intent_id,
            shipping_address: order.shipping_address,
            items,
            created_at: now,
            updated_at: now,
        };

        let consumed: Vec<CartItemId> = order.lines.iter().map(|l| l.cart_item_id).collect();
        tables
            .cart_items
            .retain(|item| !consumed.contains(&item.id));
        tables.orders.push(created.clone());

        Ok(PlaceOrderOutcome::Created(created))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .iter()
            .find(|o| o.payment_intent_id == payment_intent_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.status == from)
            .map(|o| {
                o.status = to;
                o.updated_at = Utc::now();
                o.clone()
            }))
    }
}

// =============================================================================
// Payment
// =============================================================================

/// Payment gateway over a map of intents. Starts in test mode.
pub struct FakePaymentGateway {
    intents: StdMutex<HashMap<String, PaymentIntent>>,
    next_id: AtomicUsize,
    test_mode: AtomicBool,
    retrieves: AtomicUsize,
}

impl Default for FakePaymentGateway {
    fn default() -> Self {
        Self {
            intents: StdMutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
            test_mode: AtomicBool::new(true),
            retrieves: AtomicUsize::new(0),
        }
    }
}

impl FakePaymentGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_test_mode(&self, enabled: bool) {
        self.test_mode.store(enabled, Ordering::SeqCst);
    }

    /// Register a succeeded JPY intent for `user_id` and return its id.
    pub fn succeeded_intent(&self, amount: Amount, user_id: UserId) -> String {
        self.intent_with_status(amount, user_id, PaymentIntentStatus::Succeeded)
    }

    /// Register a JPY intent in the given status and return its id.
    pub fn intent_with_status(
        &self,
        amount: Amount,
        user_id: UserId,
        status: PaymentIntentStatus,
    ) -> String {
        self.store(amount, Currency::Jpy, Some(user_id), status).id
    }

    /// Register a succeeded intent in `currency` and return its id.
    pub fn succeeded_intent_in(
        &self,
        amount: Amount,
        currency: Currency,
        user_id: UserId,
    ) -> String {
        self.store(amount, currency, Some(user_id), PaymentIntentStatus::Succeeded)
            .id
    }

    /// Register a succeeded JPY intent with no owner metadata.
    pub fn unowned_intent(&self, amount: Amount) -> String {
        self.store(amount, Currency::Jpy, None, PaymentIntentStatus::Succeeded)
            .id
    }

    pub fn intent(&self, id: &str) -> Option<PaymentIntent> {
        self.intents.lock().unwrap().get(id).cloned()
    }

    pub fn retrieve_count(&self) -> usize {
        self.retrieves.load(Ordering::SeqCst)
    }

    fn store(
        &self,
        amount: Amount,
        currency: Currency,
        owner: Option<UserId>,
        status: PaymentIntentStatus,
    ) -> PaymentIntent {
        let id = format!("pi_test_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret_test")),
            id: id.clone(),
            amount,
            currency,
            status,
            metadata: owner
                .map(|user_id| HashMap::from([("user_id".to_string(), user_id.to_string())]))
                .unwrap_or_default(),
        };
        self.intents.lock().unwrap().insert(id, intent.clone());
        intent
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, PaymentError> {
        Ok(self.store(
            request.amount,
            request.currency,
            Some(request.user_id),
            PaymentIntentStatus::RequiresPaymentMethod,
        ))
    }

    async fn retrieve(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        self.retrieves.fetch_add(1, Ordering::SeqCst);
        self.intent(intent_id)
            .ok_or_else(|| PaymentError::NotFound(intent_id.to_owned()))
    }

    async fn create_confirmed_test_intent(
        &self,
        request: &CreateIntent,
    ) -> Result<PaymentIntent, PaymentError> {
        if !self.is_test_mode() {
            return Err(PaymentError::TestModeRequired);
        }
        Ok(self.store(
            request.amount,
            request.currency,
            Some(request.user_id),
            PaymentIntentStatus::Succeeded,
        ))
    }

    fn is_test_mode(&self) -> bool {
        self.test_mode.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Design pipeline
// =============================================================================

/// PNG signature, enough to look like an image.
const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Image generator that records prompts and returns a fixed PNG header.
#[derive(Default)]
pub struct FakeImageGenerator {
    prompts: StdMutex<Vec<String>>,
    failing: AtomicBool,
}

impl FakeImageGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageGenerator for FakeImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        if self.failing.load(Ordering::SeqCst) {
            return Err(GenerationError::Unavailable("generator offline".to_string()));
        }
        Ok(FAKE_PNG.to_vec())
    }
}

/// Translator that echoes its input unless told otherwise.
#[derive(Default)]
pub struct FakeTranslator {
    response: StdMutex<Option<String>>,
    failing: AtomicBool,
}

impl FakeTranslator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(&self, text: &str) {
        *self.response.lock().unwrap() = Some(text.to_owned());
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TranslationError::Unavailable("translator offline".to_string()));
        }
        Ok(self
            .response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| text.to_owned()))
    }
}

/// Artifact store that records keys and returns predictable URLs.
#[derive(Default)]
pub struct FakeArtifactStore {
    keys: StdMutex<Vec<String>>,
    failing: AtomicBool,
}

impl FakeArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for FakeArtifactStore {
    async fn put(
        &self,
        key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Upload("bucket unavailable".to_string()));
        }
        self.keys.lock().unwrap().push(key.to_owned());
        Ok(format!("https://artifacts.test/{key}"))
    }
}

// =============================================================================
// Email
// =============================================================================

/// Mailer that keeps every message it accepts.
#[derive(Default)]
pub struct RecordingMailer {
    sent: StdMutex<Vec<OutgoingEmail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmailError::Rejected("relay refused message".to_string()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
