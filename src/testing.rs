//! In-memory stand-ins for every port, shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::clients::{ProductCatalog, ShippingCostClient, StockMovement, TokenVerifier, WarehouseClient};
use crate::cqrs::EventMetadata;
use crate::domain::order::{
    CommandDependencies, Order, OrderCommandHandler, OrderSettings, OrderStatus, OrderView, PlaceOrder,
    PlaceOrderAddress, PlaceOrderItem, ProductDetails, ViewFilter, ViewUpdate, ViewWrite,
};
use crate::errors::{ServiceError, ServiceResult};
use crate::messaging::{DeliveryProgress, EventPublisher, InboundMessage, MessageHandler, MessageSource};
use crate::metrics::Metrics;
use crate::store::{expiry_key, OrderChange, OrderCommandStore, OrderExpiryStore, OrderViewStore};

// ============================================================================
// Command store
// ============================================================================

#[derive(Default)]
pub struct InMemoryCommandStore {
    orders: Mutex<HashMap<Uuid, Order>>,
    pub fail_insert: AtomicBool,
    /// Number of upcoming updates that lose the compare-and-set race.
    pub conflicts: AtomicUsize,
}

impl InMemoryCommandStore {
    pub fn get(&self, order_id: Uuid) -> Option<Order> {
        self.orders.lock().unwrap().get(&order_id).cloned()
    }

    pub fn put(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.id, order);
    }

    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }
}

#[async_trait]
impl OrderCommandStore for InMemoryCommandStore {
    async fn insert(&self, order: &Order) -> ServiceResult<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(ServiceError::Persistence("insert refused".to_string()));
        }
        self.put(order.clone());
        Ok(())
    }

    async fn find(&self, order_id: Uuid) -> ServiceResult<Option<Order>> {
        Ok(self.get(order_id))
    }

    async fn update(&self, change: &OrderChange) -> ServiceResult<bool> {
        if self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(false);
        }

        let mut orders = self.orders.lock().unwrap();
        match orders.get_mut(&change.order_id) {
            Some(order) if order.status == change.expected_status => {
                order.status = change.status;
                if change.payment_id.is_some() {
                    order.payment_id = change.payment_id;
                }
                order.updated_at = change.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_pending_created_before(&self, cutoff: DateTime<Utc>, limit: i64) -> ServiceResult<Vec<Uuid>> {
        let orders = self.orders.lock().unwrap();
        let mut stale: Vec<&Order> = orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .collect();
        stale.sort_by_key(|o| o.created_at);
        Ok(stale.into_iter().take(limit as usize).map(|o| o.id).collect())
    }
}

// ============================================================================
// View store
// ============================================================================

#[derive(Default)]
struct ViewTables {
    views: HashMap<Uuid, OrderView>,
    buffered: HashMap<Uuid, Vec<ViewUpdate>>,
}

#[derive(Default)]
pub struct InMemoryViewStore {
    tables: Mutex<ViewTables>,
    /// Number of upcoming update writes that fail.
    pub failing_writes: AtomicUsize,
}

impl InMemoryViewStore {
    pub fn get(&self, order_id: Uuid) -> Option<OrderView> {
        self.tables.lock().unwrap().views.get(&order_id).cloned()
    }

    pub fn buffered(&self, order_id: Uuid) -> usize {
        self.tables
            .lock()
            .unwrap()
            .buffered
            .get(&order_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl OrderViewStore for InMemoryViewStore {
    async fn insert(&self, view: &OrderView) -> ServiceResult<Option<OrderView>> {
        let mut tables = self.tables.lock().unwrap();
        if tables.views.contains_key(&view.order_id) {
            return Ok(None);
        }
        let mut view = view.clone();
        for update in tables.buffered.remove(&view.order_id).unwrap_or_default() {
            view.apply(&update);
        }
        tables.views.insert(view.order_id, view.clone());
        Ok(Some(view))
    }

    async fn apply(&self, update: &ViewUpdate) -> ServiceResult<ViewWrite> {
        if self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ServiceError::Persistence("view write refused".to_string()));
        }

        let mut guard = self.tables.lock().unwrap();
        let tables = &mut *guard;
        match tables.views.get_mut(&update.order_id()) {
            Some(view) => {
                view.apply(update);
                Ok(ViewWrite::Applied)
            }
            None => {
                tables.buffered.entry(update.order_id()).or_default().push(update.clone());
                Ok(ViewWrite::Buffered)
            }
        }
    }

    async fn find_by_order_id(&self, order_id: Uuid) -> ServiceResult<Option<OrderView>> {
        Ok(self.get(order_id))
    }

    async fn list(&self, filter: ViewFilter) -> ServiceResult<Vec<OrderView>> {
        let tables = self.tables.lock().unwrap();
        let mut matching: Vec<OrderView> = tables
            .views
            .values()
            .filter(|v| match filter {
                ViewFilter::All => true,
                ViewFilter::User(id) => v.user_id == id,
                ViewFilter::Payment(id) => v.payment_id == Some(id),
                ViewFilter::Status(status) => v.status == status,
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

// ============================================================================
// Expiry store
// ============================================================================

pub struct InMemoryExpiryStore {
    keys: Mutex<HashMap<Uuid, Duration>>,
    pub fail_remove: AtomicBool,
    sender: mpsc::UnboundedSender<String>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Default for InMemoryExpiryStore {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            keys: Mutex::new(HashMap::new()),
            fail_remove: AtomicBool::new(false),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl InMemoryExpiryStore {
    pub fn has_key(&self, order_id: Uuid) -> bool {
        self.keys.lock().unwrap().contains_key(&order_id)
    }

    /// Drop the key and announce it the way Redis does.
    pub fn expire(&self, order_id: Uuid) {
        self.keys.lock().unwrap().remove(&order_id);
        self.notify(expiry_key(order_id));
    }

    pub fn notify(&self, key: String) {
        let _ = self.sender.send(key);
    }
}

#[async_trait]
impl OrderExpiryStore for InMemoryExpiryStore {
    async fn register(&self, order_id: Uuid, ttl: Duration) -> ServiceResult<()> {
        self.keys.lock().unwrap().insert(order_id, ttl);
        Ok(())
    }

    async fn remove(&self, order_id: Uuid) -> ServiceResult<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(ServiceError::Persistence("key-value store unreachable".to_string()));
        }
        self.keys.lock().unwrap().remove(&order_id);
        Ok(())
    }

    async fn remaining(&self, order_id: Uuid) -> ServiceResult<Option<Duration>> {
        Ok(self.keys.lock().unwrap().get(&order_id).copied())
    }

    async fn expirations(&self) -> ServiceResult<BoxStream<'static, String>> {
        match self.receiver.lock().unwrap().take() {
            Some(receiver) => Ok(stream::unfold(receiver, |mut rx| async move {
                rx.recv().await.map(|key| (key, rx))
            })
            .boxed()),
            None => Ok(stream::pending::<String>().boxed()),
        }
    }
}

// ============================================================================
// Publisher
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRecord {
    pub topic: String,
    pub key: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[derive(Default)]
pub struct RecordingPublisher {
    records: Mutex<Vec<PublishedRecord>>,
    pub fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn records(&self) -> Vec<PublishedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.topic).collect()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<PublishedRecord> {
        self.records().into_iter().filter(|r| r.topic == topic).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, metadata: &EventMetadata, payload: String) -> ServiceResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Bus("broker down".to_string()));
        }
        self.records.lock().unwrap().push(PublishedRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            event_type: metadata.event_type.to_string(),
            payload: serde_json::from_str(&payload).unwrap(),
        });
        Ok(())
    }
}

// ============================================================================
// Broker consumption
// ============================================================================

/// Hands out queued records, then reports empty polls. Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    pending: Arc<Mutex<VecDeque<InboundMessage>>>,
    committed: Arc<Mutex<Vec<i64>>>,
}

impl ScriptedSource {
    pub fn with_messages(messages: Vec<InboundMessage>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(messages.into())),
            committed: Arc::default(),
        }
    }

    /// Offsets passed to `commit`, in call order.
    pub fn committed(&self) -> Vec<i64> {
        self.committed.lock().unwrap().clone()
    }

    /// Poll until `count` offsets are committed or about a second passes.
    pub async fn wait_for_commits(&self, count: usize) -> Vec<i64> {
        for _ in 0..100 {
            if self.committed.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.committed()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn poll(&self, timeout: Duration) -> ServiceResult<Option<InboundMessage>> {
        let next = self.pending.lock().unwrap().pop_front();
        if next.is_none() {
            tokio::time::sleep(timeout).await;
        }
        Ok(next)
    }

    fn commit(&self, message: &InboundMessage) -> ServiceResult<()> {
        self.committed.lock().unwrap().push(message.offset);
        Ok(())
    }
}

/// Fails with the queued errors in order, then succeeds.
#[derive(Default)]
pub struct ScriptedHandler {
    failures: Mutex<VecDeque<ServiceError>>,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    pub fn failing_with(failures: Vec<ServiceError>) -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(failures.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    async fn handle(&self, _message: &InboundMessage, _progress: &DeliveryProgress) -> ServiceResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub fn inbound(topic: &str, offset: i64, payload: &str) -> InboundMessage {
    InboundMessage {
        topic: topic.to_string(),
        key: Some("order-1".to_string()),
        payload: payload.as_bytes().to_vec(),
        partition: 0,
        offset,
    }
}

// ============================================================================
// External services
// ============================================================================

pub struct FakeWarehouse {
    pub nearest_zip: String,
    pub move_out_fails: AtomicBool,
    pub calls: Mutex<Vec<String>>,
    pub movements: Mutex<Vec<StockMovement>>,
}

impl FakeWarehouse {
    pub fn new(nearest_zip: &str) -> Self {
        Self {
            nearest_zip: nearest_zip.to_string(),
            move_out_fails: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            movements: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WarehouseClient for FakeWarehouse {
    async fn nearest_warehouse_zip(&self, _token: &str, product_id: Uuid, _zipcode: &str) -> ServiceResult<String> {
        self.calls.lock().unwrap().push(format!("nearest:{}", product_id));
        Ok(self.nearest_zip.clone())
    }

    async fn move_out(&self, _token: &str, movement: &StockMovement) -> ServiceResult<()> {
        self.calls.lock().unwrap().push("move_out".to_string());
        if self.move_out_fails.load(Ordering::SeqCst) {
            return Err(ServiceError::unavailable("warehouse", "unexpected status 500 Internal Server Error"));
        }
        self.movements.lock().unwrap().push(movement.clone());
        Ok(())
    }
}

pub struct FakeShipping {
    pub cost: Decimal,
    pub quotes: Mutex<Vec<(String, String)>>,
}

impl FakeShipping {
    pub fn new(cost: Decimal) -> Self {
        Self {
            cost,
            quotes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ShippingCostClient for FakeShipping {
    async fn shipping_cost(&self, from_zip: &str, to_zip: &str) -> ServiceResult<Decimal> {
        self.quotes
            .lock()
            .unwrap()
            .push((from_zip.to_string(), to_zip.to_string()));
        Ok(self.cost)
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    products: Mutex<HashMap<Uuid, ProductDetails>>,
    pub tokens_seen: Mutex<Vec<Option<String>>>,
}

impl FakeCatalog {
    pub fn insert(&self, product: ProductDetails) {
        self.products.lock().unwrap().insert(product.id, product);
    }
}

#[async_trait]
impl ProductCatalog for FakeCatalog {
    async fn product(&self, token: Option<&str>, product_id: Uuid) -> ServiceResult<ProductDetails> {
        self.tokens_seen.lock().unwrap().push(token.map(str::to_string));
        self.products
            .lock()
            .unwrap()
            .get(&product_id)
            .cloned()
            .ok_or_else(|| ServiceError::unavailable("product", "unexpected status 404 Not Found"))
    }
}

#[derive(Default)]
pub struct FakeTokenVerifier {
    tokens: HashMap<String, Uuid>,
}

impl FakeTokenVerifier {
    pub fn with_token(token: &str, user_id: Uuid) -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(token.to_string(), user_id);
        Self { tokens }
    }
}

#[async_trait]
impl TokenVerifier for FakeTokenVerifier {
    async fn verify(&self, token: &str) -> ServiceResult<Uuid> {
        self.tokens
            .get(token)
            .copied()
            .ok_or_else(|| ServiceError::Unauthenticated("token rejected".to_string()))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn product(id: Uuid, price: Decimal) -> ProductDetails {
    ProductDetails {
        id,
        sku: format!("SKU-{}", &id.to_string()[..8]),
        name: "Desk lamp".to_string(),
        image_url: "https://cdn.example.com/lamp.png".to_string(),
        description: "Warm white LED lamp".to_string(),
        price,
        quantity: 40,
        category_id: Some(Uuid::now_v7()),
        category_name: "Lighting".to_string(),
    }
}

pub fn place_command(user_id: Uuid, items: Vec<(Uuid, i64, Decimal)>) -> PlaceOrder {
    PlaceOrder {
        user_id,
        items: items
            .into_iter()
            .map(|(product_id, quantity, price)| PlaceOrderItem {
                product_id,
                quantity,
                price,
                note: String::new(),
            })
            .collect(),
        address: PlaceOrderAddress {
            street: "350 5th Ave".to_string(),
            city: "New York".to_string(),
            state: "NY".to_string(),
            zipcode: "10001".to_string(),
            note: String::new(),
        },
    }
}

/// Command handler wired to in-memory ports.
pub struct CommandHarness {
    pub handler: Arc<OrderCommandHandler>,
    pub store: Arc<InMemoryCommandStore>,
    pub expiry: Arc<InMemoryExpiryStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub warehouse: Arc<FakeWarehouse>,
    pub shipping: Arc<FakeShipping>,
    pub catalog: Arc<FakeCatalog>,
    pub metrics: Arc<Metrics>,
}

impl CommandHarness {
    pub fn new(verify_client_price: bool) -> Self {
        let store = Arc::new(InMemoryCommandStore::default());
        let expiry = Arc::new(InMemoryExpiryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let warehouse = Arc::new(FakeWarehouse::new("10100"));
        let shipping = Arc::new(FakeShipping::new(Decimal::new(350, 2)));
        let catalog = Arc::new(FakeCatalog::default());
        let metrics = Arc::new(Metrics::new().unwrap());

        let handler = Arc::new(OrderCommandHandler::new(
            CommandDependencies {
                store: store.clone(),
                expiry: expiry.clone(),
                publisher: publisher.clone(),
                warehouse: warehouse.clone(),
                shipping: shipping.clone(),
                catalog: catalog.clone(),
            },
            OrderSettings {
                validity: Duration::from_secs(24 * 3600),
                verify_client_price,
            },
            metrics.clone(),
        ));

        Self {
            handler,
            store,
            expiry,
            publisher,
            warehouse,
            shipping,
            catalog,
            metrics,
        }
    }

    /// Place a one-item order through the handler and return it.
    pub async fn placed_order(&self) -> Order {
        let command = place_command(Uuid::now_v7(), vec![(Uuid::now_v7(), 2, Decimal::TEN)]);
        self.handler.place_order(command, "token").await.unwrap()
    }
}
