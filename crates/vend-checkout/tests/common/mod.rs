//! Shared fixture for checkout integration tests

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use vend_checkout::{CartPort, CartSnapshot, CheckoutConfig, CheckoutEngine, SweepService};
use vend_ledger::Ledger;
use vend_methods::{
    CryptoNetwork, FeeSchedule, HostedProvider, Limits, MethodConfig, MethodKind, MethodRegistry,
    MethodStatus, PaymentMethod, VoucherVendor,
};
use vend_orders::{AdminGate, CatalogPort, NotifierPort, OrderStore};
use vend_settlement::{ChainExplorer, ProviderMap, SimulatedProvider, WebhookAdapter};
use vend_types::{
    DeliveryMode, FulfillmentStatus, LineItem, ProductId, Result, UserId,
};

pub struct StaticCart {
    pub snapshot: Mutex<CartSnapshot>,
}

impl StaticCart {
    pub fn with_subtotal(subtotal: Decimal) -> Arc<Self> {
        let items = if subtotal.is_zero() {
            Vec::new()
        } else {
            vec![LineItem {
                product_id: ProductId::new("prod-1"),
                title: "Test product".to_string(),
                quantity: 1,
                unit_price: subtotal,
                custom_fields: Vec::new(),
                delivery: DeliveryMode::Manual,
                fulfillment: FulfillmentStatus::Pending,
                delivered_content: None,
            }]
        };
        Arc::new(Self {
            snapshot: Mutex::new(CartSnapshot { items, subtotal }),
        })
    }
}

#[async_trait::async_trait]
impl CartPort for StaticCart {
    async fn get_or_create(&self, _user: &UserId) -> Result<CartSnapshot> {
        Ok(self.snapshot.lock().clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub user_messages: Mutex<Vec<(String, String)>>,
    pub admin_messages: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl NotifierPort for RecordingNotifier {
    async fn notify_user(&self, user: &UserId, message: &str) -> Result<()> {
        self.user_messages
            .lock()
            .push((user.to_string(), message.to_string()));
        Ok(())
    }

    async fn notify_admins(&self, message: &str) -> Result<()> {
        self.admin_messages.lock().push(message.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingCatalog {
    pub restocked: Mutex<Vec<(String, u32)>>,
}

#[async_trait::async_trait]
impl CatalogPort for RecordingCatalog {
    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        self.restocked
            .lock()
            .push((product_id.to_string(), quantity));
        Ok(())
    }
}

pub struct AllowAll;

#[async_trait::async_trait]
impl AdminGate for AllowAll {
    async fn is_admin(&self, _actor: &UserId) -> bool {
        true
    }
}

#[derive(Default)]
pub struct StaticExplorer {
    pub confirmations: Mutex<HashMap<String, u32>>,
}

#[async_trait::async_trait]
impl ChainExplorer for StaticExplorer {
    async fn confirmations(&self, tx_hash: &str) -> Result<u32> {
        Ok(*self.confirmations.lock().get(tx_hash).unwrap_or(&0))
    }
}

pub fn crypto_method(fee_pct: Decimal) -> PaymentMethod {
    PaymentMethod {
        name: "btc-transfer".to_string(),
        kind: MethodKind::Crypto,
        fees: FeeSchedule::percentage(fee_pct),
        limits: Limits::bounds(dec!(10), dec!(500)),
        status: MethodStatus::Active,
        config: MethodConfig::Crypto {
            networks: vec![CryptoNetwork {
                network: "BTC".to_string(),
                address: "bc1qlive".to_string(),
                enabled: true,
                required_confirmations: 3,
            }],
        },
        display_order: 1,
    }
}

pub fn voucher_method() -> PaymentMethod {
    PaymentMethod {
        name: "psc-voucher".to_string(),
        kind: MethodKind::Voucher(VoucherVendor::Paysafe),
        fees: FeeSchedule::percentage(dec!(2)),
        limits: Limits::bounds(dec!(10), dec!(500)),
        status: MethodStatus::Active,
        config: MethodConfig::Voucher {
            instructions: "Buy a code at any kiosk".to_string(),
            contact: "@support".to_string(),
        },
        display_order: 2,
    }
}

pub fn hosted_method() -> PaymentMethod {
    PaymentMethod {
        name: "card".to_string(),
        kind: MethodKind::Hosted(HostedProvider::Stripe),
        fees: FeeSchedule::percentage(dec!(2)),
        limits: Limits::bounds(dec!(10), dec!(500)),
        status: MethodStatus::Active,
        config: MethodConfig::Hosted {
            publishable_key: "pk_test_123".to_string(),
        },
        display_order: 3,
    }
}

pub struct Harness {
    pub engine: CheckoutEngine,
    pub sweep: SweepService,
    pub webhooks: WebhookAdapter,
    pub ledger: Ledger,
    pub orders: OrderStore,
    pub registry: Arc<MethodRegistry>,
    pub notifier: Arc<RecordingNotifier>,
    pub catalog: Arc<RecordingCatalog>,
    pub explorer: Arc<StaticExplorer>,
    pub stripe: Arc<SimulatedProvider>,
    pub buyer: UserId,
}

pub fn harness(cart: Arc<StaticCart>, config: CheckoutConfig) -> Harness {
    let ledger = Ledger::new();
    let registry = Arc::new(MethodRegistry::new(Arc::new(ledger.clone())));
    registry.upsert(crypto_method(dec!(2))).unwrap();
    registry.upsert(voucher_method()).unwrap();
    registry.upsert(hosted_method()).unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let catalog = Arc::new(RecordingCatalog::default());
    let orders = OrderStore::new(catalog.clone(), notifier.clone());
    let engine = CheckoutEngine::new(
        orders.clone(),
        ledger.clone(),
        registry.clone(),
        cart,
        notifier.clone(),
        Arc::new(AllowAll),
        config,
    );

    let stripe = Arc::new(SimulatedProvider::new("stripe"));
    let mut providers = ProviderMap::new();
    providers.insert(
        HostedProvider::Stripe,
        stripe.clone() as Arc<dyn vend_settlement::SettlementProvider>,
    );
    let explorer = Arc::new(StaticExplorer::default());
    let webhooks = WebhookAdapter::new(ledger.clone(), orders.clone(), registry.clone());
    let sweep = SweepService::new(
        engine.clone(),
        webhooks.clone(),
        registry.clone(),
        providers,
        explorer.clone(),
        notifier.clone(),
    );

    Harness {
        engine,
        sweep,
        webhooks,
        ledger,
        orders,
        registry,
        notifier,
        catalog,
        explorer,
        stripe,
        buyer: UserId::new("buyer-1"),
    }
}
