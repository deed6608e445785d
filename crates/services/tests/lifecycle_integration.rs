//! Integration tests for the checkout -> order -> payment lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{DiscountId, OrderId, ProductId, SessionId, ShippingMethodId, TransactionId, UserId, VariantId};
use domain::{
    Address, CheckoutOwner, CheckoutStatus, Currency, CurrencyCode, CustomerDetails, Discount,
    DiscountKind, DiscountMethod, Ledger, Money, OrderStatus, TransactionKind, TransactionStatus,
};
use rust_decimal::Decimal;
use services::{
    AuthorizeOutcome, CheckoutService, CurrencyService, Error, ErrorKind, InMemoryCatalog,
    InMemoryGateway, InMemoryMailer, InMemoryShippingRates, NotificationPool, OrderService,
    PaymentService, ProductCatalog, ProductInfo, RateDefinition, VariantInfo,
};
use store::{
    CheckoutStore, DiscountStore, InMemoryCheckoutStore, InMemoryCurrencyStore,
    InMemoryDiscountStore, InMemoryOrderStore, InMemoryTransactionStore, OrderStore,
};

type TestCheckoutService = CheckoutService<
    InMemoryCheckoutStore,
    InMemoryDiscountStore,
    InMemoryCurrencyStore,
    InMemoryCatalog,
    InMemoryShippingRates,
>;
type TestOrderService =
    OrderService<InMemoryOrderStore, InMemoryCheckoutStore, InMemoryDiscountStore, InMemoryCatalog>;
type TestPaymentService =
    PaymentService<InMemoryOrderStore, InMemoryTransactionStore, InMemoryGateway>;

struct TestHarness {
    checkouts: TestCheckoutService,
    orders: TestOrderService,
    payments: Arc<TestPaymentService>,
    checkout_store: InMemoryCheckoutStore,
    order_store: InMemoryOrderStore,
    discount_store: InMemoryDiscountStore,
    currency_store: InMemoryCurrencyStore,
    catalog: InMemoryCatalog,
    gateway: InMemoryGateway,
    mailer: InMemoryMailer,
    pool: NotificationPool,
}

impl TestHarness {
    async fn new() -> Self {
        let checkout_store = InMemoryCheckoutStore::new();
        let order_store = InMemoryOrderStore::new();
        let transaction_store = InMemoryTransactionStore::new();
        let discount_store = InMemoryDiscountStore::new();
        let currency_store = InMemoryCurrencyStore::new();
        let catalog = InMemoryCatalog::new();
        let rates = InMemoryShippingRates::new();
        let gateway = InMemoryGateway::new();
        let mailer = InMemoryMailer::new();
        let pool = NotificationPool::start(Arc::new(mailer.clone()), 2, 64);

        let currencies = CurrencyService::new(currency_store.clone());
        let usd = Currency::new("USD", "US Dollar", "$", 2, Decimal::ONE).unwrap();
        currencies.upsert(&usd).await.unwrap();
        currencies.set_default(usd.code()).await.unwrap();

        let usd_code = usd.code().clone();
        let price = |minor: i64| Money::new(minor, usd_code.clone());

        catalog
            .put(ProductInfo {
                id: ProductId::new("P1"),
                name: "Gadget".into(),
                sku: "P1-SKU".into(),
                price: price(9999),
                weight: 300,
                stock: 100,
                active: true,
                categories: vec!["gadgets".into()],
                variants: vec![VariantInfo {
                    id: VariantId::new("V2"),
                    name: "Gadget Red".into(),
                    sku: "P1-V2".into(),
                    price: price(9999),
                    weight: 300,
                    stock: 50,
                }],
            })
            .await;
        catalog
            .put(ProductInfo {
                id: ProductId::new("P2"),
                name: "Paperback".into(),
                sku: "P2-SKU".into(),
                price: price(2500),
                weight: 100,
                stock: 50,
                active: true,
                categories: vec!["books".into()],
                variants: Vec::new(),
            })
            .await;
        catalog
            .put(ProductInfo {
                id: ProductId::new("P3"),
                name: "Last One".into(),
                sku: "P3-SKU".into(),
                price: price(5000),
                weight: 100,
                stock: 1,
                active: true,
                categories: Vec::new(),
                variants: Vec::new(),
            })
            .await;
        catalog
            .put(ProductInfo {
                id: ProductId::new("P4"),
                name: "Hardcover".into(),
                sku: "P4-SKU".into(),
                price: price(6000),
                weight: 200,
                stock: 50,
                active: true,
                categories: vec!["books".into()],
                variants: Vec::new(),
            })
            .await;

        rates
            .put(RateDefinition::flat("standard", "Standard", 500))
            .await;

        let checkouts = CheckoutService::new(
            checkout_store.clone(),
            discount_store.clone(),
            currency_store.clone(),
            catalog.clone(),
            rates.clone(),
            pool.clone(),
        );
        let orders = OrderService::new(
            order_store.clone(),
            checkout_store.clone(),
            discount_store.clone(),
            catalog.clone(),
            pool.clone(),
        )
        .with_merchant_email("orders@shop.example");
        let payments = Arc::new(PaymentService::new(
            order_store.clone(),
            transaction_store.clone(),
            gateway.clone(),
        ));

        Self {
            checkouts,
            orders,
            payments,
            checkout_store,
            order_store,
            discount_store,
            currency_store,
            catalog,
            gateway,
            mailer,
            pool,
        }
    }

    fn guest(&self, session: &str) -> CheckoutOwner {
        CheckoutOwner::Guest(SessionId::new(session))
    }

    fn address(&self) -> Address {
        Address {
            line1: "1 Main St".into(),
            line2: None,
            city: "Springfield".into(),
            region: "IL".into(),
            postal_code: "62701".into(),
            country: "US".into(),
        }
    }

    fn customer(&self) -> CustomerDetails {
        CustomerDetails {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "+1 555 0100".into(),
        }
    }

    fn discount(&self, code: &str, kind: DiscountKind, method: DiscountMethod, value: i64) -> Discount {
        let now = Utc::now();
        Discount {
            id: DiscountId::new(),
            code: code.into(),
            kind,
            method,
            value: Decimal::from(value),
            min_order_value: 0,
            max_discount_value: 0,
            product_ids: Vec::new(),
            category_ids: Vec::new(),
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            usage_limit: 0,
            current_usage: 0,
            active: true,
        }
    }

    /// Fills a checkout with two P1 units (199.98) and everything an order
    /// needs.
    async fn ready_checkout(&self, owner: &CheckoutOwner) {
        self.checkouts
            .add_item(owner, &ProductId::new("P1"), None, 2)
            .await
            .unwrap();
        self.checkouts
            .set_shipping_address(owner, self.address())
            .await
            .unwrap();
        self.checkouts
            .set_billing_address(owner, self.address())
            .await
            .unwrap();
        self.checkouts
            .set_customer_details(owner, self.customer())
            .await
            .unwrap();
    }

    /// Creates an order and authorizes payment; returns the order id and
    /// the successful Authorize transaction id.
    async fn paid_order(&self, session: &str) -> (OrderId, TransactionId) {
        let owner = self.guest(session);
        self.ready_checkout(&owner).await;
        let order = self.orders.create_from_checkout(&owner).await.unwrap();
        let txn = self
            .payments
            .process_payment(order.id(), "card", "stripe", HashMap::new())
            .await
            .unwrap();
        (order.id(), txn.id())
    }
}

// ---------------------------------------------------------------------------
// Checkout lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_or_create_returns_the_same_active_checkout() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");

    let first = h.checkouts.get_or_create(&owner).await.unwrap();
    let second = h.checkouts.get_or_create(&owner).await.unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(h.checkout_store.count().await, 1);
}

#[tokio::test]
async fn expired_checkout_is_replaced_on_access() {
    let h = TestHarness::new().await;
    let service = CheckoutService::new(
        h.checkout_store.clone(),
        h.discount_store.clone(),
        h.currency_store.clone(),
        h.catalog.clone(),
        InMemoryShippingRates::new(),
        h.pool.clone(),
    )
    .with_ttl(Duration::milliseconds(-1));
    let owner = h.guest("s1");

    let stale = service.get_or_create(&owner).await.unwrap();
    let fresh = service.get_or_create(&owner).await.unwrap();

    assert_ne!(stale.id(), fresh.id());
    let stored = h.checkout_store.get(stale.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), CheckoutStatus::Expired);
}

#[tokio::test]
async fn add_item_snapshots_price_and_merges_lines() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    let p1 = ProductId::new("P1");

    h.checkouts.add_item(&owner, &p1, None, 1).await.unwrap();
    let checkout = h.checkouts.add_item(&owner, &p1, None, 2).await.unwrap();

    assert_eq!(checkout.items().len(), 1);
    assert_eq!(checkout.items()[0].quantity, 3);
    assert_eq!(checkout.items()[0].unit_price.minor_units(), 9999);
    assert_eq!(checkout.items()[0].sku, "P1-SKU");
    assert_eq!(checkout.total_amount(), 29_997);
}

#[tokio::test]
async fn add_item_rejects_out_of_stock_quantities() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");

    let err = h
        .checkouts
        .add_item(&owner, &ProductId::new("P3"), None, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientStock { .. }));
    assert_eq!(err.kind(), ErrorKind::InsufficientStock);

    // The availability check covers the merged line quantity.
    h.checkouts
        .add_item(&owner, &ProductId::new("P3"), None, 1)
        .await
        .unwrap();
    let err = h
        .checkouts
        .add_item(&owner, &ProductId::new("P3"), None, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientStock { .. }));
}

#[tokio::test]
async fn update_item_to_zero_removes_the_line() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    let p2 = ProductId::new("P2");

    h.checkouts.add_item(&owner, &p2, None, 2).await.unwrap();
    let checkout = h.checkouts.update_item(&owner, &p2, None, 0).await.unwrap();
    assert!(!checkout.has_items());

    let err = h
        .checkouts
        .update_item(&owner, &p2, None, 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn shipping_method_resolves_cost_into_final_amount() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.checkouts
        .add_item(&owner, &ProductId::new("P2"), None, 1)
        .await
        .unwrap();

    let err = h
        .checkouts
        .set_shipping_method(&owner, &ShippingMethodId::new("standard"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShippingAddressRequired));

    h.checkouts
        .set_shipping_address(&owner, h.address())
        .await
        .unwrap();

    let options = h.checkouts.shipping_options(&owner).await.unwrap();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].method_id, ShippingMethodId::new("standard"));
    assert_eq!(options[0].cost, 500);

    let checkout = h
        .checkouts
        .set_shipping_method(&owner, &ShippingMethodId::new("standard"))
        .await
        .unwrap();

    assert_eq!(checkout.shipping_cost(), 500);
    assert_eq!(checkout.final_amount(), 3000);
}

#[tokio::test]
async fn currency_service_manages_the_default_and_converts() {
    let h = TestHarness::new().await;
    let currencies = CurrencyService::new(h.currency_store.clone());

    let eur = Currency::new("EUR", "Euro", "€", 2, Decimal::new(9, 1)).unwrap();
    currencies.upsert(&eur).await.unwrap();

    // 10.00 USD at rate 0.9 -> 9.00 EUR.
    let converted = currencies
        .convert(
            &Money::new(1000, CurrencyCode::new("USD")),
            &CurrencyCode::new("EUR"),
        )
        .await
        .unwrap();
    assert_eq!(converted.minor_units(), 900);

    // Switching the default clears the old one and pins the new rate.
    currencies.set_default(eur.code()).await.unwrap();
    let defaults: Vec<_> = currencies
        .list()
        .await
        .unwrap()
        .into_iter()
        .filter(Currency::is_default)
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].code().as_str(), "EUR");

    let err = currencies.delete(eur.code()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = currencies
        .convert(
            &Money::new(1000, CurrencyCode::new("USD")),
            &CurrencyCode::new("GBP"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CurrencyNotFound(_)));
}

#[tokio::test]
async fn basket_percentage_discount_applies_to_totals() {
    // Scenario: BASKET10 (10%) over lines totaling 110.00.
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.checkouts
        .add_item(&owner, &ProductId::new("P4"), None, 1)
        .await
        .unwrap();
    h.checkouts
        .add_item(&owner, &ProductId::new("P2"), None, 2)
        .await
        .unwrap();

    let discount = h.discount("BASKET10", DiscountKind::Basket, DiscountMethod::Percentage, 10);
    h.discount_store.upsert(&discount).await.unwrap();

    let checkout = h.checkouts.apply_discount(&owner, "BASKET10").await.unwrap();
    assert_eq!(checkout.total_amount(), 11_000);
    assert_eq!(checkout.discount_amount(), 1100);
    assert_eq!(checkout.final_amount(), 9900);

    let checkout = h.checkouts.remove_discount(&owner).await.unwrap();
    assert_eq!(checkout.discount_amount(), 0);
    assert_eq!(checkout.final_amount(), 11_000);
}

#[tokio::test]
async fn product_discount_matches_by_category_through_the_catalog() {
    // 25% off the books category, capped at 30.00: base is P4 + P2 lines
    // (85.00), raw 21.25, no cap hit; P1 is excluded from the base.
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.checkouts
        .add_item(&owner, &ProductId::new("P4"), None, 1)
        .await
        .unwrap();
    h.checkouts
        .add_item(&owner, &ProductId::new("P2"), None, 1)
        .await
        .unwrap();
    h.checkouts
        .add_item(&owner, &ProductId::new("P1"), None, 1)
        .await
        .unwrap();

    let mut discount =
        h.discount("BOOKS25", DiscountKind::Product, DiscountMethod::Percentage, 25);
    discount.category_ids = vec!["books".into()];
    discount.max_discount_value = 3000;
    h.discount_store.upsert(&discount).await.unwrap();

    let checkout = h.checkouts.apply_discount(&owner, "BOOKS25").await.unwrap();
    assert_eq!(checkout.discount_amount(), 2125);
    assert_eq!(checkout.final_amount(), 8500 + 9999 - 2125);
}

#[tokio::test]
async fn unknown_discount_code_is_not_found() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.checkouts
        .add_item(&owner, &ProductId::new("P2"), None, 1)
        .await
        .unwrap();

    let err = h.checkouts.apply_discount(&owner, "NOPE").await.unwrap_err();
    assert!(matches!(err, Error::DiscountNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn guest_cart_merges_into_user_cart() {
    // Overlapping (P1, V2) line quantities sum; the rest survive.
    let h = TestHarness::new().await;
    let user = UserId::new();
    let user_owner = CheckoutOwner::User(user);
    let p1 = ProductId::new("P1");
    let v2 = VariantId::new("V2");

    h.checkouts
        .add_item(&user_owner, &p1, Some(&v2), 2)
        .await
        .unwrap();
    h.checkouts
        .add_item(&user_owner, &ProductId::new("P2"), None, 1)
        .await
        .unwrap();

    let session = SessionId::new("guest-7");
    let guest_owner = CheckoutOwner::Guest(session.clone());
    h.checkouts
        .add_item(&guest_owner, &p1, Some(&v2), 3)
        .await
        .unwrap();
    h.checkouts
        .add_item(&guest_owner, &ProductId::new("P4"), None, 1)
        .await
        .unwrap();

    let merged = h
        .checkouts
        .convert_guest_to_user(&session, user)
        .await
        .unwrap();

    assert_eq!(merged.owner(), &user_owner);
    assert_eq!(merged.items().len(), 3);
    assert_eq!(merged.get_item(&p1, Some(&v2)).unwrap().quantity, 5);
    assert!(merged.get_item(&ProductId::new("P2"), None).is_some());
    assert!(merged.get_item(&ProductId::new("P4"), None).is_some());

    // The guest checkout is gone.
    assert!(
        h.checkout_store
            .find_active_by_owner(&guest_owner)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn guest_cart_rekeys_when_user_has_none() {
    let h = TestHarness::new().await;
    let session = SessionId::new("guest-8");
    let guest_owner = CheckoutOwner::Guest(session.clone());
    h.checkouts
        .add_item(&guest_owner, &ProductId::new("P2"), None, 1)
        .await
        .unwrap();

    let user = UserId::new();
    let converted = h
        .checkouts
        .convert_guest_to_user(&session, user)
        .await
        .unwrap();

    assert_eq!(converted.owner(), &CheckoutOwner::User(user));
    assert_eq!(converted.items().len(), 1);
    assert_eq!(h.checkout_store.count().await, 1);
}

#[tokio::test]
async fn abandoned_checkout_queues_a_recovery_email() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.checkouts
        .add_item(&owner, &ProductId::new("P2"), None, 1)
        .await
        .unwrap();
    h.checkouts
        .set_customer_details(&owner, h.customer())
        .await
        .unwrap();

    h.checkouts.mark_abandoned(&owner).await.unwrap();
    h.pool.drain().await;

    let sent = h.mailer.sent();
    assert!(
        sent.iter()
            .any(|(kind, to)| kind == "checkout_recovery" && to == "ada@example.com")
    );
}

// ---------------------------------------------------------------------------
// Order creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn order_creation_freezes_the_checkout_and_decrements_stock() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.ready_checkout(&owner).await;

    let order = h.orders.create_from_checkout(&owner).await.unwrap();

    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.final_amount(), 19_998);
    assert_eq!(order.items().len(), 1);

    // Stock went down, the checkout completed with a back-reference, and
    // the owner slot is free again.
    let p1 = ProductId::new("P1");
    assert_eq!(h.catalog.stock_of(&p1, None).await, Some(98));
    let stored = h
        .checkout_store
        .find_active_by_owner(&owner)
        .await
        .unwrap();
    assert!(stored.is_none());

    h.pool.drain().await;
    let sent = h.mailer.sent();
    assert!(
        sent.iter()
            .any(|(kind, to)| kind == "order_confirmation" && to == "ada@example.com")
    );
    assert!(
        sent.iter()
            .any(|(kind, to)| kind == "order_notification" && to == "orders@shop.example")
    );
}

#[tokio::test]
async fn order_creation_requires_items_address_and_customer() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");

    h.checkouts.get_or_create(&owner).await.unwrap();
    let err = h.orders.create_from_checkout(&owner).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    h.checkouts
        .add_item(&owner, &ProductId::new("P2"), None, 1)
        .await
        .unwrap();
    let err = h.orders.create_from_checkout(&owner).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    h.checkouts
        .set_shipping_address(&owner, h.address())
        .await
        .unwrap();
    h.checkouts
        .set_billing_address(&owner, h.address())
        .await
        .unwrap();
    h.checkouts
        .set_customer_details(&owner, h.customer())
        .await
        .unwrap();
    h.orders.create_from_checkout(&owner).await.unwrap();
}

#[tokio::test]
async fn order_creation_consumes_a_discount_usage_slot() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.ready_checkout(&owner).await;

    let mut discount =
        h.discount("BASKET10", DiscountKind::Basket, DiscountMethod::Percentage, 10);
    discount.usage_limit = 5;
    h.discount_store.upsert(&discount).await.unwrap();
    h.checkouts.apply_discount(&owner, "BASKET10").await.unwrap();

    let order = h.orders.create_from_checkout(&owner).await.unwrap();
    assert_eq!(order.discount_amount(), 2000);
    assert_eq!(order.final_amount(), 17_998);

    let stored = h.discount_store.get(discount.id).await.unwrap().unwrap();
    assert_eq!(stored.current_usage, 1);
}

#[tokio::test]
async fn failed_stock_decrement_rolls_everything_back() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    let p1 = ProductId::new("P1");
    let p3 = ProductId::new("P3");

    h.checkouts.add_item(&owner, &p1, None, 2).await.unwrap();
    h.checkouts.add_item(&owner, &p3, None, 1).await.unwrap();
    h.checkouts
        .set_shipping_address(&owner, h.address())
        .await
        .unwrap();
    h.checkouts
        .set_billing_address(&owner, h.address())
        .await
        .unwrap();
    h.checkouts
        .set_customer_details(&owner, h.customer())
        .await
        .unwrap();

    let discount = h.discount("BASKET10", DiscountKind::Basket, DiscountMethod::Percentage, 10);
    h.discount_store.upsert(&discount).await.unwrap();
    h.checkouts.apply_discount(&owner, "BASKET10").await.unwrap();

    // A competing sale takes the last P3 unit between basket and submit.
    h.catalog.adjust_stock(&p3, None, -1).await.unwrap();

    let err = h.orders.create_from_checkout(&owner).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientStock);

    // P1's decrement was compensated, the usage slot returned, no order
    // was persisted, and the checkout is still Active.
    assert_eq!(h.catalog.stock_of(&p1, None).await, Some(100));
    let stored = h.discount_store.get(discount.id).await.unwrap().unwrap();
    assert_eq!(stored.current_usage, 0);
    assert_eq!(h.order_store.count().await, 0);
    assert!(
        h.checkout_store
            .find_active_by_owner(&owner)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn fulfilment_status_updates_are_validated() {
    let h = TestHarness::new().await;
    let (order_id, _) = h.paid_order("s1").await;

    let err = h
        .orders
        .update_status(order_id, OrderStatus::Delivered)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    h.orders
        .update_status(order_id, OrderStatus::Shipped)
        .await
        .unwrap();
    let order = h
        .orders
        .update_status(order_id, OrderStatus::Delivered)
        .await
        .unwrap();
    assert!(order.status().is_terminal());
}

#[tokio::test]
async fn order_access_is_ownership_checked() {
    let h = TestHarness::new().await;
    let user = UserId::new();
    let owner = CheckoutOwner::User(user);
    h.checkouts
        .add_item(&owner, &ProductId::new("P2"), None, 1)
        .await
        .unwrap();
    h.checkouts
        .set_shipping_address(&owner, h.address())
        .await
        .unwrap();
    h.checkouts
        .set_billing_address(&owner, h.address())
        .await
        .unwrap();
    h.checkouts
        .set_customer_details(&owner, h.customer())
        .await
        .unwrap();
    let order = h.orders.create_from_checkout(&owner).await.unwrap();

    h.orders.get_for_user(order.id(), user).await.unwrap();
    let err = h
        .orders
        .get_for_user(order.id(), UserId::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let listed = h.orders.list_for_user(user).await.unwrap();
    assert_eq!(listed.len(), 1);
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_authorization_marks_the_order_paid() {
    let h = TestHarness::new().await;
    let (order_id, _) = h.paid_order("s1").await;

    let order = h.order_store.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    assert_eq!(order.payment_provider(), Some("stripe"));
    assert_eq!(order.payment_method(), Some("card"));
    assert!(order.payment_id().is_some());

    let ledger = h.payments.ledger(order_id).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].kind(), TransactionKind::Authorize);
    assert_eq!(ledger[0].status(), TransactionStatus::Successful);

    let err = h
        .payments
        .process_payment(order_id, "card", "stripe", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyPaid(_)));
}

#[tokio::test]
async fn disabled_provider_is_rejected_before_the_gateway() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.ready_checkout(&owner).await;
    let order = h.orders.create_from_checkout(&owner).await.unwrap();

    h.gateway.set_provider_enabled("stripe", false).await;
    let err = h
        .payments
        .process_payment(order.id(), "card", "stripe", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProviderUnavailable(_)));

    // Nothing was recorded: the gateway was never called.
    assert!(h.payments.ledger(order.id()).await.unwrap().is_empty());
}

#[tokio::test]
async fn declined_authorization_is_recorded_and_leaves_the_order() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.ready_checkout(&owner).await;
    let order = h.orders.create_from_checkout(&owner).await.unwrap();

    h.gateway
        .set_authorize_outcome(AuthorizeOutcome::Decline("card declined".into()))
        .await;
    let err = h
        .payments
        .process_payment(order.id(), "card", "stripe", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::GatewayRejected(_)));
    assert_eq!(err.kind(), ErrorKind::ExternalFailure);

    let order = h.order_store.get(order.id()).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);

    let ledger = h.payments.ledger(order.id()).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status(), TransactionStatus::Failed);
    assert_eq!(
        ledger[0].metadata().get("error").map(String::as_str),
        Some("card declined")
    );
}

#[tokio::test]
async fn gateway_transport_error_is_a_failure_outcome() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.ready_checkout(&owner).await;
    let order = h.orders.create_from_checkout(&owner).await.unwrap();

    h.gateway
        .set_authorize_outcome(AuthorizeOutcome::TransportError)
        .await;
    let err = h
        .payments
        .process_payment(order.id(), "card", "stripe", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::GatewayFailure(_)));

    // The failure is still durably part of the audit trail.
    let ledger = h.payments.ledger(order.id()).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].kind(), TransactionKind::Authorize);
    assert_eq!(ledger[0].status(), TransactionStatus::Failed);
}

#[tokio::test]
async fn requires_action_flow_reaches_paid_after_confirmation() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.ready_checkout(&owner).await;
    let order = h.orders.create_from_checkout(&owner).await.unwrap();

    h.gateway
        .set_authorize_outcome(AuthorizeOutcome::RequiresAction(
            "https://gw.example/3ds".into(),
        ))
        .await;
    let txn = h
        .payments
        .process_payment(order.id(), "card", "stripe", HashMap::new())
        .await
        .unwrap();
    assert_eq!(txn.status(), TransactionStatus::Pending);

    let stored = h.order_store.get(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::PendingAction);
    assert_eq!(stored.action_url(), Some("https://gw.example/3ds"));

    let confirmed = h.payments.confirm_payment(order.id()).await.unwrap();
    assert_eq!(confirmed.status(), OrderStatus::Paid);
    assert!(confirmed.action_url().is_none());

    let ledger = h.payments.ledger(order.id()).await.unwrap();
    assert_eq!(ledger[0].status(), TransactionStatus::Successful);
}

#[tokio::test]
async fn pending_action_order_can_be_cancelled() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.ready_checkout(&owner).await;
    let order = h.orders.create_from_checkout(&owner).await.unwrap();

    h.gateway
        .set_authorize_outcome(AuthorizeOutcome::RequiresAction(
            "https://gw.example/3ds".into(),
        ))
        .await;
    let pending = h
        .payments
        .process_payment(order.id(), "card", "stripe", HashMap::new())
        .await
        .unwrap();

    let cancel = h.payments.cancel(pending.id()).await.unwrap();
    assert_eq!(cancel.kind(), TransactionKind::Cancel);
    assert_eq!(cancel.status(), TransactionStatus::Successful);

    let stored = h.order_store.get(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Cancelled);

    // The pending authorization was voided in place.
    let ledger = h.payments.ledger(order.id()).await.unwrap();
    assert_eq!(ledger[0].status(), TransactionStatus::Failed);
    assert_eq!(
        ledger[0].metadata().get("voided").map(String::as_str),
        Some("true")
    );
    assert_eq!(h.gateway.voids().await.len(), 1);
}

#[tokio::test]
async fn cancel_requires_a_pending_action_order() {
    let h = TestHarness::new().await;
    let (_, auth_txn) = h.paid_order("s1").await;

    let err = h.payments.cancel(auth_txn).await.unwrap_err();
    assert!(matches!(err, Error::CancelNotAllowed { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn full_capture_records_the_remaining_amount() {
    // Scenario: capture 199.98 of a 199.98 order.
    let h = TestHarness::new().await;
    let (order_id, auth_txn) = h.paid_order("s1").await;

    let capture = h.payments.capture(auth_txn, 19_998).await.unwrap();
    assert_eq!(capture.kind(), TransactionKind::Capture);
    assert_eq!(
        capture.metadata().get("full_capture").map(String::as_str),
        Some("true")
    );
    assert_eq!(
        capture.metadata().get("remaining_amount").map(String::as_str),
        Some("0")
    );

    let order = h.order_store.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Captured);
    assert_eq!(h.gateway.captures().await, vec![(
        order.payment_id().unwrap().to_string(),
        19_998
    )]);
}

#[tokio::test]
async fn partial_capture_is_flagged() {
    let h = TestHarness::new().await;
    let (order_id, auth_txn) = h.paid_order("s1").await;

    let capture = h.payments.capture(auth_txn, 10_000).await.unwrap();
    assert_eq!(
        capture.metadata().get("full_capture").map(String::as_str),
        Some("false")
    );
    assert_eq!(
        capture.metadata().get("remaining_amount").map(String::as_str),
        Some("9998")
    );

    let order = h.order_store.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Captured);
}

#[tokio::test]
async fn capture_validates_state_and_amount() {
    let h = TestHarness::new().await;
    let owner = h.guest("s1");
    h.ready_checkout(&owner).await;
    let order = h.orders.create_from_checkout(&owner).await.unwrap();

    // Authorize fails first, leaving the order Pending.
    h.gateway
        .set_authorize_outcome(AuthorizeOutcome::Decline("no".into()))
        .await;
    let _ = h
        .payments
        .process_payment(order.id(), "card", "stripe", HashMap::new())
        .await;
    let failed_auth = h.payments.ledger(order.id()).await.unwrap()[0].id();

    let err = h.payments.capture(failed_auth, 1000).await.unwrap_err();
    assert!(matches!(err, Error::CaptureNotAllowed { .. }));

    // Now pay and probe the amount bounds.
    h.gateway.set_authorize_outcome(AuthorizeOutcome::Success).await;
    let auth = h
        .payments
        .process_payment(order.id(), "card", "stripe", HashMap::new())
        .await
        .unwrap();

    let err = h.payments.capture(auth.id(), 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = h.payments.capture(auth.id(), 20_000).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn failed_capture_leaves_the_order_paid() {
    let h = TestHarness::new().await;
    let (order_id, auth_txn) = h.paid_order("s1").await;

    h.gateway.set_fail_on_capture(true).await;
    let err = h.payments.capture(auth_txn, 19_998).await.unwrap_err();
    assert!(matches!(err, Error::GatewayFailure(_)));

    let order = h.order_store.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    let ledger = h.payments.ledger(order_id).await.unwrap();
    assert_eq!(ledger.last().unwrap().status(), TransactionStatus::Failed);

    // The retry succeeds once the gateway recovers.
    h.gateway.set_fail_on_capture(false).await;
    h.payments.capture(auth_txn, 19_998).await.unwrap();
    let order = h.order_store.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Captured);
}

#[tokio::test]
async fn refund_running_total_is_enforced() {
    // Scenario: refund 50.00 then attempt 160.00 on a 199.98 order.
    let h = TestHarness::new().await;
    let (order_id, auth_txn) = h.paid_order("s1").await;

    let refund = h.payments.refund(auth_txn, 5000).await.unwrap();
    assert_eq!(
        refund.metadata().get("cumulative_refunded").map(String::as_str),
        Some("5000")
    );
    assert_eq!(
        refund.metadata().get("remaining_available").map(String::as_str),
        Some("14998")
    );

    // Partial refund leaves the order Paid.
    let order = h.order_store.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);

    let err = h.payments.refund(auth_txn, 16_000).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Payment(domain::PaymentError::RefundExceedsAvailable { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // The rejected refund is part of the audit trail.
    let ledger = h.payments.ledger(order_id).await.unwrap();
    let failed: Vec<_> = ledger
        .iter()
        .filter(|t| t.kind() == TransactionKind::Refund && t.status() == TransactionStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);

    // Only the successful refund reached the gateway.
    assert_eq!(h.gateway.refunds().await.len(), 1);
}

#[tokio::test]
async fn cumulative_refunds_drive_the_order_to_refunded() {
    let h = TestHarness::new().await;
    let (order_id, auth_txn) = h.paid_order("s1").await;

    h.payments.refund(auth_txn, 10_000).await.unwrap();
    h.payments.refund(auth_txn, 9998).await.unwrap();

    let order = h.order_store.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Refunded);
    assert!(order.status().is_terminal());

    let err = h.payments.refund(auth_txn, 1).await.unwrap_err();
    assert!(matches!(err, Error::RefundNotAllowed { .. }));
}

#[tokio::test]
async fn captured_orders_remain_refundable() {
    let h = TestHarness::new().await;
    let (order_id, auth_txn) = h.paid_order("s1").await;

    h.payments.capture(auth_txn, 19_998).await.unwrap();
    h.payments.refund(auth_txn, 19_998).await.unwrap();

    let order = h.order_store.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Refunded);
}

#[tokio::test]
async fn concurrent_refunds_never_exceed_the_final_amount() {
    let h = TestHarness::new().await;
    let (order_id, auth_txn) = h.paid_order("s1").await;

    // Eight concurrent 50.00 refunds against 199.98: exactly three fit.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let payments = Arc::clone(&h.payments);
        handles.push(tokio::spawn(
            async move { payments.refund(auth_txn, 5000).await },
        ));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 3);

    let rows = h.payments.ledger(order_id).await.unwrap();
    let ledger = Ledger::new(&rows);
    assert_eq!(ledger.refunded_total(), 15_000);
    assert!(ledger.refunded_total() <= 19_998);
}

#[tokio::test]
async fn concurrent_capture_and_refund_respect_the_invariants() {
    let h = TestHarness::new().await;
    let (order_id, auth_txn) = h.paid_order("s1").await;

    let capture = {
        let payments = Arc::clone(&h.payments);
        tokio::spawn(async move { payments.capture(auth_txn, 19_998).await })
    };
    let refund = {
        let payments = Arc::clone(&h.payments);
        tokio::spawn(async move { payments.refund(auth_txn, 19_998).await })
    };
    let _ = capture.await.unwrap();
    let _ = refund.await.unwrap();

    let rows = h.payments.ledger(order_id).await.unwrap();
    let ledger = Ledger::new(&rows);
    assert!(ledger.captured_total() <= 19_998);
    assert!(ledger.refunded_total() <= 19_998);
}
