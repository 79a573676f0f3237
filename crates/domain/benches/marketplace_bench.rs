use std::sync::Arc;

use common::{Actor, ProductId, Role};
use criterion::{Criterion, criterion_group, criterion_main};
use document_store::InMemoryDocumentStore;
use domain::{
    CartService, Catalog, Checkout, CheckoutLine, MarketSettings, Money, NewProduct, OrderService,
    PaymentMethod, ReviewDecision, ShippingAddress, Unit,
};

fn buyer() -> Actor {
    Actor::new("bench-buyer", "bench@example.com", Role::Consumer)
}

async fn seed_product(catalog: &Catalog<InMemoryDocumentStore>, stock: u32) -> ProductId {
    let seller = Actor::new("bench-seller", "seller@example.com", Role::Seller);
    let admin = Actor::new("bench-admin", "admin@example.com", Role::Admin);
    let product = catalog
        .create_product(
            &seller,
            NewProduct {
                title: "Bench Potato".into(),
                description: String::new(),
                crop_type: "vegetable".into(),
                price_per_unit: Money::from_major(25),
                unit: Unit::Kg,
                minimum_order_quantity: 1,
                available_stock: stock,
                region: "Rangpur".into(),
                district: None,
                seller_name: "Bench Farm".into(),
            },
        )
        .await
        .unwrap();
    catalog
        .review(&admin, product.id, ReviewDecision::Approve)
        .await
        .unwrap();
    product.id
}

fn bench_cart_add(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryDocumentStore::new();
    let settings = Arc::new(MarketSettings::default());
    let catalog = Catalog::new(store.clone(), Arc::clone(&settings));
    let carts = CartService::new(store, settings);
    let product_id = rt.block_on(seed_product(&catalog, 1_000));
    let actor = buyer();

    c.bench_function("domain/cart_add_merge", |b| {
        b.iter(|| {
            rt.block_on(async {
                carts
                    .add_item(&actor, &actor.email, product_id, 1)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_checkout_and_cancel(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryDocumentStore::new();
    let settings = Arc::new(MarketSettings::default());
    let catalog = Catalog::new(store.clone(), Arc::clone(&settings));
    let orders = OrderService::new(store, settings);
    let product_id = rt.block_on(seed_product(&catalog, 100));
    let actor = buyer();

    c.bench_function("domain/checkout_then_cancel", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = orders
                    .checkout(
                        &actor,
                        Checkout {
                            items: vec![CheckoutLine {
                                product_id,
                                quantity: 2,
                            }],
                            shipping_address: ShippingAddress {
                                recipient: "Bench".into(),
                                phone: "01600000000".into(),
                                region: "Dhaka".into(),
                                district: None,
                                address: "Bench Street".into(),
                            },
                            payment_method: PaymentMethod::Cash,
                        },
                    )
                    .await
                    .unwrap();
                orders.cancel(&actor, order.id()).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_cart_add, bench_checkout_and_cancel);
criterion_main!(benches);
