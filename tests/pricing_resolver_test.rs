mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use stockpilot_api::errors::ServiceError;
use stockpilot_api::services::pricing::PriceSource;
use uuid::Uuid;

#[tokio::test]
async fn base_price_applies_when_no_tier_matches() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let product = app.seed_product(company, "SKU-1", dec!(9.99)).await;
    app.seed_tier(product.id, dec!(10), Some(dec!(49)), dec!(8.50))
        .await;

    let resolution = app
        .services()
        .pricing
        .resolve(product.id, dec!(5))
        .await
        .expect("resolve");

    assert_eq!(resolution.source, PriceSource::BasePrice);
    assert_eq!(resolution.unit_price, dec!(9.99));
    assert_eq!(resolution.total, dec!(49.95));
    assert!(resolution.tier_id.is_none());
}

#[tokio::test]
async fn tier_boundaries_are_inclusive() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let product = app.seed_product(company, "SKU-1", dec!(9.99)).await;
    let tier = app
        .seed_tier(product.id, dec!(10), Some(dec!(49)), dec!(8.50))
        .await;

    for qty in [dec!(10), dec!(25), dec!(49)] {
        let resolution = app
            .services()
            .pricing
            .resolve(product.id, qty)
            .await
            .expect("resolve");
        assert_eq!(resolution.source, PriceSource::Tier);
        assert_eq!(resolution.tier_id, Some(tier.id));
        assert_eq!(resolution.unit_price, dec!(8.50));
    }
}

#[tokio::test]
async fn unbounded_tier_covers_any_larger_quantity() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let product = app.seed_product(company, "SKU-1", dec!(9.99)).await;
    app.seed_tier(product.id, dec!(10), Some(dec!(49)), dec!(8.50))
        .await;
    app.seed_tier(product.id, dec!(50), None, dec!(7.00)).await;

    let resolution = app
        .services()
        .pricing
        .resolve(product.id, dec!(10_000))
        .await
        .expect("resolve");
    assert_eq!(resolution.unit_price, dec!(7.00));
    assert_eq!(resolution.total, dec!(70000.00));
}

#[tokio::test]
async fn fractional_quantities_resolve_against_tiers() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let product = app.seed_product(company, "SKU-KG", dec!(3.00)).await;
    app.seed_tier(product.id, dec!(2.5), None, dec!(2.40)).await;

    let below = app
        .services()
        .pricing
        .resolve(product.id, dec!(2.4))
        .await
        .expect("resolve");
    assert_eq!(below.source, PriceSource::BasePrice);

    let inside = app
        .services()
        .pricing
        .resolve(product.id, dec!(2.5))
        .await
        .expect("resolve");
    assert_eq!(inside.source, PriceSource::Tier);
    assert_eq!(inside.unit_price, dec!(2.40));
}

#[tokio::test]
async fn unknown_product_and_bad_quantity_are_rejected() {
    let app = TestApp::new().await;

    let err = app
        .services()
        .pricing
        .resolve(Uuid::new_v4(), dec!(1))
        .await
        .expect_err("missing product");
    assert!(matches!(err, ServiceError::NotFound(_)));

    let company = Uuid::new_v4();
    let product = app.seed_product(company, "SKU-1", dec!(9.99)).await;
    let err = app
        .services()
        .pricing
        .resolve(product.id, dec!(0))
        .await
        .expect_err("zero quantity");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
