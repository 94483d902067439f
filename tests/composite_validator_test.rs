mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use stockpilot_api::errors::ServiceError;
use uuid::Uuid;

#[tokio::test]
async fn report_covers_every_component() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let kit = app
        .seed_product_with(company, "KIT-1", dec!(50), false, true)
        .await;
    let bolt = app.seed_product(company, "BOLT", dec!(1)).await;
    let panel = app.seed_product(company, "PANEL", dec!(10)).await;
    app.seed_component(kit.id, bolt.id, dec!(4), true).await;
    app.seed_component(kit.id, panel.id, dec!(1), true).await;

    app.add_stock(wh.id, bolt.id, dec!(10)).await;
    app.add_stock(wh.id, panel.id, dec!(5)).await;

    let report = app
        .services()
        .composite_validator
        .validate(kit.id, wh.id, dec!(2))
        .await
        .expect("validate");

    assert_eq!(report.components.len(), 2);
    // Bolts limit the build: 10 / 4 = 2 kits, panels allow 5.
    assert_eq!(report.buildable_quantity, dec!(2));
    assert!(report.can_assemble);

    let bolts = report
        .components
        .iter()
        .find(|c| c.component_id == bolt.id)
        .expect("bolt line");
    assert_eq!(bolts.required, dec!(8));
    assert_eq!(bolts.available, dec!(10));
    assert!(bolts.sufficient);
}

#[tokio::test]
async fn mandatory_shortfall_blocks_assembly() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let kit = app
        .seed_product_with(company, "KIT-1", dec!(50), false, true)
        .await;
    let bolt = app.seed_product(company, "BOLT", dec!(1)).await;
    let manual = app.seed_product(company, "MANUAL", dec!(0.5)).await;
    app.seed_component(kit.id, bolt.id, dec!(4), true).await;
    app.seed_component(kit.id, manual.id, dec!(1), false).await;

    app.add_stock(wh.id, bolt.id, dec!(3)).await;
    // No manuals in stock at all; optional, so it must not block.

    let report = app
        .services()
        .composite_validator
        .validate(kit.id, wh.id, dec!(1))
        .await
        .expect("validate");
    assert!(!report.can_assemble);
    assert_eq!(report.buildable_quantity, dec!(0));

    let err = app
        .services()
        .composite_validator
        .ensure_assemblable(kit.id, wh.id, dec!(1))
        .await
        .expect_err("shortfall must raise");
    match err {
        ServiceError::CompositeShortfall(shortfalls) => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].component_id, bolt.id);
            assert_eq!(shortfalls[0].shortfall, dec!(1));
        }
        other => panic!("expected CompositeShortfall, got {other:?}"),
    }
}

#[tokio::test]
async fn adding_stock_never_shrinks_buildable_quantity() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let kit = app
        .seed_product_with(company, "KIT-1", dec!(50), false, true)
        .await;
    let bolt = app.seed_product(company, "BOLT", dec!(1)).await;
    app.seed_component(kit.id, bolt.id, dec!(3), true).await;

    let mut previous = dec!(0);
    for _ in 0..4 {
        app.add_stock(wh.id, bolt.id, dec!(2)).await;
        let report = app
            .services()
            .composite_validator
            .validate(kit.id, wh.id, dec!(1))
            .await
            .expect("validate");
        assert!(report.buildable_quantity >= previous);
        previous = report.buildable_quantity;
    }
    assert_eq!(previous, dec!(2));
}

#[tokio::test]
async fn nested_composites_derive_from_leaf_stock() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let bundle = app
        .seed_product_with(company, "BUNDLE", dec!(120), false, true)
        .await;
    let kit = app
        .seed_product_with(company, "KIT-1", dec!(50), false, true)
        .await;
    let bolt = app.seed_product(company, "BOLT", dec!(1)).await;

    // bundle = 2 x kit, kit = 4 x bolt
    app.seed_component(bundle.id, kit.id, dec!(2), true).await;
    app.seed_component(kit.id, bolt.id, dec!(4), true).await;
    app.add_stock(wh.id, bolt.id, dec!(24)).await;

    let report = app
        .services()
        .composite_validator
        .validate(bundle.id, wh.id, dec!(1))
        .await
        .expect("validate");

    // 24 bolts -> 6 kits -> 3 bundles.
    assert_eq!(report.buildable_quantity, dec!(3));
}

#[tokio::test]
async fn cyclic_definition_is_rejected() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let a = app
        .seed_product_with(company, "KIT-A", dec!(10), false, true)
        .await;
    let b = app
        .seed_product_with(company, "KIT-B", dec!(10), false, true)
        .await;

    // a -> b -> a
    app.seed_component(a.id, b.id, dec!(1), true).await;
    app.seed_component(b.id, a.id, dec!(1), true).await;

    let err = app
        .services()
        .composite_validator
        .validate(a.id, wh.id, dec!(1))
        .await
        .expect_err("cycle must be rejected");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn zero_required_quantity_is_rejected() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let kit = app
        .seed_product_with(company, "KIT-1", dec!(50), false, true)
        .await;
    let bolt = app.seed_product(company, "BOLT", dec!(1)).await;
    app.seed_component(kit.id, bolt.id, dec!(0), true).await;
    app.add_stock(wh.id, bolt.id, dec!(10)).await;

    let err = app
        .services()
        .composite_validator
        .validate(kit.id, wh.id, dec!(1))
        .await
        .expect_err("zero per-unit requirement must be rejected");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn non_composite_product_is_rejected() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let plain = app.seed_product(company, "PLAIN", dec!(5)).await;

    let err = app
        .services()
        .composite_validator
        .validate(plain.id, wh.id, dec!(1))
        .await
        .expect_err("plain product is not a composite");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
