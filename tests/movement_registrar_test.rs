mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use stockpilot_api::entities::stock_movement::{MovementOrigin, MovementType};
use stockpilot_api::errors::ServiceError;
use stockpilot_api::events::EventSender;
use stockpilot_api::services::movement_registrar::{MovementRegistrar, NewMovement};
use uuid::Uuid;

fn movement(
    warehouse_id: Uuid,
    product_id: Uuid,
    movement_type: MovementType,
    quantity: rust_decimal::Decimal,
) -> NewMovement {
    NewMovement {
        warehouse_id,
        product_id,
        movement_type,
        origin: MovementOrigin::Manual,
        quantity,
        counterparty_id: None,
        reference: None,
        created_by: None,
        new_cost_price: None,
        new_sale_price: None,
    }
}

#[tokio::test]
async fn inbound_movement_creates_record_and_increments() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let product = app.seed_product(company, "SKU-1", dec!(10)).await;

    let m = app
        .services()
        .movement_registrar
        .register(movement(wh.id, product.id, MovementType::Inbound, dec!(7)))
        .await
        .expect("inbound should succeed");

    assert_eq!(m.previous_quantity, dec!(0));
    assert_eq!(m.new_quantity, dec!(7));
    assert_eq!(app.quantity(wh.id, product.id).await, dec!(7));
}

#[tokio::test]
async fn outbound_movement_decrements() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let product = app.seed_product(company, "SKU-1", dec!(10)).await;
    app.add_stock(wh.id, product.id, dec!(10)).await;

    let m = app
        .services()
        .movement_registrar
        .register(movement(wh.id, product.id, MovementType::Outbound, dec!(4)))
        .await
        .expect("outbound should succeed");

    assert_eq!(m.previous_quantity, dec!(10));
    assert_eq!(m.new_quantity, dec!(6));
    assert_eq!(app.quantity(wh.id, product.id).await, dec!(6));
}

#[tokio::test]
async fn outbound_beyond_stock_is_rejected_atomically() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let product = app.seed_product(company, "SKU-1", dec!(10)).await;
    app.add_stock(wh.id, product.id, dec!(3)).await;

    let err = app
        .services()
        .movement_registrar
        .register(movement(wh.id, product.id, MovementType::Outbound, dec!(5)))
        .await
        .expect_err("deduction beyond stock must fail");

    match err {
        ServiceError::InsufficientStock(shortfalls) => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].product_id, product.id);
            assert_eq!(shortfalls[0].available, dec!(3));
            assert_eq!(shortfalls[0].requested, dec!(5));
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // Quantity untouched and no movement row written.
    assert_eq!(app.quantity(wh.id, product.id).await, dec!(3));
    let (movements, total) = app
        .services()
        .stock_ledger
        .movements(wh.id, product.id, 1, 50)
        .await
        .expect("movement log");
    assert_eq!(total, 1, "only the seed movement should exist");
    assert_eq!(movements[0].origin, "adjustment");
}

#[tokio::test]
async fn zero_and_negative_quantities_are_rejected() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let product = app.seed_product(company, "SKU-1", dec!(10)).await;

    for qty in [dec!(0), dec!(-2)] {
        let err = app
            .services()
            .movement_registrar
            .register(movement(wh.id, product.id, MovementType::Inbound, qty))
            .await
            .expect_err("non-positive quantity must fail");
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}

#[tokio::test]
async fn movement_log_reconciles_with_stock_record() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let product = app.seed_product(company, "SKU-1", dec!(10)).await;

    for (mt, qty) in [
        (MovementType::Inbound, dec!(10)),
        (MovementType::Outbound, dec!(3)),
        (MovementType::Inbound, dec!(5.5)),
        (MovementType::Outbound, dec!(0.5)),
    ] {
        app.services()
            .movement_registrar
            .register(movement(wh.id, product.id, mt, qty))
            .await
            .expect("movement");
    }

    let (movements, total) = app
        .services()
        .stock_ledger
        .movements(wh.id, product.id, 1, 50)
        .await
        .expect("movement log");
    assert_eq!(total, 4);

    // Signed sum of the log equals the record quantity.
    let signed_sum: rust_decimal::Decimal = movements
        .iter()
        .map(|m| match m.movement_type.as_str() {
            "inbound" => m.quantity,
            _ => -m.quantity,
        })
        .sum();
    assert_eq!(signed_sum, dec!(12));
    assert_eq!(app.quantity(wh.id, product.id).await, dec!(12));

    // Every entry's bookkeeping is internally consistent.
    for m in &movements {
        let delta = match m.movement_type.as_str() {
            "inbound" => m.quantity,
            _ => -m.quantity,
        };
        assert_eq!(m.previous_quantity + delta, m.new_quantity);
    }
}

#[tokio::test]
async fn committed_movement_survives_a_dead_event_channel() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let product = app.seed_product(company, "SKU-1", dec!(10)).await;

    // A registrar whose event consumer is gone: the channel receiver is
    // dropped immediately, so every send fails.
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    drop(rx);
    let registrar = MovementRegistrar::new(app.state.db.clone(), EventSender::new(tx));

    let m = registrar
        .register(movement(wh.id, product.id, MovementType::Inbound, dec!(9)))
        .await
        .expect("a committed movement must not fail on event publishing");

    assert_eq!(m.new_quantity, dec!(9));
    assert_eq!(app.quantity(wh.id, product.id).await, dec!(9));
}

#[tokio::test]
async fn purchase_movement_updates_product_prices() {
    let app = TestApp::new().await;
    let company = Uuid::new_v4();
    let wh = app.seed_warehouse(company, "W1").await;
    let product = app.seed_product(company, "SKU-1", dec!(10)).await;

    let mut input = movement(wh.id, product.id, MovementType::Inbound, dec!(20));
    input.origin = MovementOrigin::Purchase;
    input.new_cost_price = Some(dec!(4.25));
    input.new_sale_price = Some(dec!(12.99));

    app.services()
        .movement_registrar
        .register(input)
        .await
        .expect("purchase movement");

    let resolution = app
        .services()
        .pricing
        .resolve(product.id, dec!(1))
        .await
        .expect("resolve");
    assert_eq!(resolution.unit_price, dec!(12.99));
}
