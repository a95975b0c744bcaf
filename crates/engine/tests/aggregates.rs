use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    AddLineItemCmd, AggregateKind, AggregateRef, Engine, EngineError, Money, UpdateLineItemCmd,
};
use migration::MigratorTrait;
use uuid::Uuid;

async fn engine_with_db() -> (Engine, DatabaseConnection, String) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    let tenant_id = engine.new_tenant("Farmacia Central").await.unwrap();
    (engine, db, tenant_id)
}

fn money(value: &str) -> Money {
    value.parse().unwrap()
}

async fn sale_with_two_items(engine: &Engine, tenant_id: &str) -> AggregateRef {
    let sale = engine.new_sale(tenant_id, Some("counter 1")).await.unwrap();
    let sale_ref = sale.aggregate_ref();
    engine
        .add_line_item(
            AddLineItemCmd::new(tenant_id, sale_ref, 10, money("25.50")).product("Ibuprofeno 400"),
        )
        .await
        .unwrap();
    engine
        .add_line_item(
            AddLineItemCmd::new(tenant_id, sale_ref, 5, money("15.75")).product("Amoxicilina 500"),
        )
        .await
        .unwrap();
    sale_ref
}

#[tokio::test]
async fn total_is_sum_of_line_subtotals() {
    let (engine, _db, tenant_id) = engine_with_db().await;

    let sale = engine.new_sale(&tenant_id, None).await.unwrap();
    assert_eq!(sale.total, Money::ZERO);
    assert!(sale.items.is_empty());

    let first = engine
        .add_line_item(AddLineItemCmd::new(
            &tenant_id,
            sale.aggregate_ref(),
            10,
            money("25.50"),
        ))
        .await
        .unwrap();
    assert_eq!(first.item.subtotal, money("255.00"));
    assert_eq!(first.aggregate.total, money("255.00"));

    let second = engine
        .add_line_item(AddLineItemCmd::new(
            &tenant_id,
            sale.aggregate_ref(),
            5,
            money("15.75"),
        ))
        .await
        .unwrap();
    assert_eq!(second.aggregate.total, money("333.75"));
    assert_eq!(second.aggregate.items.len(), 2);

    let snapshot = engine
        .aggregate(&tenant_id, sale.aggregate_ref())
        .await
        .unwrap();
    assert_eq!(snapshot.total, money("333.75"));
    assert_eq!(snapshot.total.to_string(), "333.75");
}

#[tokio::test]
async fn items_keep_insertion_position() {
    let (engine, _db, tenant_id) = engine_with_db().await;
    let sale_ref = sale_with_two_items(&engine, &tenant_id).await;

    let snapshot = engine.aggregate(&tenant_id, sale_ref).await.unwrap();
    let products: Vec<&str> = snapshot.items.iter().map(|i| i.product.as_str()).collect();
    assert_eq!(products, vec!["Ibuprofeno 400", "Amoxicilina 500"]);
    assert!(snapshot.items[0].position < snapshot.items[1].position);
}

#[tokio::test]
async fn recompute_total_is_idempotent() {
    let (engine, _db, tenant_id) = engine_with_db().await;
    let sale_ref = sale_with_two_items(&engine, &tenant_id).await;

    let first = engine.recompute_total(&tenant_id, sale_ref).await.unwrap();
    let second = engine.recompute_total(&tenant_id, sale_ref).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second.total, money("333.75"));
}

#[tokio::test]
async fn recompute_total_heals_corrupted_total_and_subtotal() {
    let (engine, db, tenant_id) = engine_with_db().await;
    let sale_ref = sale_with_two_items(&engine, &tenant_id).await;
    let snapshot = engine.aggregate(&tenant_id, sale_ref).await.unwrap();

    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE sales SET total_minor = ? WHERE id = ?",
        vec![1_i64.into(), sale_ref.id.to_string().into()],
    ))
    .await
    .unwrap();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE line_items SET subtotal_minor = ? WHERE id = ?",
        vec![7_i64.into(), snapshot.items[0].id.to_string().into()],
    ))
    .await
    .unwrap();

    let check = engine
        .reconcile_aggregate(&tenant_id, sale_ref)
        .await
        .unwrap();
    assert!(!check.consistent);
    assert_eq!(check.stored, Money::new(1));
    assert_eq!(check.recomputed, money("333.75"));

    let healed = engine.recompute_total(&tenant_id, sale_ref).await.unwrap();
    assert_eq!(healed.total, money("333.75"));
    assert_eq!(healed.items[0].subtotal, money("255.00"));

    let check = engine
        .reconcile_aggregate(&tenant_id, sale_ref)
        .await
        .unwrap();
    assert!(check.consistent);
}

#[tokio::test]
async fn update_and_remove_line_item_recompute_total() {
    let (engine, _db, tenant_id) = engine_with_db().await;
    let sale_ref = sale_with_two_items(&engine, &tenant_id).await;
    let snapshot = engine.aggregate(&tenant_id, sale_ref).await.unwrap();
    let first_id = snapshot.items[0].id;
    let second_id = snapshot.items[1].id;

    let change = engine
        .update_line_item(UpdateLineItemCmd::new(&tenant_id, first_id).quantity(4))
        .await
        .unwrap();
    assert_eq!(change.item.quantity, 4);
    assert_eq!(change.item.subtotal, money("102.00"));
    assert_eq!(change.aggregate.total, money("180.75"));

    let change = engine
        .update_line_item(UpdateLineItemCmd::new(&tenant_id, first_id).unit_price(money("20.00")))
        .await
        .unwrap();
    assert_eq!(change.item.quantity, 4);
    assert_eq!(change.aggregate.total, money("158.75"));

    let sale = engine
        .remove_line_item(&tenant_id, second_id)
        .await
        .unwrap();
    assert_eq!(sale.total, money("80.00"));
    assert_eq!(sale.items.len(), 1);

    let sale = engine.remove_line_item(&tenant_id, first_id).await.unwrap();
    assert_eq!(sale.total, Money::ZERO);
    assert!(sale.items.is_empty());
}

#[tokio::test]
async fn invalid_items_leave_no_partial_writes() {
    let (engine, _db, tenant_id) = engine_with_db().await;
    let sale_ref = sale_with_two_items(&engine, &tenant_id).await;
    let before = engine.aggregate(&tenant_id, sale_ref).await.unwrap();

    let err = engine
        .add_line_item(AddLineItemCmd::new(&tenant_id, sale_ref, 0, money("1.00")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuantity(_)));

    let err = engine
        .add_line_item(AddLineItemCmd::new(&tenant_id, sale_ref, 1, money("-1.00")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPrice(_)));

    let err = engine
        .update_line_item(UpdateLineItemCmd::new(&tenant_id, before.items[0].id).quantity(-3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuantity(_)));

    let err = engine
        .update_line_item(
            UpdateLineItemCmd::new(&tenant_id, before.items[0].id).unit_price(Money::new(-5)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPrice(_)));

    let after = engine.aggregate(&tenant_id, sale_ref).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn rounded_prices_multiply_exactly() {
    let (engine, _db, tenant_id) = engine_with_db().await;
    let sale = engine.new_sale(&tenant_id, None).await.unwrap();

    let price = Money::parse_rounded("0.125").unwrap();
    let change = engine
        .add_line_item(AddLineItemCmd::new(&tenant_id, sale.aggregate_ref(), 3, price))
        .await
        .unwrap();
    assert_eq!(change.aggregate.total, money("0.39"));
}

#[tokio::test]
async fn total_overflow_from_a_write_is_a_bad_price() {
    let (engine, _db, tenant_id) = engine_with_db().await;
    let sale = engine.new_sale(&tenant_id, None).await.unwrap();
    let sale_ref = sale.aggregate_ref();

    let big = engine
        .add_line_item(AddLineItemCmd::new(
            &tenant_id,
            sale_ref,
            1,
            Money::new(i64::MAX - 100),
        ))
        .await
        .unwrap();

    let err = engine
        .add_line_item(AddLineItemCmd::new(&tenant_id, sale_ref, 1, Money::new(101)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPrice(_)));
    assert!(err.is_client_error());

    let small = engine
        .add_line_item(AddLineItemCmd::new(&tenant_id, sale_ref, 1, Money::new(100)))
        .await
        .unwrap();
    assert_eq!(small.aggregate.total, Money::new(i64::MAX));

    // Raising an existing item past the limit is rejected the same way.
    let err = engine
        .update_line_item(
            UpdateLineItemCmd::new(&tenant_id, big.item.id).unit_price(Money::new(i64::MAX - 99)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPrice(_)));

    let snapshot = engine.aggregate(&tenant_id, sale_ref).await.unwrap();
    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(snapshot.total, Money::new(i64::MAX));
}

#[tokio::test]
async fn delete_sale_removes_it_with_items() {
    let (engine, _db, tenant_id) = engine_with_db().await;
    let sale_ref = sale_with_two_items(&engine, &tenant_id).await;
    let item_id = engine.aggregate(&tenant_id, sale_ref).await.unwrap().items[0].id;

    let supplier = engine.delete_aggregate(&tenant_id, sale_ref).await.unwrap();
    assert!(supplier.is_none());

    assert_eq!(
        engine.aggregate(&tenant_id, sale_ref).await.unwrap_err(),
        EngineError::NotFound("sale not exists".to_string())
    );
    assert_eq!(
        engine.remove_line_item(&tenant_id, item_id).await.unwrap_err(),
        EngineError::NotFound("line item not exists".to_string())
    );
    assert!(
        engine
            .list_aggregates(&tenant_id, AggregateKind::Sale)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn unknown_aggregate_is_not_found() {
    let (engine, _db, tenant_id) = engine_with_db().await;

    let err = engine
        .add_line_item(AddLineItemCmd::new(
            &tenant_id,
            AggregateRef::purchase(Uuid::new_v4()),
            1,
            Money::new(100),
        ))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("purchase not exists".to_string()));
}
