use chrono::{TimeZone, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    AddLineItemCmd, AppendEntryCmd, Engine, EngineError, Money, ReconciliationSubject,
};
use migration::MigratorTrait;

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

async fn execute(db: &DatabaseConnection, sql: &str, values: Vec<sea_orm::Value>) {
    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        sql,
        values,
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn fresh_tenant_is_consistent() {
    let (engine, _db, tenant_id) = engine_with_db().await;
    let supplier = engine
        .new_supplier(&tenant_id, "Laboratorio Andes")
        .await
        .unwrap();
    let sale = engine.new_sale(&tenant_id, None).await.unwrap();
    engine
        .add_line_item(AddLineItemCmd::new(&tenant_id, sale.aggregate_ref(), 4, Money::new(199)))
        .await
        .unwrap();
    engine
        .append_entry(AppendEntryCmd::charge(&tenant_id, supplier.id, Money::new(10_000)))
        .await
        .unwrap();

    let report = engine.reconcile_tenant(&tenant_id).await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.drift_count(), 0);
    assert_eq!(report.aggregates.len(), 1);
    assert_eq!(report.suppliers.len(), 1);

    let check = engine
        .reconcile_supplier(&tenant_id, supplier.id)
        .await
        .unwrap();
    assert_eq!(
        check.subject,
        ReconciliationSubject::Supplier { id: supplier.id }
    );
    assert!(check.consistent);
    assert_eq!(check.recomputed, Money::new(10_000));
}

#[tokio::test]
async fn repair_fixes_every_drifted_record() {
    let (engine, db, tenant_id) = engine_with_db().await;
    let posted_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

    let supplier = engine
        .new_supplier(&tenant_id, "Laboratorio Andes")
        .await
        .unwrap();
    let purchase = engine
        .new_purchase(&tenant_id, supplier.id, Some("FAC-77"))
        .await
        .unwrap();
    engine
        .add_line_item(AddLineItemCmd::new(
            &tenant_id,
            purchase.aggregate_ref(),
            2,
            Money::new(10_000),
        ))
        .await
        .unwrap();
    engine
        .post_purchase_at(&tenant_id, purchase.id, posted_at)
        .await
        .unwrap();
    let sale = engine.new_sale(&tenant_id, None).await.unwrap();
    engine
        .add_line_item(AddLineItemCmd::new(&tenant_id, sale.aggregate_ref(), 3, Money::new(500)))
        .await
        .unwrap();

    execute(
        &db,
        "UPDATE sales SET total_minor = ? WHERE id = ?",
        vec![0_i64.into(), sale.id.to_string().into()],
    )
    .await;
    execute(
        &db,
        "DELETE FROM ledger_entries WHERE purchase_id = ?",
        vec![purchase.id.to_string().into()],
    )
    .await;

    let before = engine.reconcile_tenant(&tenant_id).await.unwrap();
    assert!(!before.is_consistent());
    assert_eq!(before.drift_count(), 3);
    assert_eq!(before.charge_mismatches.len(), 1);
    assert_eq!(before.charge_mismatches[0].purchase_id, purchase.id);
    assert_eq!(before.charge_mismatches[0].charges, 0);
    assert_eq!(before.charge_mismatches[0].total, Money::new(20_000));

    let json = serde_json::to_value(&before).unwrap();
    assert_eq!(json["suppliers"][0]["subject"]["type"], "supplier");
    assert_eq!(json["suppliers"][0]["stored"], 20_000);
    assert_eq!(json["suppliers"][0]["recomputed"], 0);

    let after = engine.repair_tenant(&tenant_id).await.unwrap();
    assert!(after.is_consistent());

    let sale = engine
        .aggregate(&tenant_id, sale.aggregate_ref())
        .await
        .unwrap();
    assert_eq!(sale.total, Money::new(1_500));

    let ledger = engine.ledger(&tenant_id, supplier.id).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].purchase_id, Some(purchase.id));
    assert_eq!(ledger[0].amount, Money::new(20_000));
    assert_eq!(ledger[0].occurred_at, posted_at);
    assert_eq!(
        engine.supplier(&tenant_id, supplier.id).await.unwrap().current_balance,
        Money::new(20_000)
    );

    // A second repair has nothing left to do.
    assert_eq!(engine.repair_tenant(&tenant_id).await.unwrap(), after);
}

#[tokio::test]
async fn drifted_balance_is_reported_then_repaired() {
    let (engine, db, tenant_id) = engine_with_db().await;
    let supplier = engine
        .new_supplier(&tenant_id, "Laboratorio Andes")
        .await
        .unwrap();
    engine
        .append_entry(AppendEntryCmd::charge(&tenant_id, supplier.id, Money::new(7_500)))
        .await
        .unwrap();

    execute(
        &db,
        "UPDATE suppliers SET current_balance_minor = ? WHERE id = ?",
        vec![1_i64.into(), supplier.id.to_string().into()],
    )
    .await;

    let check = engine
        .reconcile_supplier(&tenant_id, supplier.id)
        .await
        .unwrap();
    assert!(!check.consistent);
    assert_eq!(check.stored, Money::new(1));
    assert_eq!(check.recomputed, Money::new(7_500));

    let report = engine.repair_tenant(&tenant_id).await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(
        engine.supplier(&tenant_id, supplier.id).await.unwrap().current_balance,
        Money::new(7_500)
    );
}

#[tokio::test]
async fn unknown_tenant_is_not_found() {
    let (engine, _db, _tenant_id) = engine_with_db().await;
    assert_eq!(
        engine.reconcile_tenant("nope").await.unwrap_err(),
        EngineError::NotFound("tenant not exists".to_string())
    );
}
