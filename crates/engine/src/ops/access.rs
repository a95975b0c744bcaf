//! Tenant-scoped row access.
//!
//! Every lookup that starts from a caller-supplied id is filtered by the
//! caller's tenant in the query itself. A row of another tenant is reported
//! exactly like a missing one. Children are loaded through their (already
//! scoped) parent and checked against the parent's tenant.

use sea_orm::{
    DatabaseTransaction, DbBackend, QueryFilter, QueryOrder, QuerySelect, prelude::*,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Aggregate, AggregateKind, AggregateRef, EngineError, LedgerEntry, LineItem, ResultEngine,
    ledger_entries, line_items, purchases, sales, suppliers, tenants,
    util::ensure_same_tenant,
};

use super::Engine;

/// Whether a lookup takes the row lock (`SELECT ... FOR UPDATE`).
///
/// Writers lock the parent row (aggregate or supplier) before reading its
/// children, so two writers on the same parent serialize. SQLite has no row
/// locks: there the writer slot taken by `claim_writer` does the same job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum RowLock {
    Skip,
    ForUpdate,
}

/// Generates a `require_*` lookup scoped by `tenant_id`.
macro_rules! impl_scoped_lookup {
    ($require_fn:ident, $module:ident, $err_msg:literal) => {
        pub(super) async fn $require_fn(
            &self,
            db: &DatabaseTransaction,
            tenant_id: &str,
            id: Uuid,
            lock: RowLock,
        ) -> ResultEngine<$module::Model> {
            let mut query = $module::Entity::find_by_id(id.to_string())
                .filter($module::Column::TenantId.eq(tenant_id.to_string()));
            if lock == RowLock::ForUpdate {
                query = query.lock_exclusive();
            }
            query
                .one(db)
                .await?
                .ok_or_else(|| EngineError::NotFound($err_msg.to_string()))
        }
    };
}

impl Engine {
    impl_scoped_lookup!(require_sale, sales, "sale not exists");
    impl_scoped_lookup!(require_purchase, purchases, "purchase not exists");
    impl_scoped_lookup!(require_supplier, suppliers, "supplier not exists");
    impl_scoped_lookup!(require_line_item, line_items, "line item not exists");
    impl_scoped_lookup!(require_ledger_entry, ledger_entries, "ledger entry not exists");

    /// First statement of every writing transaction.
    ///
    /// SQLite drops `FOR UPDATE` and starts transactions deferred: two
    /// writers that both read before writing deadlock on the upgrade and one
    /// gets `SQLITE_BUSY` at once. A write as the very first statement takes
    /// the database write lock up front, so a second writer waits in the
    /// busy handler instead. The update leaves the row as it is and matches
    /// nothing for a tenant that does not exist yet.
    pub(super) async fn claim_writer(
        &self,
        db: &DatabaseTransaction,
        tenant_id: &str,
    ) -> ResultEngine<()> {
        if db.get_database_backend() != DbBackend::Sqlite {
            return Ok(());
        }
        tenants::Entity::update_many()
            .col_expr(tenants::Column::Name, Expr::col(tenants::Column::Name).into())
            .filter(tenants::Column::Id.eq(tenant_id.to_string()))
            .exec(db)
            .await?;
        Ok(())
    }

    pub(super) async fn require_tenant(
        &self,
        db: &DatabaseTransaction,
        tenant_id: &str,
    ) -> ResultEngine<tenants::Model> {
        tenants::Entity::find_by_id(tenant_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("tenant not exists".to_string()))
    }

    /// Load the header of a sale or purchase (items not loaded).
    pub(super) async fn require_aggregate(
        &self,
        db: &DatabaseTransaction,
        tenant_id: &str,
        aggregate: AggregateRef,
        lock: RowLock,
    ) -> ResultEngine<Aggregate> {
        match aggregate.kind {
            AggregateKind::Sale => self
                .require_sale(db, tenant_id, aggregate.id, lock)
                .await?
                .try_into(),
            AggregateKind::Purchase => self
                .require_purchase(db, tenant_id, aggregate.id, lock)
                .await?
                .try_into(),
        }
    }

    /// The supplier a purchase is charged to, locked for update.
    ///
    /// The purchase is already visible to the caller, so a supplier living in
    /// another tenant is reported as a mismatch rather than hidden.
    pub(super) async fn require_purchase_supplier(
        &self,
        db: &DatabaseTransaction,
        purchase: &Aggregate,
    ) -> ResultEngine<suppliers::Model> {
        let supplier_id = purchase.supplier_id.ok_or_else(|| {
            EngineError::ConsistencyFault(format!("purchase {} has no supplier", purchase.id))
        })?;
        let supplier = suppliers::Entity::find_by_id(supplier_id.to_string())
            .lock_exclusive()
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("supplier not exists".to_string()))?;
        ensure_same_tenant(&purchase.tenant_id, &supplier.tenant_id, "purchase supplier")?;
        Ok(supplier)
    }

    /// Current items of an aggregate, in display order.
    pub(super) async fn load_items(
        &self,
        db: &DatabaseTransaction,
        aggregate: &Aggregate,
    ) -> ResultEngine<Vec<LineItem>> {
        let models = line_items::Entity::find()
            .filter(line_items::Column::AggregateKind.eq(aggregate.kind.as_str()))
            .filter(line_items::Column::AggregateId.eq(aggregate.id.to_string()))
            .order_by_asc(line_items::Column::Position)
            .order_by_asc(line_items::Column::CreatedAt)
            .all(db)
            .await?;

        models
            .into_iter()
            .map(|model| {
                ensure_same_tenant(&aggregate.tenant_id, &model.tenant_id, "line item")?;
                LineItem::try_from(model)
            })
            .collect()
    }

    /// Every entry of a supplier ledger, in replay order.
    pub(super) async fn load_entries(
        &self,
        db: &DatabaseTransaction,
        supplier: &suppliers::Model,
    ) -> ResultEngine<Vec<LedgerEntry>> {
        let models = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::SupplierId.eq(supplier.id.clone()))
            .order_by_asc(ledger_entries::Column::OccurredAt)
            .order_by_asc(ledger_entries::Column::Seq)
            .all(db)
            .await?;

        let mut entries = models
            .into_iter()
            .map(|model| {
                ensure_same_tenant(&supplier.tenant_id, &model.tenant_id, "ledger entry")?;
                LedgerEntry::try_from(model)
            })
            .collect::<ResultEngine<Vec<_>>>()?;
        entries.sort_by_key(LedgerEntry::replay_key);
        Ok(entries)
    }

    /// Charge entries created by posting `purchase`.
    pub(super) async fn purchase_charges(
        &self,
        db: &DatabaseTransaction,
        purchase: &Aggregate,
    ) -> ResultEngine<Vec<LedgerEntry>> {
        let models = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::PurchaseId.eq(purchase.id.to_string()))
            .order_by_asc(ledger_entries::Column::Seq)
            .all(db)
            .await?;

        models
            .into_iter()
            .map(|model| {
                ensure_same_tenant(&purchase.tenant_id, &model.tenant_id, "purchase charge")?;
                LedgerEntry::try_from(model)
            })
            .collect()
    }

    /// Header plus items.
    pub(super) async fn aggregate_snapshot(
        &self,
        db: &DatabaseTransaction,
        tenant_id: &str,
        aggregate: AggregateRef,
    ) -> ResultEngine<Aggregate> {
        let mut snapshot = self
            .require_aggregate(db, tenant_id, aggregate, RowLock::Skip)
            .await?;
        snapshot.items = self.load_items(db, &snapshot).await?;
        Ok(snapshot)
    }
}
