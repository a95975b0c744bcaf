use chrono::Utc;
use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, prelude::*};
use uuid::Uuid;

use crate::{
    Aggregate, AggregateKind, AggregateRef, EngineError, ResultEngine, Supplier,
    aggregates::{derive_total, line_subtotal},
    line_items, purchases, sales,
    util::normalize_optional_text,
};

use super::{Engine, access::RowLock, with_tx, with_write_tx};

impl Engine {
    /// Open a new, empty sale.
    pub async fn new_sale(&self, tenant_id: &str, note: Option<&str>) -> ResultEngine<Aggregate> {
        let model = sales::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            tenant_id: ActiveValue::Set(tenant_id.to_string()),
            total_minor: ActiveValue::Set(0),
            note: ActiveValue::Set(normalize_optional_text(note)),
            created_at: ActiveValue::Set(Utc::now()),
        };

        with_write_tx!(self, tenant_id, |db_tx| {
            self.require_tenant(&db_tx, tenant_id).await?;
            let sale = Aggregate::try_from(model.insert(&db_tx).await?)?;
            tracing::debug!(tenant_id, sale_id = %sale.id, "sale opened");
            Ok(sale)
        })
    }

    /// Open a new, empty purchase from one of the tenant's suppliers.
    pub async fn new_purchase(
        &self,
        tenant_id: &str,
        supplier_id: Uuid,
        reference: Option<&str>,
    ) -> ResultEngine<Aggregate> {
        let model = purchases::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            tenant_id: ActiveValue::Set(tenant_id.to_string()),
            supplier_id: ActiveValue::Set(supplier_id.to_string()),
            total_minor: ActiveValue::Set(0),
            reference: ActiveValue::Set(normalize_optional_text(reference)),
            created_at: ActiveValue::Set(Utc::now()),
            posted_at: ActiveValue::Set(None),
        };

        with_write_tx!(self, tenant_id, |db_tx| {
            self.require_supplier(&db_tx, tenant_id, supplier_id, RowLock::Skip)
                .await?;
            let purchase = Aggregate::try_from(model.insert(&db_tx).await?)?;
            tracing::debug!(tenant_id, purchase_id = %purchase.id, "purchase opened");
            Ok(purchase)
        })
    }

    /// Snapshot of a sale or purchase with its items.
    pub async fn aggregate(
        &self,
        tenant_id: &str,
        aggregate: AggregateRef,
    ) -> ResultEngine<Aggregate> {
        with_tx!(self, |db_tx| {
            self.aggregate_snapshot(&db_tx, tenant_id, aggregate).await
        })
    }

    /// Every sale or purchase of the tenant, oldest first, with items.
    pub async fn list_aggregates(
        &self,
        tenant_id: &str,
        kind: AggregateKind,
    ) -> ResultEngine<Vec<Aggregate>> {
        with_tx!(self, |db_tx| {
            let headers: Vec<Aggregate> = match kind {
                AggregateKind::Sale => sales::Entity::find()
                    .filter(sales::Column::TenantId.eq(tenant_id.to_string()))
                    .order_by_asc(sales::Column::CreatedAt)
                    .all(&db_tx)
                    .await?
                    .into_iter()
                    .map(Aggregate::try_from)
                    .collect::<ResultEngine<_>>()?,
                AggregateKind::Purchase => purchases::Entity::find()
                    .filter(purchases::Column::TenantId.eq(tenant_id.to_string()))
                    .order_by_asc(purchases::Column::CreatedAt)
                    .all(&db_tx)
                    .await?
                    .into_iter()
                    .map(Aggregate::try_from)
                    .collect::<ResultEngine<_>>()?,
            };

            let mut out = Vec::with_capacity(headers.len());
            for mut header in headers {
                header.items = self.load_items(&db_tx, &header).await?;
                out.push(header);
            }
            Ok(out)
        })
    }

    /// Recompute the total of an aggregate from its items and store it.
    ///
    /// Idempotent. A stored total (or cached subtotal) that drifted from the
    /// items is overwritten and logged.
    pub async fn recompute_total(
        &self,
        tenant_id: &str,
        aggregate: AggregateRef,
    ) -> ResultEngine<Aggregate> {
        with_write_tx!(self, tenant_id, |db_tx| {
            let header = self
                .require_aggregate(&db_tx, tenant_id, aggregate, RowLock::ForUpdate)
                .await?;
            let stored = header.total;
            let updated = self.recompute_total_in(&db_tx, header).await?;
            if updated.total != stored {
                tracing::warn!(
                    tenant_id,
                    kind = aggregate.kind.as_str(),
                    aggregate_id = %aggregate.id,
                    %stored,
                    recomputed = %updated.total,
                    "corrected drifted aggregate total"
                );
            }
            Ok(updated)
        })
    }

    /// Delete a sale or a purchase together with its items.
    ///
    /// Deleting a purchase also removes the charge its posting created and
    /// recomputes the supplier balance, which is returned.
    pub async fn delete_aggregate(
        &self,
        tenant_id: &str,
        aggregate: AggregateRef,
    ) -> ResultEngine<Option<Supplier>> {
        with_write_tx!(self, tenant_id, |db_tx| {
            let header = self
                .require_aggregate(&db_tx, tenant_id, aggregate, RowLock::ForUpdate)
                .await?;
            match header.kind {
                AggregateKind::Sale => {
                    self.delete_items_in(&db_tx, &header).await?;
                    sales::Entity::delete_by_id(header.id.to_string())
                        .exec(&db_tx)
                        .await?;
                    tracing::info!(tenant_id, sale_id = %header.id, "sale deleted");
                    Ok(None)
                }
                AggregateKind::Purchase => {
                    let supplier = self.require_purchase_supplier(&db_tx, &header).await?;
                    self.delete_items_in(&db_tx, &header).await?;
                    let removed = self.remove_purchase_entries_in(&db_tx, header.id).await?;
                    purchases::Entity::delete_by_id(header.id.to_string())
                        .exec(&db_tx)
                        .await?;

                    let supplier = self.recompute_balance_in(&db_tx, &supplier).await?;
                    tracing::info!(
                        tenant_id,
                        purchase_id = %header.id,
                        removed_charges = removed,
                        balance = %supplier.current_balance,
                        "purchase deleted"
                    );
                    Ok(Some(supplier))
                }
            }
        })
    }

    async fn delete_items_in(
        &self,
        db: &DatabaseTransaction,
        aggregate: &Aggregate,
    ) -> ResultEngine<()> {
        line_items::Entity::delete_many()
            .filter(line_items::Column::AggregateKind.eq(aggregate.kind.as_str()))
            .filter(line_items::Column::AggregateId.eq(aggregate.id.to_string()))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Re-derive every subtotal and the total of an already locked aggregate.
    ///
    /// For a posted purchase the ledger charge is brought in line with the new
    /// total.
    pub(super) async fn recompute_total_in(
        &self,
        db: &DatabaseTransaction,
        mut aggregate: Aggregate,
    ) -> ResultEngine<Aggregate> {
        let mut items = self.load_items(db, &aggregate).await?;
        let total = derive_total(&items)?;

        for item in &mut items {
            let subtotal = line_subtotal(item.quantity, item.unit_price)
                .map_err(|err| EngineError::ConsistencyFault(format!("line item {}: {err}", item.id)))?;
            if item.subtotal != subtotal {
                tracing::warn!(
                    item_id = %item.id,
                    cached = %item.subtotal,
                    %subtotal,
                    "corrected drifted line subtotal"
                );
                line_items::ActiveModel {
                    id: ActiveValue::Set(item.id.to_string()),
                    subtotal_minor: ActiveValue::Set(subtotal.minor()),
                    ..Default::default()
                }
                .update(db)
                .await?;
                item.subtotal = subtotal;
            }
        }

        match aggregate.kind {
            AggregateKind::Sale => {
                sales::ActiveModel {
                    id: ActiveValue::Set(aggregate.id.to_string()),
                    total_minor: ActiveValue::Set(total.minor()),
                    ..Default::default()
                }
                .update(db)
                .await?;
            }
            AggregateKind::Purchase => {
                purchases::ActiveModel {
                    id: ActiveValue::Set(aggregate.id.to_string()),
                    total_minor: ActiveValue::Set(total.minor()),
                    ..Default::default()
                }
                .update(db)
                .await?;
            }
        }

        aggregate.total = total;
        aggregate.items = items;

        if aggregate.kind == AggregateKind::Purchase && aggregate.is_posted() {
            self.sync_purchase_charge_in(db, &aggregate).await?;
        }
        Ok(aggregate)
    }
}
