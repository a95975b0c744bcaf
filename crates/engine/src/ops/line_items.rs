use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, prelude::*};
use uuid::Uuid;

use crate::{
    AddLineItemCmd, Aggregate, EngineError, LineItem, ResultEngine, UpdateLineItemCmd,
    aggregates::{line_subtotal, total_with},
    line_items,
};

use super::{Engine, LineItemChange, access::RowLock, with_write_tx};

impl Engine {
    /// Add a line item and recompute the parent total.
    pub async fn add_line_item(&self, cmd: AddLineItemCmd) -> ResultEngine<LineItemChange> {
        let subtotal = line_subtotal(cmd.quantity, cmd.unit_price)?;
        let product = cmd.product.trim().to_string();

        with_write_tx!(self, &cmd.tenant_id, |db_tx| {
            let header = self
                .require_aggregate(&db_tx, &cmd.tenant_id, cmd.aggregate, RowLock::ForUpdate)
                .await?;
            let stored = self.load_items(&db_tx, &header).await?;
            total_with(&stored, subtotal)?;

            let position = self.next_position(&db_tx, &header).await?;
            let model = line_items::ActiveModel::new_row(
                &cmd.tenant_id,
                cmd.aggregate,
                position,
                product,
                cmd.quantity,
                cmd.unit_price,
                subtotal,
            )
            .insert(&db_tx)
            .await?;
            let item = LineItem::try_from(model)?;

            let aggregate = self.recompute_total_in(&db_tx, header).await?;
            tracing::debug!(
                tenant_id = %cmd.tenant_id,
                item_id = %item.id,
                total = %aggregate.total,
                "line item added"
            );
            Ok(LineItemChange { item, aggregate })
        })
    }

    /// Correct quantity and/or unit price of a line item and recompute the
    /// parent total.
    pub async fn update_line_item(&self, cmd: UpdateLineItemCmd) -> ResultEngine<LineItemChange> {
        with_write_tx!(self, &cmd.tenant_id, |db_tx| {
            let (header, current) = self
                .lock_item_parent(&db_tx, &cmd.tenant_id, cmd.item_id)
                .await?;

            let quantity = cmd.quantity.unwrap_or(current.quantity);
            let unit_price = cmd.unit_price.unwrap_or(current.unit_price);
            let subtotal = line_subtotal(quantity, unit_price)?;
            let others: Vec<LineItem> = self
                .load_items(&db_tx, &header)
                .await?
                .into_iter()
                .filter(|item| item.id != current.id)
                .collect();
            total_with(&others, subtotal)?;

            let model = line_items::ActiveModel {
                id: ActiveValue::Set(current.id.to_string()),
                quantity: ActiveValue::Set(quantity),
                unit_price_minor: ActiveValue::Set(unit_price.minor()),
                subtotal_minor: ActiveValue::Set(subtotal.minor()),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            let item = LineItem::try_from(model)?;

            let aggregate = self.recompute_total_in(&db_tx, header).await?;
            tracing::debug!(
                tenant_id = %cmd.tenant_id,
                item_id = %item.id,
                total = %aggregate.total,
                "line item updated"
            );
            Ok(LineItemChange { item, aggregate })
        })
    }

    /// Remove a line item and return the parent with its recomputed total.
    pub async fn remove_line_item(&self, tenant_id: &str, item_id: Uuid) -> ResultEngine<Aggregate> {
        with_write_tx!(self, tenant_id, |db_tx| {
            let (header, current) = self.lock_item_parent(&db_tx, tenant_id, item_id).await?;

            line_items::Entity::delete_by_id(current.id.to_string())
                .exec(&db_tx)
                .await?;

            let aggregate = self.recompute_total_in(&db_tx, header).await?;
            tracing::debug!(tenant_id, %item_id, total = %aggregate.total, "line item removed");
            Ok(aggregate)
        })
    }

    /// Lock the parent of a line item, then read the item again under that
    /// lock so a concurrent writer cannot slip a change in between.
    async fn lock_item_parent(
        &self,
        db: &DatabaseTransaction,
        tenant_id: &str,
        item_id: Uuid,
    ) -> ResultEngine<(Aggregate, LineItem)> {
        let parent = self
            .require_line_item(db, tenant_id, item_id, RowLock::Skip)
            .await?
            .aggregate_ref()?;
        let header = self
            .require_aggregate(db, tenant_id, parent, RowLock::ForUpdate)
            .await?;

        let item = LineItem::try_from(
            self.require_line_item(db, tenant_id, item_id, RowLock::Skip)
                .await?,
        )?;
        if item.aggregate != parent {
            return Err(EngineError::ConsistencyFault(format!(
                "line item {item_id} moved between aggregates"
            )));
        }
        Ok((header, item))
    }

    async fn next_position(&self, db: &DatabaseTransaction, aggregate: &Aggregate) -> ResultEngine<i32> {
        let last = line_items::Entity::find()
            .filter(line_items::Column::AggregateKind.eq(aggregate.kind.as_str()))
            .filter(line_items::Column::AggregateId.eq(aggregate.id.to_string()))
            .order_by_desc(line_items::Column::Position)
            .one(db)
            .await?;
        Ok(last.map_or(0, |model| model.position.saturating_add(1)))
    }
}
