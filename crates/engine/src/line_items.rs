//! Line items.
//!
//! A [`LineItem`] is one `quantity × unit_price` row of a sale or a purchase.
//! Amounts are stored as integer **minor units**. The stored `subtotal` is a
//! cache: it is rewritten whenever quantity or price change and re-derived by
//! every total recompute.

use chrono::Utc;
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::Serialize;
use uuid::Uuid;

use crate::{AggregateKind, AggregateRef, EngineError, Money, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub id: Uuid,
    pub aggregate: AggregateRef,
    /// Display order inside the aggregate. Irrelevant for totals.
    pub position: i32,
    pub product: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "line_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub aggregate_kind: String,
    pub aggregate_id: String,
    pub position: i32,
    pub product: String,
    pub quantity: i64,
    pub unit_price_minor: i64,
    pub subtotal_minor: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenants::Entity",
        from = "Column::TenantId",
        to = "super::tenants::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Tenants,
}

impl Related<super::tenants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn new_row(
        tenant_id: &str,
        aggregate: AggregateRef,
        position: i32,
        product: String,
        quantity: i64,
        unit_price: Money,
        subtotal: Money,
    ) -> Self {
        Self {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            tenant_id: ActiveValue::Set(tenant_id.to_string()),
            aggregate_kind: ActiveValue::Set(aggregate.kind.as_str().to_string()),
            aggregate_id: ActiveValue::Set(aggregate.id.to_string()),
            position: ActiveValue::Set(position),
            product: ActiveValue::Set(product),
            quantity: ActiveValue::Set(quantity),
            unit_price_minor: ActiveValue::Set(unit_price.minor()),
            subtotal_minor: ActiveValue::Set(subtotal.minor()),
            created_at: ActiveValue::Set(Utc::now()),
        }
    }
}

impl Model {
    pub(crate) fn aggregate_ref(&self) -> Result<AggregateRef, EngineError> {
        Ok(AggregateRef {
            kind: AggregateKind::try_from(self.aggregate_kind.as_str())?,
            id: parse_uuid(&self.aggregate_id, "aggregate")?,
        })
    }
}

impl TryFrom<Model> for LineItem {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let aggregate = model.aggregate_ref()?;
        Ok(Self {
            id: parse_uuid(&model.id, "line item")?,
            aggregate,
            position: model.position,
            product: model.product,
            quantity: model.quantity,
            unit_price: Money::new(model.unit_price_minor),
            subtotal: Money::new(model.subtotal_minor),
        })
    }
}
