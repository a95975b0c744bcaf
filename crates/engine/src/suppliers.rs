//! The module contains the `Supplier` struct.
//!
//! A supplier is an external party the pharmacy buys from. Its
//! `current_balance` is what the pharmacy owes it: a cache of the replay of
//! its ledger (see [`crate::ledger_entries`]), never patched incrementally.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::Serialize;
use uuid::Uuid;

use crate::{EngineError, Money, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Supplier {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub current_balance: Money,
    pub created_at: DateTime<Utc>,
}

impl Supplier {
    pub fn new(tenant_id: &str, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name,
            current_balance: Money::ZERO,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "suppliers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub name_norm: String,
    pub current_balance_minor: i64,
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
    #[sea_orm(has_many = "super::ledger_entries::Entity")]
    LedgerEntries,
    #[sea_orm(has_many = "super::purchases::Entity")]
    Purchases,
}

impl Related<super::tenants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenants.def()
    }
}

impl Related<super::ledger_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntries.def()
    }
}

impl Related<super::purchases::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Purchases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Supplier> for ActiveModel {
    fn from(value: &Supplier) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            tenant_id: ActiveValue::Set(value.tenant_id.clone()),
            name: ActiveValue::Set(value.name.clone()),
            name_norm: ActiveValue::NotSet,
            current_balance_minor: ActiveValue::Set(value.current_balance.minor()),
            created_at: ActiveValue::Set(value.created_at),
        }
    }
}

impl TryFrom<Model> for Supplier {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "supplier")?,
            tenant_id: model.tenant_id,
            name: model.name,
            current_balance: Money::new(model.current_balance_minor),
            created_at: model.created_at,
        })
    }
}
