//! Aggregates: sales and purchases.
//!
//! An aggregate owns a list of [`LineItem`]s and a `total` that is *derived*
//! from them. The total is never accumulated: every write recomputes it from
//! the current items with [`derive_total`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, LineItem, Money, ResultEngine, purchases, sales,
    util::parse_uuid,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Sale,
    Purchase,
}

impl AggregateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Purchase => "purchase",
        }
    }
}

impl TryFrom<&str> for AggregateKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "sale" => Ok(Self::Sale),
            "purchase" => Ok(Self::Purchase),
            other => Err(EngineError::ConsistencyFault(format!(
                "invalid aggregate kind: {other}"
            ))),
        }
    }
}

/// Typed pointer to a sale or a purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateRef {
    pub kind: AggregateKind,
    pub id: Uuid,
}

impl AggregateRef {
    #[must_use]
    pub fn sale(id: Uuid) -> Self {
        Self {
            kind: AggregateKind::Sale,
            id,
        }
    }

    #[must_use]
    pub fn purchase(id: Uuid) -> Self {
        Self {
            kind: AggregateKind::Purchase,
            id,
        }
    }
}

/// Snapshot of a sale or purchase with its items in display order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub id: Uuid,
    pub kind: AggregateKind,
    pub tenant_id: String,
    pub total: Money,
    /// Sale note or purchase invoice reference.
    pub label: Option<String>,
    /// Only set for purchases.
    pub supplier_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub items: Vec<LineItem>,
}

impl Aggregate {
    #[must_use]
    pub fn aggregate_ref(&self) -> AggregateRef {
        AggregateRef {
            kind: self.kind,
            id: self.id,
        }
    }

    #[must_use]
    pub fn is_posted(&self) -> bool {
        self.posted_at.is_some()
    }
}

impl TryFrom<sales::Model> for Aggregate {
    type Error = EngineError;

    fn try_from(model: sales::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "sale")?,
            kind: AggregateKind::Sale,
            tenant_id: model.tenant_id,
            total: Money::new(model.total_minor),
            label: model.note,
            supplier_id: None,
            created_at: model.created_at,
            posted_at: None,
            items: Vec::new(),
        })
    }
}

impl TryFrom<purchases::Model> for Aggregate {
    type Error = EngineError;

    fn try_from(model: purchases::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "purchase")?,
            kind: AggregateKind::Purchase,
            tenant_id: model.tenant_id,
            total: Money::new(model.total_minor),
            label: model.reference,
            supplier_id: Some(parse_uuid(&model.supplier_id, "supplier")?),
            created_at: model.created_at,
            posted_at: model.posted_at,
            items: Vec::new(),
        })
    }
}

/// Validates caller input and derives `quantity × unit_price`.
pub(crate) fn line_subtotal(quantity: i64, unit_price: Money) -> ResultEngine<Money> {
    if quantity <= 0 {
        return Err(EngineError::InvalidQuantity(format!(
            "quantity must be > 0, got {quantity}"
        )));
    }
    if unit_price.is_negative() {
        return Err(EngineError::InvalidPrice(format!(
            "unit price must be >= 0, got {unit_price}"
        )));
    }
    unit_price
        .checked_mul(quantity)
        .ok_or_else(|| EngineError::InvalidPrice("subtotal too large".to_string()))
}

/// Recomputes the total of an aggregate from its stored items.
///
/// Each subtotal is re-derived from quantity and unit price; the cached
/// `subtotal` column is ignored. Rows that could never have been written by
/// [`line_subtotal`] are a consistency fault.
pub(crate) fn derive_total(items: &[LineItem]) -> ResultEngine<Money> {
    let subtotals = derive_subtotals(items)?;
    Money::checked_sum(subtotals).ok_or_else(|| {
        tracing::error!(items = items.len(), "aggregate total overflows");
        EngineError::ConsistencyFault("aggregate total overflows".to_string())
    })
}

/// Total the aggregate would reach once an item with `subtotal` is written
/// next to the stored `items`.
///
/// Stored rows are still checked like in [`derive_total`], but an overflow
/// comes from the item being written and is reported as [`EngineError::InvalidPrice`].
pub(crate) fn total_with(items: &[LineItem], subtotal: Money) -> ResultEngine<Money> {
    let subtotals = derive_subtotals(items)?;
    Money::checked_sum(subtotals.into_iter().chain([subtotal]))
        .ok_or_else(|| EngineError::InvalidPrice("aggregate total too large".to_string()))
}

fn derive_subtotals(items: &[LineItem]) -> ResultEngine<Vec<Money>> {
    items
        .iter()
        .map(|item| {
            line_subtotal(item.quantity, item.unit_price).map_err(|err| {
                tracing::error!(item_id = %item.id, %err, "stored line item is not derivable");
                EngineError::ConsistencyFault(format!("line item {}: {err}", item.id))
            })
        })
        .collect()
}
