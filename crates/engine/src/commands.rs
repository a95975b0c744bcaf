//! Command structs for engine operations.
//!
//! These types group parameters for write operations (line items and ledger
//! entries), keeping call sites readable and avoiding long argument lists.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{AggregateRef, EntryKind, Money};

/// Add a line item to a sale or a purchase.
#[derive(Clone, Debug)]
pub struct AddLineItemCmd {
    pub tenant_id: String,
    pub aggregate: AggregateRef,
    pub product: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl AddLineItemCmd {
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        aggregate: AggregateRef,
        quantity: i64,
        unit_price: Money,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            aggregate,
            product: String::new(),
            quantity,
            unit_price,
        }
    }

    #[must_use]
    pub fn product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }
}

/// Correct the quantity and/or unit price of an existing line item.
///
/// Fields left as `None` keep their current value.
#[derive(Clone, Debug)]
pub struct UpdateLineItemCmd {
    pub tenant_id: String,
    pub item_id: Uuid,
    pub quantity: Option<i64>,
    pub unit_price: Option<Money>,
}

impl UpdateLineItemCmd {
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, item_id: Uuid) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            item_id,
            quantity: None,
            unit_price: None,
        }
    }

    #[must_use]
    pub fn quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    #[must_use]
    pub fn unit_price(mut self, unit_price: Money) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}

/// Append an entry to a supplier ledger.
#[derive(Clone, Debug)]
pub struct AppendEntryCmd {
    pub tenant_id: String,
    pub supplier_id: Uuid,
    pub kind: EntryKind,
    /// Non-negative; the sign comes from `kind`.
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl AppendEntryCmd {
    /// A new entry dated now.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        supplier_id: Uuid,
        kind: EntryKind,
        amount: Money,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            supplier_id,
            kind,
            amount,
            occurred_at: Utc::now(),
            note: None,
        }
    }

    #[must_use]
    pub fn charge(tenant_id: impl Into<String>, supplier_id: Uuid, amount: Money) -> Self {
        Self::new(tenant_id, supplier_id, EntryKind::Charge, amount)
    }

    #[must_use]
    pub fn payment(tenant_id: impl Into<String>, supplier_id: Uuid, amount: Money) -> Self {
        Self::new(tenant_id, supplier_id, EntryKind::Payment, amount)
    }

    #[must_use]
    pub fn reset(tenant_id: impl Into<String>, supplier_id: Uuid, amount: Money) -> Self {
        Self::new(tenant_id, supplier_id, EntryKind::Reset, amount)
    }

    /// Back-date (or post-date) the entry.
    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
