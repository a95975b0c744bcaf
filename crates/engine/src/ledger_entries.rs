//! Supplier ledger.
//!
//! A [`LedgerEntry`] is an immutable, signed event against a supplier balance:
//!
//! - `charge`: the pharmacy owes more (`+amount`)
//! - `payment`: the pharmacy paid (`-amount`)
//! - `reset`: the running balance is replaced by `amount`
//!
//! Amounts are always stored non-negative; the sign comes from the kind.
//! The supplier balance is the fold of all entries ordered by
//! `(occurred_at, seq)`, where `seq` is the per-supplier insertion counter.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Charge,
    Payment,
    Reset,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Payment => "payment",
            Self::Reset => "reset",
        }
    }

    /// Applies an entry of this kind to the running balance. `None` on
    /// overflow.
    #[must_use]
    pub fn apply(self, running: Money, amount: Money) -> Option<Money> {
        match self {
            Self::Charge => running.checked_add(amount),
            Self::Payment => running.checked_sub(amount),
            Self::Reset => Some(amount),
        }
    }
}

impl TryFrom<&str> for EntryKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "charge" => Ok(Self::Charge),
            "payment" => Ok(Self::Payment),
            "reset" => Ok(Self::Reset),
            other => Err(EngineError::ConsistencyFault(format!(
                "invalid ledger entry kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub supplier_id: Uuid,
    pub seq: i64,
    pub kind: EntryKind,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
    /// Originating purchase, for charges created by posting.
    pub purchase_id: Option<Uuid>,
    /// Balance right after this entry, as computed when it was appended.
    /// Audit display only.
    pub running_balance: Money,
    pub note: Option<String>,
}

impl LedgerEntry {
    /// Position of the entry in replay order.
    #[must_use]
    pub fn replay_key(&self) -> (DateTime<Utc>, i64) {
        (self.occurred_at, self.seq)
    }

    fn apply_to(&self, running: Money) -> ResultEngine<Money> {
        self.kind.apply(running, self.amount).ok_or_else(|| {
            tracing::error!(entry_id = %self.id, supplier_id = %self.supplier_id, "ledger replay overflows");
            EngineError::ConsistencyFault(format!("ledger replay overflows at entry {}", self.id))
        })
    }
}

fn in_replay_order(entries: &[LedgerEntry]) -> Vec<&LedgerEntry> {
    let mut ordered: Vec<&LedgerEntry> = entries.iter().collect();
    ordered.sort_by_key(|entry| entry.replay_key());
    ordered
}

/// Folds every entry from zero, in replay order.
pub(crate) fn replay(entries: &[LedgerEntry]) -> ResultEngine<Money> {
    in_replay_order(entries)
        .into_iter()
        .try_fold(Money::ZERO, |running, entry| entry.apply_to(running))
}

/// Folds the entries whose replay key is `<= until`.
pub(crate) fn replay_through(
    entries: &[LedgerEntry],
    until: (DateTime<Utc>, i64),
) -> ResultEngine<Money> {
    in_replay_order(entries)
        .into_iter()
        .take_while(|entry| entry.replay_key() <= until)
        .try_fold(Money::ZERO, |running, entry| entry.apply_to(running))
}

/// Ids of the entries whose cached running balance differs from the replay.
pub(crate) fn stale_running_balances(entries: &[LedgerEntry]) -> ResultEngine<Vec<Uuid>> {
    let mut stale = Vec::new();
    let mut running = Money::ZERO;
    for entry in in_replay_order(entries) {
        running = entry.apply_to(running)?;
        if entry.running_balance != running {
            stale.push(entry.id);
        }
    }
    Ok(stale)
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub supplier_id: String,
    pub seq: i64,
    pub kind: String,
    pub amount_minor: i64,
    pub occurred_at: DateTimeUtc,
    pub purchase_id: Option<String>,
    pub running_balance_minor: i64,
    pub note: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::suppliers::Entity",
        from = "Column::SupplierId",
        to = "super::suppliers::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Suppliers,
    #[sea_orm(
        belongs_to = "super::purchases::Entity",
        from = "Column::PurchaseId",
        to = "super::purchases::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Purchases,
}

impl Related<super::suppliers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Suppliers.def()
    }
}

impl Related<super::purchases::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Purchases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&LedgerEntry> for ActiveModel {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: ActiveValue::Set(entry.id.to_string()),
            tenant_id: ActiveValue::Set(entry.tenant_id.clone()),
            supplier_id: ActiveValue::Set(entry.supplier_id.to_string()),
            seq: ActiveValue::Set(entry.seq),
            kind: ActiveValue::Set(entry.kind.as_str().to_string()),
            amount_minor: ActiveValue::Set(entry.amount.minor()),
            occurred_at: ActiveValue::Set(entry.occurred_at),
            purchase_id: ActiveValue::Set(entry.purchase_id.map(|id| id.to_string())),
            running_balance_minor: ActiveValue::Set(entry.running_balance.minor()),
            note: ActiveValue::Set(entry.note.clone()),
            created_at: ActiveValue::Set(Utc::now()),
        }
    }
}

impl TryFrom<Model> for LedgerEntry {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        if model.amount_minor < 0 {
            tracing::error!(entry_id = %model.id, amount_minor = model.amount_minor, "negative ledger amount in storage");
            return Err(EngineError::ConsistencyFault(format!(
                "ledger entry {} has a negative amount",
                model.id
            )));
        }
        Ok(Self {
            id: parse_uuid(&model.id, "ledger entry")?,
            tenant_id: model.tenant_id,
            supplier_id: parse_uuid(&model.supplier_id, "supplier")?,
            seq: model.seq,
            kind: EntryKind::try_from(model.kind.as_str())?,
            amount: Money::new(model.amount_minor),
            occurred_at: model.occurred_at,
            purchase_id: model
                .purchase_id
                .as_deref()
                .map(|id| parse_uuid(id, "purchase"))
                .transpose()?,
            running_balance: Money::new(model.running_balance_minor),
            note: model.note,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn entry(seq: i64, seconds: i64, kind: EntryKind, amount_minor: i64) -> LedgerEntry {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        LedgerEntry {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            supplier_id: Uuid::nil(),
            seq,
            kind,
            amount: Money::new(amount_minor),
            occurred_at: base + Duration::seconds(seconds),
            purchase_id: None,
            running_balance: Money::ZERO,
            note: None,
        }
    }

    #[test]
    fn charges_and_payments_fold_in_order() {
        let entries = vec![
            entry(1, 0, EntryKind::Charge, 10_000),
            entry(2, 1, EntryKind::Payment, 3_000),
            entry(3, 2, EntryKind::Charge, 5_000),
        ];
        assert_eq!(replay(&entries).unwrap(), Money::new(12_000));
    }

    #[test]
    fn reset_discards_prior_running_total() {
        let entries = vec![
            entry(1, 0, EntryKind::Charge, 10_000),
            entry(2, 60, EntryKind::Payment, 3_000),
            entry(3, 120, EntryKind::Charge, 5_000),
            // Appended last but dated between the payment and the second charge.
            entry(4, 90, EntryKind::Reset, 0),
        ];
        assert_eq!(replay(&entries).unwrap(), Money::new(5_000));
    }

    #[test]
    fn same_timestamp_ties_break_on_insertion_order() {
        let entries = vec![
            entry(2, 0, EntryKind::Charge, 700),
            entry(1, 0, EntryKind::Reset, 100),
        ];
        // reset(100) then charge(700)
        assert_eq!(replay(&entries).unwrap(), Money::new(800));
    }

    #[test]
    fn replay_through_stops_at_key() {
        let entries = vec![
            entry(1, 0, EntryKind::Charge, 10_000),
            entry(2, 5, EntryKind::Payment, 3_000),
            entry(3, 10, EntryKind::Charge, 5_000),
        ];
        let key = entries[1].replay_key();
        assert_eq!(replay_through(&entries, key).unwrap(), Money::new(7_000));
    }

    #[test]
    fn stale_running_balances_are_reported() {
        let mut entries = vec![
            entry(1, 0, EntryKind::Charge, 10_000),
            entry(2, 1, EntryKind::Payment, 3_000),
        ];
        entries[0].running_balance = Money::new(10_000);
        entries[1].running_balance = Money::new(1);
        assert_eq!(
            stale_running_balances(&entries).unwrap(),
            vec![entries[1].id]
        );
    }

    #[test]
    fn overflow_is_a_consistency_fault() {
        let entries = vec![
            entry(1, 0, EntryKind::Charge, i64::MAX),
            entry(2, 1, EntryKind::Charge, 1),
        ];
        assert!(matches!(
            replay(&entries),
            Err(EngineError::ConsistencyFault(_))
        ));
    }

    #[test]
    fn model_with_unknown_kind_is_rejected() {
        let model = Model {
            id: Uuid::new_v4().to_string(),
            tenant_id: "t1".to_string(),
            supplier_id: Uuid::new_v4().to_string(),
            seq: 1,
            kind: "refund".to_string(),
            amount_minor: 100,
            occurred_at: Utc::now(),
            purchase_id: None,
            running_balance_minor: 100,
            note: None,
            created_at: Utc::now(),
        };
        assert!(matches!(
            LedgerEntry::try_from(model),
            Err(EngineError::ConsistencyFault(_))
        ));
    }
}
