use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, prelude::*};
use uuid::Uuid;

use crate::{
    AppendEntryCmd, EngineError, EntryKind, LedgerEntry, Money, ResultEngine, Supplier,
    ledger_entries::{self, replay, replay_through},
    suppliers,
    util::{normalize_optional_text, parse_uuid},
};

use super::{Engine, Posting, access::RowLock, with_tx, with_write_tx};

/// A ledger write before it gets its `seq` and running balance.
pub(super) struct NewEntry {
    pub kind: EntryKind,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
    pub purchase_id: Option<Uuid>,
    pub note: Option<String>,
}

impl Engine {
    /// Append a manual entry (payment, reset or charge) to a supplier ledger
    /// and recompute the supplier balance.
    pub async fn append_entry(&self, cmd: AppendEntryCmd) -> ResultEngine<Posting> {
        if cmd.amount.is_negative() {
            return Err(EngineError::InvalidAmount(format!(
                "amount must be >= 0, got {}",
                cmd.amount
            )));
        }

        with_write_tx!(self, &cmd.tenant_id, |db_tx| {
            let supplier = self
                .require_supplier(&db_tx, &cmd.tenant_id, cmd.supplier_id, RowLock::ForUpdate)
                .await?;
            let new_entry = NewEntry {
                kind: cmd.kind,
                amount: cmd.amount,
                occurred_at: cmd.occurred_at,
                purchase_id: None,
                note: normalize_optional_text(cmd.note.as_deref()),
            };
            let (entry, supplier) = self.append_entry_in(&db_tx, &supplier, new_entry).await?;
            Ok(Posting {
                supplier,
                entry,
                purchase: None,
            })
        })
    }

    /// The supplier ledger in replay order, each entry with the running
    /// balance cached when it was appended.
    pub async fn ledger(&self, tenant_id: &str, supplier_id: Uuid) -> ResultEngine<Vec<LedgerEntry>> {
        with_tx!(self, |db_tx| {
            let supplier = self
                .require_supplier(&db_tx, tenant_id, supplier_id, RowLock::Skip)
                .await?;
            self.load_entries(&db_tx, &supplier).await
        })
    }

    /// Running balance cached on an entry at append time.
    ///
    /// Audit display only: entries appended later with an earlier
    /// `occurred_at` do not rewrite it. The authoritative balance is
    /// [`Engine::recompute_balance`].
    pub async fn running_balance_at(&self, tenant_id: &str, entry_id: Uuid) -> ResultEngine<Money> {
        with_tx!(self, |db_tx| {
            let model = self
                .require_ledger_entry(&db_tx, tenant_id, entry_id, RowLock::Skip)
                .await?;
            Ok(Money::new(model.running_balance_minor))
        })
    }

    /// Replay the whole ledger of a supplier and store the result as its
    /// current balance.
    pub async fn recompute_balance(&self, tenant_id: &str, supplier_id: Uuid) -> ResultEngine<Money> {
        with_write_tx!(self, tenant_id, |db_tx| {
            let supplier = self
                .require_supplier(&db_tx, tenant_id, supplier_id, RowLock::ForUpdate)
                .await?;
            let stored = Money::new(supplier.current_balance_minor);
            let updated = self.recompute_balance_in(&db_tx, &supplier).await?;
            if updated.current_balance != stored {
                tracing::warn!(
                    tenant_id,
                    %supplier_id,
                    %stored,
                    recomputed = %updated.current_balance,
                    "corrected drifted supplier balance"
                );
            }
            Ok(updated.current_balance)
        })
    }

    /// Insert an entry for an already locked supplier, then recompute the
    /// balance.
    pub(super) async fn append_entry_in(
        &self,
        db: &DatabaseTransaction,
        supplier: &suppliers::Model,
        new_entry: NewEntry,
    ) -> ResultEngine<(LedgerEntry, Supplier)> {
        let existing = self.load_entries(db, supplier).await?;
        let seq = existing
            .iter()
            .map(|entry| entry.seq)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| EngineError::ConsistencyFault("ledger sequence overflows".to_string()))?;

        let before = replay_through(&existing, (new_entry.occurred_at, seq))?;
        let running_balance = new_entry
            .kind
            .apply(before, new_entry.amount)
            .ok_or_else(|| EngineError::InvalidAmount("balance too large".to_string()))?;

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            tenant_id: supplier.tenant_id.clone(),
            supplier_id: parse_uuid(&supplier.id, "supplier")?,
            seq,
            kind: new_entry.kind,
            amount: new_entry.amount,
            occurred_at: new_entry.occurred_at,
            purchase_id: new_entry.purchase_id,
            running_balance,
            note: new_entry.note,
        };

        // A stored ledger that already overflows is a fault; one that only
        // overflows with this entry is a bad request.
        replay(&existing)?;
        let mut with_new = existing;
        with_new.push(entry.clone());
        replay(&with_new)
            .map_err(|_| EngineError::InvalidAmount("balance too large".to_string()))?;

        let model: ledger_entries::ActiveModel = (&entry).into();
        model.insert(db).await?;

        tracing::debug!(
            supplier_id = %entry.supplier_id,
            kind = entry.kind.as_str(),
            amount = %entry.amount,
            seq,
            "ledger entry appended"
        );

        let supplier = self.recompute_balance_in(db, supplier).await?;
        Ok((entry, supplier))
    }

    /// Delete the entries created by posting `purchase_id`.
    ///
    /// Entries are otherwise immutable: this only runs when the purchase is
    /// deleted or its charge is replaced. The caller recomputes the balance.
    pub(super) async fn remove_purchase_entries_in(
        &self,
        db: &DatabaseTransaction,
        purchase_id: Uuid,
    ) -> ResultEngine<u64> {
        let removed = ledger_entries::Entity::delete_many()
            .filter(ledger_entries::Column::PurchaseId.eq(purchase_id.to_string()))
            .exec(db)
            .await?
            .rows_affected;
        tracing::debug!(%purchase_id, removed, "purchase entries removed");
        Ok(removed)
    }

    /// Replay the ledger of an already locked supplier into
    /// `current_balance`.
    pub(super) async fn recompute_balance_in(
        &self,
        db: &DatabaseTransaction,
        supplier: &suppliers::Model,
    ) -> ResultEngine<Supplier> {
        let entries = self.load_entries(db, supplier).await?;
        let balance = replay(&entries)?;

        let model = suppliers::ActiveModel {
            id: ActiveValue::Set(supplier.id.clone()),
            current_balance_minor: ActiveValue::Set(balance.minor()),
            ..Default::default()
        }
        .update(db)
        .await?;
        tracing::debug!(supplier_id = %supplier.id, %balance, entries = entries.len(), "supplier balance recomputed");
        Supplier::try_from(model)
    }
}
