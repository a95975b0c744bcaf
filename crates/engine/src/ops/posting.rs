use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, DatabaseTransaction, prelude::*};
use uuid::Uuid;

use crate::{
    Aggregate, AggregateRef, EngineError, EntryKind, ResultEngine, Supplier, purchases,
};

use super::{Engine, Posting, access::RowLock, ledger::NewEntry, with_write_tx};

impl Engine {
    /// Post a purchase to its supplier ledger, dated now.
    ///
    /// See [`Engine::post_purchase_at`].
    pub async fn post_purchase(&self, tenant_id: &str, purchase_id: Uuid) -> ResultEngine<Posting> {
        self.post_purchase_at(tenant_id, purchase_id, Utc::now())
            .await
    }

    /// Post a purchase to its supplier ledger.
    ///
    /// Appends exactly one `charge` of the purchase total, tagged with the
    /// purchase id and dated `posted_at`. A purchase is posted at most once:
    /// a second call fails with [`EngineError::AlreadyPosted`] and writes
    /// nothing.
    pub async fn post_purchase_at(
        &self,
        tenant_id: &str,
        purchase_id: Uuid,
        posted_at: DateTime<Utc>,
    ) -> ResultEngine<Posting> {
        with_write_tx!(self, tenant_id, |db_tx| {
            let header = self
                .require_aggregate(
                    &db_tx,
                    tenant_id,
                    AggregateRef::purchase(purchase_id),
                    RowLock::ForUpdate,
                )
                .await?;
            if header.is_posted() {
                tracing::warn!(tenant_id, %purchase_id, "purchase already posted");
                return Err(EngineError::AlreadyPosted(format!("purchase {purchase_id}")));
            }
            let supplier = self.require_purchase_supplier(&db_tx, &header).await?;

            let mut purchase = self.recompute_total_in(&db_tx, header).await?;
            purchases::ActiveModel {
                id: ActiveValue::Set(purchase_id.to_string()),
                posted_at: ActiveValue::Set(Some(posted_at)),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            purchase.posted_at = Some(posted_at);

            let charge = NewEntry {
                kind: EntryKind::Charge,
                amount: purchase.total,
                occurred_at: posted_at,
                purchase_id: Some(purchase_id),
                note: purchase.label.clone(),
            };
            let (entry, supplier) = self.append_entry_in(&db_tx, &supplier, charge).await?;

            tracing::info!(
                tenant_id,
                %purchase_id,
                supplier_id = %supplier.id,
                amount = %entry.amount,
                balance = %supplier.current_balance,
                "purchase posted"
            );
            Ok(Posting {
                supplier,
                entry,
                purchase: Some(purchase),
            })
        })
    }

    /// Make the ledger charge of a posted purchase match its total.
    ///
    /// Stale (or missing, or duplicated) charges are removed and a single
    /// replacement is appended with the original posting date, so it keeps its
    /// place in replay order.
    pub(super) async fn sync_purchase_charge_in(
        &self,
        db: &DatabaseTransaction,
        purchase: &Aggregate,
    ) -> ResultEngine<Supplier> {
        let posted_at = purchase.posted_at.ok_or_else(|| {
            EngineError::ConsistencyFault(format!("purchase {} is not posted", purchase.id))
        })?;
        let supplier = self.require_purchase_supplier(db, purchase).await?;
        let charges = self.purchase_charges(db, purchase).await?;

        let in_sync = matches!(
            charges.as_slice(),
            [charge] if charge.kind == EntryKind::Charge && charge.amount == purchase.total
        );
        if in_sync {
            return Supplier::try_from(supplier);
        }

        self.remove_purchase_entries_in(db, purchase.id).await?;

        let note = charges
            .first()
            .and_then(|charge| charge.note.clone())
            .or_else(|| purchase.label.clone());
        let replacement = NewEntry {
            kind: EntryKind::Charge,
            amount: purchase.total,
            occurred_at: posted_at,
            purchase_id: Some(purchase.id),
            note,
        };
        let (entry, supplier) = self.append_entry_in(db, &supplier, replacement).await?;

        tracing::info!(
            purchase_id = %purchase.id,
            replaced = charges.len(),
            amount = %entry.amount,
            balance = %supplier.current_balance,
            "purchase charge replaced"
        );
        Ok(supplier)
    }
}
