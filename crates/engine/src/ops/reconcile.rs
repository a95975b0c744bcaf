//! Consistency checks for derived values.
//!
//! A check never writes: it compares each cached value (aggregate total,
//! supplier balance, posted charge) with the value derived from the source
//! rows. [`Engine::repair_tenant`] then recomputes whatever drifted.

use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    Aggregate, AggregateKind, AggregateRef, EngineError, EntryKind, Money, ResultEngine,
    aggregates::derive_total,
    ledger_entries::{replay, stale_running_balances},
    purchases, sales, suppliers,
    util::parse_uuid,
};

use super::{Engine, access::RowLock, with_tx, with_write_tx};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconciliationSubject {
    Aggregate { kind: AggregateKind, id: Uuid },
    Supplier { id: Uuid },
}

/// Stored value against the value derived from scratch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub subject: ReconciliationSubject,
    pub stored: Money,
    pub recomputed: Money,
    pub consistent: bool,
}

impl Reconciliation {
    fn new(subject: ReconciliationSubject, stored: Money, recomputed: Money) -> Self {
        Self {
            subject,
            stored,
            recomputed,
            consistent: stored == recomputed,
        }
    }
}

/// A posted purchase whose ledger charge is missing, duplicated or of the
/// wrong amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChargeMismatch {
    pub purchase_id: Uuid,
    pub supplier_id: Uuid,
    pub total: Money,
    /// Sum of the charges found for the purchase.
    pub charged: Money,
    pub charges: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TenantReconciliation {
    pub tenant_id: String,
    pub aggregates: Vec<Reconciliation>,
    pub suppliers: Vec<Reconciliation>,
    pub charge_mismatches: Vec<ChargeMismatch>,
    /// Entries whose cached running balance differs from the replay.
    /// Informational: cached running balances are never rewritten.
    pub stale_running_balances: Vec<Uuid>,
}

impl TenantReconciliation {
    /// `true` when every total, balance and posted charge agrees with its
    /// source rows.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.aggregates.iter().all(|r| r.consistent)
            && self.suppliers.iter().all(|r| r.consistent)
            && self.charge_mismatches.is_empty()
    }

    /// Number of records that disagree with their source rows.
    #[must_use]
    pub fn drift_count(&self) -> usize {
        self.aggregates.iter().filter(|r| !r.consistent).count()
            + self.suppliers.iter().filter(|r| !r.consistent).count()
            + self.charge_mismatches.len()
    }
}

impl Engine {
    /// Compare the stored total of a sale or purchase with the sum of its
    /// items. Read-only.
    pub async fn reconcile_aggregate(
        &self,
        tenant_id: &str,
        aggregate: AggregateRef,
    ) -> ResultEngine<Reconciliation> {
        with_tx!(self, |db_tx| {
            let header = self
                .require_aggregate(&db_tx, tenant_id, aggregate, RowLock::Skip)
                .await?;
            self.reconcile_aggregate_in(&db_tx, &header).await
        })
    }

    /// Compare the stored balance of a supplier with the ledger replay.
    /// Read-only.
    pub async fn reconcile_supplier(
        &self,
        tenant_id: &str,
        supplier_id: Uuid,
    ) -> ResultEngine<Reconciliation> {
        with_tx!(self, |db_tx| {
            let supplier = self
                .require_supplier(&db_tx, tenant_id, supplier_id, RowLock::Skip)
                .await?;
            let (reconciliation, _) = self.reconcile_supplier_in(&db_tx, &supplier).await?;
            Ok(reconciliation)
        })
    }

    /// Check every sale, purchase and supplier of a tenant. Read-only.
    pub async fn reconcile_tenant(&self, tenant_id: &str) -> ResultEngine<TenantReconciliation> {
        with_tx!(self, |db_tx| {
            self.require_tenant(&db_tx, tenant_id).await?;
            self.reconcile_tenant_in(&db_tx, tenant_id).await
        })
    }

    /// Recompute every drifted total, posted charge and balance of a tenant,
    /// then return the report taken after the repair.
    pub async fn repair_tenant(&self, tenant_id: &str) -> ResultEngine<TenantReconciliation> {
        with_write_tx!(self, tenant_id, |db_tx| {
            self.require_tenant(&db_tx, tenant_id).await?;
            let before = self.reconcile_tenant_in(&db_tx, tenant_id).await?;
            if before.is_consistent() {
                return Ok(before);
            }

            // Aggregates first: fixing a posted purchase replaces its charge,
            // which in turn moves the supplier balance.
            let mut to_fix: Vec<AggregateRef> = before
                .aggregates
                .iter()
                .filter(|r| !r.consistent)
                .filter_map(|r| match r.subject {
                    ReconciliationSubject::Aggregate { kind, id } => Some(AggregateRef { kind, id }),
                    ReconciliationSubject::Supplier { .. } => None,
                })
                .collect();
            for mismatch in &before.charge_mismatches {
                let purchase = AggregateRef::purchase(mismatch.purchase_id);
                if !to_fix.contains(&purchase) {
                    to_fix.push(purchase);
                }
            }
            for aggregate in to_fix {
                let header = self
                    .require_aggregate(&db_tx, tenant_id, aggregate, RowLock::ForUpdate)
                    .await?;
                let stored = header.total;
                let fixed = self.recompute_total_in(&db_tx, header).await?;
                tracing::info!(
                    tenant_id,
                    kind = aggregate.kind.as_str(),
                    aggregate_id = %aggregate.id,
                    %stored,
                    total = %fixed.total,
                    "aggregate repaired"
                );
            }

            let supplier_models = suppliers::Entity::find()
                .filter(suppliers::Column::TenantId.eq(tenant_id.to_string()))
                .lock_exclusive()
                .all(&db_tx)
                .await?;
            for supplier in supplier_models {
                let (reconciliation, _) = self.reconcile_supplier_in(&db_tx, &supplier).await?;
                if !reconciliation.consistent {
                    let fixed = self.recompute_balance_in(&db_tx, &supplier).await?;
                    tracing::info!(
                        tenant_id,
                        supplier_id = %fixed.id,
                        stored = %reconciliation.stored,
                        balance = %fixed.current_balance,
                        "supplier balance repaired"
                    );
                }
            }

            let after = self.reconcile_tenant_in(&db_tx, tenant_id).await?;
            tracing::info!(
                tenant_id,
                repaired = before.drift_count(),
                remaining = after.drift_count(),
                "tenant repaired"
            );
            Ok(after)
        })
    }

    async fn reconcile_aggregate_in(
        &self,
        db: &DatabaseTransaction,
        header: &Aggregate,
    ) -> ResultEngine<Reconciliation> {
        let items = self.load_items(db, header).await?;
        let recomputed = derive_total(&items)?;
        let reconciliation = Reconciliation::new(
            ReconciliationSubject::Aggregate {
                kind: header.kind,
                id: header.id,
            },
            header.total,
            recomputed,
        );
        if !reconciliation.consistent {
            tracing::warn!(
                kind = header.kind.as_str(),
                aggregate_id = %header.id,
                stored = %header.total,
                %recomputed,
                "aggregate total drifted"
            );
        }
        Ok(reconciliation)
    }

    /// Balance check plus the ids of entries with a stale cached running
    /// balance.
    async fn reconcile_supplier_in(
        &self,
        db: &DatabaseTransaction,
        supplier: &suppliers::Model,
    ) -> ResultEngine<(Reconciliation, Vec<Uuid>)> {
        let entries = self.load_entries(db, supplier).await?;
        let recomputed = replay(&entries)?;
        let reconciliation = Reconciliation::new(
            ReconciliationSubject::Supplier {
                id: parse_uuid(&supplier.id, "supplier")?,
            },
            Money::new(supplier.current_balance_minor),
            recomputed,
        );
        if !reconciliation.consistent {
            tracing::warn!(
                supplier_id = %supplier.id,
                stored = %reconciliation.stored,
                %recomputed,
                "supplier balance drifted"
            );
        }
        Ok((reconciliation, stale_running_balances(&entries)?))
    }

    async fn charge_mismatch_in(
        &self,
        db: &DatabaseTransaction,
        purchase: &Aggregate,
        total: Money,
    ) -> ResultEngine<Option<ChargeMismatch>> {
        let charges = self.purchase_charges(db, purchase).await?;
        let charged = Money::checked_sum(charges.iter().map(|charge| charge.amount))
            .ok_or_else(|| {
                EngineError::ConsistencyFault(format!(
                    "charges of purchase {} overflow",
                    purchase.id
                ))
            })?;
        let in_sync = matches!(
            charges.as_slice(),
            [charge] if charge.kind == EntryKind::Charge && charge.amount == total
        );
        if in_sync {
            return Ok(None);
        }

        tracing::warn!(
            purchase_id = %purchase.id,
            %total,
            %charged,
            charges = charges.len(),
            "posted purchase charge drifted"
        );
        let supplier_id = purchase.supplier_id.ok_or_else(|| {
            EngineError::ConsistencyFault(format!(
                "purchase {} has no supplier",
                purchase.id
            ))
        })?;
        Ok(Some(ChargeMismatch {
            purchase_id: purchase.id,
            supplier_id,
            total,
            charged,
            charges: charges.len(),
        }))
    }

    async fn reconcile_tenant_in(
        &self,
        db: &DatabaseTransaction,
        tenant_id: &str,
    ) -> ResultEngine<TenantReconciliation> {
        let mut report = TenantReconciliation {
            tenant_id: tenant_id.to_string(),
            aggregates: Vec::new(),
            suppliers: Vec::new(),
            charge_mismatches: Vec::new(),
            stale_running_balances: Vec::new(),
        };

        let sale_models = sales::Entity::find()
            .filter(sales::Column::TenantId.eq(tenant_id.to_string()))
            .order_by_asc(sales::Column::CreatedAt)
            .all(db)
            .await?;
        for model in sale_models {
            let header = Aggregate::try_from(model)?;
            report
                .aggregates
                .push(self.reconcile_aggregate_in(db, &header).await?);
        }

        let purchase_models = purchases::Entity::find()
            .filter(purchases::Column::TenantId.eq(tenant_id.to_string()))
            .order_by_asc(purchases::Column::CreatedAt)
            .all(db)
            .await?;
        for model in purchase_models {
            let header = Aggregate::try_from(model)?;
            let reconciliation = self.reconcile_aggregate_in(db, &header).await?;
            if header.is_posted() {
                let mismatch = self
                    .charge_mismatch_in(db, &header, reconciliation.recomputed)
                    .await?;
                report.charge_mismatches.extend(mismatch);
            }
            report.aggregates.push(reconciliation);
        }

        let supplier_models = suppliers::Entity::find()
            .filter(suppliers::Column::TenantId.eq(tenant_id.to_string()))
            .order_by_asc(suppliers::Column::NameNorm)
            .all(db)
            .await?;
        for supplier in supplier_models {
            let (reconciliation, stale) = self.reconcile_supplier_in(db, &supplier).await?;
            report.suppliers.push(reconciliation);
            report.stale_running_balances.extend(stale);
        }

        tracing::debug!(
            tenant_id,
            aggregates = report.aggregates.len(),
            suppliers = report.suppliers.len(),
            drift = report.drift_count(),
            "tenant reconciled"
        );
        Ok(report)
    }
}
