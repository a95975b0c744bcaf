use sea_orm::DatabaseConnection;
use serde::Serialize;

use crate::{Aggregate, LedgerEntry, LineItem, ResultEngine, Supplier};

mod access;
mod aggregates;
mod ledger;
mod line_items;
mod posting;
mod reconcile;
mod tenancy;

pub use reconcile::{ChargeMismatch, Reconciliation, ReconciliationSubject, TenantReconciliation};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
///
/// Early returns through `?` drop the transaction, which rolls it back.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = sea_orm::TransactionTrait::begin(&$self.database).await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

/// Like `with_tx!`, for operations that write.
///
/// The transaction first claims the writer slot of `tenant_id` (see
/// `Engine::claim_writer`), so concurrent writers queue before reading any
/// row instead of failing on a lock upgrade.
macro_rules! with_write_tx {
    ($self:expr, $tenant_id:expr, |$tx:ident| $body:expr) => {{
        let $tx = sea_orm::TransactionTrait::begin(&$self.database).await?;
        $self.claim_writer(&$tx, $tenant_id).await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use {with_tx, with_write_tx};

/// Entry point of the engine.
///
/// Cheap to clone: it only holds the pooled connection, so worker tasks can
/// each own a copy.
#[derive(Clone, Debug)]
pub struct Engine {
    database: DatabaseConnection,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// Result of a line-item mutation: the item and its parent with the freshly
/// recomputed total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineItemChange {
    pub item: LineItem,
    pub aggregate: Aggregate,
}

/// Result of a ledger write: the entry and the supplier with its recomputed
/// balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Posting {
    pub supplier: Supplier,
    pub entry: LedgerEntry,
    /// Set when the entry comes from posting a purchase.
    pub purchase: Option<Aggregate>,
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
        })
    }
}
