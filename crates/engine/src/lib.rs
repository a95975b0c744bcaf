//! Derived-total and supplier-ledger engine for a multi-tenant pharmacy
//! backend.
//!
//! Two cooperating parts:
//!
//! - the **aggregate** side keeps `sales.total` / `purchases.total` equal to the
//!   sum of their line items, recomputed from scratch on every write;
//! - the **ledger** side keeps `suppliers.current_balance` equal to the replay
//!   of the supplier's append-only ledger (charge / payment / reset).
//!
//! Posting a purchase links the two: it appends exactly one `charge` entry of
//! the purchase total to the supplier ledger.
//!
//! Every operation takes the caller's tenant id (see
//! [`Engine::resolve_tenant`]) and only ever sees rows of that tenant.

pub use aggregates::{Aggregate, AggregateKind, AggregateRef};
pub use commands::{AddLineItemCmd, AppendEntryCmd, UpdateLineItemCmd};
pub use error::{EngineError, ErrorClass};
pub use ledger_entries::{EntryKind, LedgerEntry};
pub use line_items::LineItem;
pub use money::Money;
pub use ops::{
    ChargeMismatch, Engine, EngineBuilder, LineItemChange, Posting, Reconciliation,
    ReconciliationSubject, TenantReconciliation,
};
pub use suppliers::Supplier;
pub use tenants::Tenant;

mod aggregates;
mod commands;
mod error;
mod ledger_entries;
mod line_items;
mod money;
mod ops;
mod purchases;
mod sales;
mod suppliers;
mod tenant_members;
mod tenants;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
