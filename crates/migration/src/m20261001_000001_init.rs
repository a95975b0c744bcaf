//! Initial schema.
//!
//! - `tenants`: pharmacies, the isolation boundary for every monetary row
//! - `tenant_members`: principal -> tenant mapping (exactly one per principal)
//! - `suppliers`: external parties with a cached ledger balance
//! - `sales` / `purchases`: aggregates whose total is derived from line items
//! - `line_items`: quantity x unit price children of a sale or a purchase
//! - `ledger_entries`: append-only supplier ledger (charge/payment/reset)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Tenants {
    Table,
    Id,
    Name,
    CreatedAt,
}

#[derive(Iden)]
enum TenantMembers {
    Table,
    Principal,
    TenantId,
}

#[derive(Iden)]
enum Suppliers {
    Table,
    Id,
    TenantId,
    Name,
    NameNorm,
    CurrentBalanceMinor,
    CreatedAt,
}

#[derive(Iden)]
enum Sales {
    Table,
    Id,
    TenantId,
    TotalMinor,
    Note,
    CreatedAt,
}

#[derive(Iden)]
enum Purchases {
    Table,
    Id,
    TenantId,
    SupplierId,
    TotalMinor,
    Reference,
    CreatedAt,
    PostedAt,
}

#[derive(Iden)]
enum LineItems {
    Table,
    Id,
    TenantId,
    AggregateKind,
    AggregateId,
    Position,
    Product,
    Quantity,
    UnitPriceMinor,
    SubtotalMinor,
    CreatedAt,
}

#[derive(Iden)]
enum LedgerEntries {
    Table,
    Id,
    TenantId,
    SupplierId,
    Seq,
    Kind,
    AmountMinor,
    OccurredAt,
    PurchaseId,
    RunningBalanceMinor,
    Note,
    CreatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Tenants
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Tenants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tenants::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Tenants::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(Tenants::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TenantMembers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TenantMembers::Principal)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TenantMembers::TenantId).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-tenant_members-tenant_id")
                            .from(TenantMembers::Table, TenantMembers::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Suppliers
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Suppliers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Suppliers::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Suppliers::TenantId).string().not_null())
                    .col(ColumnDef::new(Suppliers::Name).string().not_null())
                    .col(ColumnDef::new(Suppliers::NameNorm).string().not_null())
                    .col(
                        ColumnDef::new(Suppliers::CurrentBalanceMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Suppliers::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-suppliers-tenant_id")
                            .from(Suppliers::Table, Suppliers::TenantId)
                            .to(Tenants::Table, Tenants::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-suppliers-tenant_id-name_norm-unique")
                    .table(Suppliers::Table)
                    .col(Suppliers::TenantId)
                    .col(Suppliers::NameNorm)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Aggregates
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Sales::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sales::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Sales::TenantId).string().not_null())
                    .col(
                        ColumnDef::new(Sales::TotalMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Sales::Note).string())
                    .col(ColumnDef::new(Sales::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-sales-tenant_id")
                            .from(Sales::Table, Sales::TenantId)
                            .to(Tenants::Table, Tenants::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Purchases::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Purchases::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Purchases::TenantId).string().not_null())
                    .col(ColumnDef::new(Purchases::SupplierId).string().not_null())
                    .col(
                        ColumnDef::new(Purchases::TotalMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Purchases::Reference).string())
                    .col(ColumnDef::new(Purchases::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Purchases::PostedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-purchases-tenant_id")
                            .from(Purchases::Table, Purchases::TenantId)
                            .to(Tenants::Table, Tenants::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-purchases-supplier_id")
                            .from(Purchases::Table, Purchases::SupplierId)
                            .to(Suppliers::Table, Suppliers::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-sales-tenant_id")
                    .table(Sales::Table)
                    .col(Sales::TenantId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-purchases-tenant_id")
                    .table(Purchases::Table)
                    .col(Purchases::TenantId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Line items
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(LineItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LineItems::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LineItems::TenantId).string().not_null())
                    .col(ColumnDef::new(LineItems::AggregateKind).string().not_null())
                    .col(ColumnDef::new(LineItems::AggregateId).string().not_null())
                    .col(ColumnDef::new(LineItems::Position).integer().not_null())
                    .col(ColumnDef::new(LineItems::Product).string().not_null())
                    .col(ColumnDef::new(LineItems::Quantity).big_integer().not_null())
                    .col(
                        ColumnDef::new(LineItems::UnitPriceMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LineItems::SubtotalMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LineItems::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-line_items-tenant_id")
                            .from(LineItems::Table, LineItems::TenantId)
                            .to(Tenants::Table, Tenants::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-line_items-aggregate")
                    .table(LineItems::Table)
                    .col(LineItems::AggregateKind)
                    .col(LineItems::AggregateId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Ledger entries
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(LedgerEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerEntries::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LedgerEntries::TenantId).string().not_null())
                    .col(ColumnDef::new(LedgerEntries::SupplierId).string().not_null())
                    .col(ColumnDef::new(LedgerEntries::Seq).big_integer().not_null())
                    .col(ColumnDef::new(LedgerEntries::Kind).string().not_null())
                    .col(
                        ColumnDef::new(LedgerEntries::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerEntries::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::PurchaseId).string())
                    .col(
                        ColumnDef::new(LedgerEntries::RunningBalanceMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::Note).string())
                    .col(
                        ColumnDef::new(LedgerEntries::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-ledger_entries-tenant_id")
                            .from(LedgerEntries::Table, LedgerEntries::TenantId)
                            .to(Tenants::Table, Tenants::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-ledger_entries-supplier_id")
                            .from(LedgerEntries::Table, LedgerEntries::SupplierId)
                            .to(Suppliers::Table, Suppliers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-ledger_entries-purchase_id")
                            .from(LedgerEntries::Table, LedgerEntries::PurchaseId)
                            .to(Purchases::Table, Purchases::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-ledger_entries-supplier_id-seq-unique")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::SupplierId)
                    .col(LedgerEntries::Seq)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-ledger_entries-supplier_id-occurred_at")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::SupplierId)
                    .col(LedgerEntries::OccurredAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse creation order (FK dependencies).
        manager
            .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LineItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Purchases::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sales::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Suppliers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TenantMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tenants::Table).to_owned())
            .await?;
        Ok(())
    }
}
