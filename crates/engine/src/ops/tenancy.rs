use sea_orm::{ActiveValue, QueryFilter, QueryOrder, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine, Supplier, Tenant, suppliers, tenant_members, tenants,
    util::{name_key, normalize_required_name},
};

use super::{Engine, access::RowLock, with_tx, with_write_tx};

impl Engine {
    /// Add a new tenant (pharmacy) and return its id.
    pub async fn new_tenant(&self, name: &str) -> ResultEngine<String> {
        let name = normalize_required_name(name, "tenant")?;
        let tenant = Tenant::new(name.clone());
        let tenant_entry: tenants::ActiveModel = (&tenant).into();

        with_write_tx!(self, tenant.id.as_str(), |db_tx| {
            // Tenant names are unique, case-insensitive.
            let exists = tenants::Entity::find()
                .filter(Expr::cust("LOWER(name)").eq(name.to_lowercase()))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(name));
            }

            tenant_entry.insert(&db_tx).await?;
            tracing::info!(tenant_id = %tenant.id, "tenant created");
            Ok(tenant.id)
        })
    }

    pub async fn tenants(&self) -> ResultEngine<Vec<Tenant>> {
        let models = tenants::Entity::find()
            .order_by_asc(tenants::Column::Name)
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(Tenant::from).collect())
    }

    /// Associate `principal` with a tenant.
    ///
    /// A principal belongs to exactly one tenant: mapping it a second time is
    /// an [`EngineError::ExistingKey`], even to the same tenant.
    pub async fn add_member(&self, tenant_id: &str, principal: &str) -> ResultEngine<()> {
        let principal = principal.trim();
        if principal.is_empty() {
            return Err(EngineError::InvalidAmount(
                "principal must not be empty".to_string(),
            ));
        }

        with_write_tx!(self, tenant_id, |db_tx| {
            self.require_tenant(&db_tx, tenant_id).await?;

            if tenant_members::Entity::find_by_id(principal.to_string())
                .one(&db_tx)
                .await?
                .is_some()
            {
                return Err(EngineError::ExistingKey(principal.to_string()));
            }

            tenant_members::ActiveModel {
                principal: ActiveValue::Set(principal.to_string()),
                tenant_id: ActiveValue::Set(tenant_id.to_string()),
            }
            .insert(&db_tx)
            .await?;
            tracing::info!(tenant_id, principal, "member added");
            Ok(())
        })
    }

    /// Resolve the tenant of an authenticated principal.
    ///
    /// Every other operation takes the returned id; a caller without an
    /// association gets [`EngineError::NoTenantAssociation`] and must not be
    /// served.
    pub async fn resolve_tenant(&self, principal: &str) -> ResultEngine<String> {
        tenant_members::Entity::find_by_id(principal.trim().to_string())
            .one(&self.database)
            .await?
            .map(|member| member.tenant_id)
            .ok_or_else(|| {
                tracing::warn!(principal, "principal has no tenant");
                EngineError::NoTenantAssociation(principal.to_string())
            })
    }

    /// Add a supplier to the tenant. Names are unique per tenant, compared
    /// without case or accents.
    pub async fn new_supplier(&self, tenant_id: &str, name: &str) -> ResultEngine<Supplier> {
        let name = normalize_required_name(name, "supplier")?;
        let key = name_key(&name);
        if key.is_empty() {
            return Err(EngineError::InvalidAmount(format!(
                "supplier name \"{name}\" has no letters or digits"
            )));
        }

        let supplier = Supplier::new(tenant_id, name.clone());
        let mut supplier_entry: suppliers::ActiveModel = (&supplier).into();
        supplier_entry.name_norm = ActiveValue::Set(key.clone());

        with_write_tx!(self, tenant_id, |db_tx| {
            self.require_tenant(&db_tx, tenant_id).await?;

            let exists = suppliers::Entity::find()
                .filter(suppliers::Column::TenantId.eq(tenant_id.to_string()))
                .filter(suppliers::Column::NameNorm.eq(key))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(name));
            }

            supplier_entry.insert(&db_tx).await?;
            tracing::info!(tenant_id, supplier_id = %supplier.id, "supplier created");
            Ok(supplier)
        })
    }

    pub async fn supplier(&self, tenant_id: &str, supplier_id: Uuid) -> ResultEngine<Supplier> {
        with_tx!(self, |db_tx| {
            let model = self
                .require_supplier(&db_tx, tenant_id, supplier_id, RowLock::Skip)
                .await?;
            Supplier::try_from(model)
        })
    }

    pub async fn list_suppliers(&self, tenant_id: &str) -> ResultEngine<Vec<Supplier>> {
        let models = suppliers::Entity::find()
            .filter(suppliers::Column::TenantId.eq(tenant_id.to_string()))
            .order_by_asc(suppliers::Column::NameNorm)
            .all(&self.database)
            .await?;
        models.into_iter().map(Supplier::try_from).collect()
    }
}
