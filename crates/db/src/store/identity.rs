use campus_core::error::CoreResult;
use campus_core::store::IdentityStore;
use campus_core::tenancy::{Membership, NewTenant, NewUser, Tenant, User};
use campus_core::types::DbId;

use super::PgStore;
use crate::error::map_db_error;
use crate::health_check;
use crate::repositories::{TenantRepo, UserRepo};

#[async_trait::async_trait]
impl IdentityStore for PgStore {
    async fn ping(&self) -> CoreResult<()> {
        health_check(&self.pool).await.map_err(map_db_error)
    }

    async fn create_tenant(&self, input: &NewTenant) -> CoreResult<Tenant> {
        let row = TenantRepo::create(&self.pool, input).await.map_err(map_db_error)?;
        Tenant::try_from(row)
    }

    async fn tenant(&self, id: DbId) -> CoreResult<Option<Tenant>> {
        TenantRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_db_error)?
            .map(Tenant::try_from)
            .transpose()
    }

    async fn deactivate_tenant(&self, id: DbId) -> CoreResult<bool> {
        TenantRepo::deactivate(&self.pool, id).await.map_err(map_db_error)
    }

    async fn create_user(&self, input: &NewUser) -> CoreResult<User> {
        let row = UserRepo::create(&self.pool, input).await.map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn user(&self, id: DbId) -> CoreResult<Option<User>> {
        let row = UserRepo::find_by_id(&self.pool, id).await.map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn user_by_username(&self, username: &str) -> CoreResult<Option<User>> {
        let row = UserRepo::find_by_username(&self.pool, username)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn upsert_membership(&self, membership: &Membership) -> CoreResult<()> {
        UserRepo::upsert_membership(&self.pool, membership)
            .await
            .map_err(map_db_error)
    }

    async fn membership(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Option<Membership>> {
        UserRepo::find_membership(&self.pool, tenant_id, user_id)
            .await
            .map_err(map_db_error)?
            .map(Membership::try_from)
            .transpose()
    }
}
