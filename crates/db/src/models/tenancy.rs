//! Tenant, user and membership rows.

use campus_core::error::CoreError;
use campus_core::roles::Role;
use campus_core::tenancy::{Membership, Tenant, TenantService, TenantType, User};
use campus_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::error::corrupt;

#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: DbId,
    pub slug: String,
    pub name: String,
    pub tenant_type: String,
    pub enabled_services: Json<Vec<TenantService>>,
    pub active: bool,
    pub created_at: Timestamp,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = CoreError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let tenant_type =
            TenantType::parse(&row.tenant_type).ok_or_else(|| corrupt("tenant type", &row.tenant_type))?;
        Ok(Tenant {
            id: row.id,
            slug: row.slug,
            name: row.name,
            tenant_type,
            enabled_services: row.enabled_services.0,
            active: row.active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: DbId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub program_id: Option<DbId>,
    pub specialty: Option<String>,
    pub cohort_id: Option<DbId>,
    pub active: bool,
    pub created_at: Timestamp,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            display_name: row.display_name,
            program_id: row.program_id,
            specialty: row.specialty,
            cohort_id: row.cohort_id,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MembershipRow {
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub role: String,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = CoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        let role: Role = row.role.parse().map_err(|_| corrupt("role", &row.role))?;
        Ok(Membership {
            tenant_id: row.tenant_id,
            user_id: row.user_id,
            role,
        })
    }
}
