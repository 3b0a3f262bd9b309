//! Tenants, users and memberships.
//!
//! A user may belong to several tenants; the role is per membership.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::roles::Role;
use crate::types::{DbId, Timestamp};

/// Slugs are lowercase ASCII words joined by single dashes.
const SLUG_PATTERN: &str = r"^[a-z0-9]+(?:-[a-z0-9]+)*$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantType {
    University,
    College,
    Vocational,
    School,
}

impl TenantType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::University => "university",
            Self::College => "college",
            Self::Vocational => "vocational",
            Self::School => "school",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "university" => Some(Self::University),
            "college" => Some(Self::College),
            "vocational" => Some(Self::Vocational),
            "school" => Some(Self::School),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantService {
    Chat,
    Calendar,
    Smtp,
    EmailAlias,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: DbId,
    pub slug: String,
    pub name: String,
    pub tenant_type: TenantType,
    pub enabled_services: Vec<TenantService>,
    pub active: bool,
    pub created_at: Timestamp,
}

impl Tenant {
    pub fn has_service(&self, service: TenantService) -> bool {
        self.enabled_services.contains(&service)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTenant {
    pub slug: String,
    pub name: String,
    pub tenant_type: TenantType,
    #[serde(default)]
    pub enabled_services: Vec<TenantService>,
}

impl NewTenant {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_slug(&self.slug)?;
        if self.name.trim().is_empty() {
            return Err(CoreError::BadInput("Tenant name must not be empty".into()));
        }
        Ok(())
    }
}

/// Validate a tenant slug.
pub fn validate_slug(slug: &str) -> Result<(), CoreError> {
    let re = regex::Regex::new(SLUG_PATTERN).map_err(|e| CoreError::Storage(e.to_string()))?;
    if slug.len() > 64 || !re.is_match(slug) {
        return Err(CoreError::BadInput(format!(
            "Invalid tenant slug '{slug}': use lowercase letters, digits and dashes"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: DbId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub program_id: Option<DbId>,
    pub specialty: Option<String>,
    pub cohort_id: Option<DbId>,
    pub active: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub program_id: Option<DbId>,
    pub cohort_id: Option<DbId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dashed_slug() {
        assert!(validate_slug("north-state-u").is_ok());
    }

    #[test]
    fn rejects_uppercase_and_trailing_dash() {
        assert!(validate_slug("North").is_err());
        assert!(validate_slug("north-").is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn tenant_type_round_trips_through_str() {
        for t in [
            TenantType::University,
            TenantType::College,
            TenantType::Vocational,
            TenantType::School,
        ] {
            assert_eq!(TenantType::parse(t.as_str()), Some(t));
        }
    }
}
