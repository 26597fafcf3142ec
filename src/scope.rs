//! Tenant/company scoping.
//!
//! Every name, alias and contact lives inside a [`Scope`]. Resolution never
//! crosses a tenant boundary, and a company-scoped lookup only ever sees its
//! own company plus (optionally) the tenant-global slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

fn non_empty(value: impl Into<String>, field: &'static str) -> Result<String, ValidationError> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyIdentifier { field });
    }
    if trimmed.len() == value.len() {
        Ok(value)
    } else {
        Ok(trimmed.to_string())
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier, rejecting empty or whitespace-only values.
            ///
            /// # Errors
            /// Returns `ValidationError::EmptyIdentifier` for blank input.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                non_empty(value, $field).map(Self)
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of the tenant that owns a scope.
    TenantId,
    "tenant_id"
);

string_id!(
    /// Identifier of a company inside a tenant.
    CompanyId,
    "company_id"
);

string_id!(
    /// Identifier of the user a write is attributed to.
    UserId,
    "created_by_id"
);

/// The `(tenant, company?)` boundary within which names are compared.
///
/// A scope without a company is the tenant-global slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Owning tenant (required).
    pub tenant: TenantId,
    /// Owning company, `None` for tenant-global records.
    pub company: Option<CompanyId>,
}

impl Scope {
    /// Tenant-global scope.
    #[must_use]
    pub const fn tenant(tenant: TenantId) -> Self {
        Self {
            tenant,
            company: None,
        }
    }

    /// Company scope inside a tenant.
    #[must_use]
    pub const fn company(tenant: TenantId, company: CompanyId) -> Self {
        Self {
            tenant,
            company: Some(company),
        }
    }

    /// Builds a scope from raw identifiers.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyIdentifier` if the tenant id is blank, or
    /// if a company id is supplied but blank.
    pub fn parse(tenant: &str, company: Option<&str>) -> Result<Self, ValidationError> {
        Ok(Self {
            tenant: TenantId::new(tenant)?,
            company: company.map(CompanyId::new).transpose()?,
        })
    }

    /// Returns true for the tenant-global slot.
    #[must_use]
    pub const fn is_tenant_global(&self) -> bool {
        self.company.is_none()
    }

    /// Returns the tenant-global slot of the same tenant.
    #[must_use]
    pub fn tenant_global(&self) -> Self {
        Self::tenant(self.tenant.clone())
    }

    /// Storage slots visible from this scope, in precedence order.
    ///
    /// The exact slot always comes first. A company scope additionally sees
    /// the tenant-global slot when `inherit_tenant_global` is set.
    #[must_use]
    pub fn visible_slots(&self, inherit_tenant_global: bool) -> Vec<Self> {
        let mut slots = vec![self.clone()];
        if inherit_tenant_global && !self.is_tenant_global() {
            slots.push(self.tenant_global());
        }
        slots
    }

    /// Returns true if a record stored in `slot` is visible from this scope.
    #[must_use]
    pub fn can_see(&self, slot: &Self, inherit_tenant_global: bool) -> bool {
        if self.tenant != slot.tenant {
            return false;
        }
        match (&self.company, &slot.company) {
            (_, None) if self.company.is_none() || inherit_tenant_global => true,
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.company {
            Some(company) => write!(f, "{}/{company}", self.tenant),
            None => write!(f, "{}/*", self.tenant),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identifiers_are_rejected() {
        assert!(matches!(
            TenantId::new("   "),
            Err(ValidationError::EmptyIdentifier { field: "tenant_id" })
        ));
        assert!(matches!(
            Scope::parse("t1", Some("")),
            Err(ValidationError::EmptyIdentifier { field: "company_id" })
        ));
    }

    #[test]
    fn identifiers_are_trimmed() {
        let id = TenantId::new("  t1 ").unwrap();
        assert_eq!(id.as_str(), "t1");
    }

    #[test]
    fn visible_slots_respect_inheritance() {
        let scope = Scope::parse("t1", Some("c1")).unwrap();
        assert_eq!(scope.visible_slots(true).len(), 2);
        assert_eq!(scope.visible_slots(false), vec![scope.clone()]);

        let global = Scope::parse("t1", None).unwrap();
        assert_eq!(global.visible_slots(true), vec![global.clone()]);
    }

    #[test]
    fn can_see_never_crosses_tenants_or_companies() {
        let a_x = Scope::parse("a", Some("x")).unwrap();
        let a_y = Scope::parse("a", Some("y")).unwrap();
        let a = Scope::parse("a", None).unwrap();
        let b = Scope::parse("b", None).unwrap();

        assert!(a_x.can_see(&a_x, true));
        assert!(!a_y.can_see(&a_x, true));
        assert!(!b.can_see(&a_x, true));
        assert!(!b.can_see(&a, true));

        assert!(a_x.can_see(&a, true));
        assert!(!a_x.can_see(&a, false));
        assert!(a.can_see(&a, false));
        assert!(!a.can_see(&a_x, true));
    }

    #[test]
    fn serde_rejects_blank_tenant() {
        let parsed: Result<Scope, _> = serde_json::from_str(r#"{"tenant":" ","company":null}"#);
        assert!(parsed.is_err());

        let parsed: Scope = serde_json::from_str(r#"{"tenant":"t1","company":"c1"}"#).unwrap();
        assert_eq!(parsed.to_string(), "t1/c1");
    }
}
