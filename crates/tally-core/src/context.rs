//! # Tenant Context
//!
//! Who is acting, and where. Every mutating service call takes one of these;
//! every query it runs is scoped by `tenant_id` (and `branch_id` where the
//! entity belongs to a branch).

use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, ValidationError};

/// The acting tenant, branch, and user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub branch_id: String,
    pub user_id: String,
    pub user_email: String,
}

impl TenantContext {
    /// Builds a context, rejecting blank fields.
    pub fn new(
        tenant_id: impl Into<String>,
        branch_id: impl Into<String>,
        user_id: impl Into<String>,
        user_email: impl Into<String>,
    ) -> CoreResult<Self> {
        let ctx = TenantContext {
            tenant_id: tenant_id.into(),
            branch_id: branch_id.into(),
            user_id: user_id.into(),
            user_email: user_email.into(),
        };
        ctx.validate()?;
        Ok(ctx)
    }

    /// Checks that no field is blank.
    pub fn validate(&self) -> CoreResult<()> {
        for (field, value) in [
            ("tenant_id", &self.tenant_id),
            ("branch_id", &self.branch_id),
            ("user_id", &self.user_id),
            ("user_email", &self.user_email),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::required(field).into());
            }
        }
        Ok(())
    }

    /// Same tenant and user, another branch.
    pub fn at_branch(&self, branch_id: impl Into<String>) -> CoreResult<Self> {
        TenantContext::new(
            self.tenant_id.clone(),
            branch_id,
            self.user_id.clone(),
            self.user_email.clone(),
        )
    }

    /// Same tenant and branch, another user.
    pub fn as_user(&self, user_id: impl Into<String>, user_email: impl Into<String>) -> CoreResult<Self> {
        TenantContext::new(
            self.tenant_id.clone(),
            self.branch_id.clone(),
            user_id,
            user_email,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn test_blank_fields_rejected() {
        assert!(TenantContext::new("t", "b", "u", "u@example.com").is_ok());
        let err = TenantContext::new("t", " ", "u", "u@example.com").unwrap_err();
        match err {
            CoreError::Validation(v) => assert_eq!(v.to_string(), "branch_id is required"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_derived_contexts() {
        let ctx = TenantContext::new("t", "b", "u", "u@example.com").unwrap();
        let other = ctx.at_branch("b2").unwrap();
        assert_eq!(other.branch_id, "b2");
        assert_eq!(other.user_id, "u");
        assert!(ctx.as_user("", "x@example.com").is_err());
    }
}
