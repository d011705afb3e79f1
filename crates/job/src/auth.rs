//! Request authorization.

use tracing::debug;

use tif_core::config::SecurityConfig;
use tif_core::CallerContext;

pub const NO_PERMISSIONS: &str = "Do not have permissions to resource";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny(String),
}

pub trait Authorizer: Send + Sync {
    fn authorize(&self, ctx: &CallerContext) -> AuthDecision;
}

/// Backend-role filtering.
///
/// Disabled: everyone passes. Enabled: admins pass, anonymous callers and
/// users without backend roles are denied.
pub struct BackendRoleFilter {
    enabled: bool,
}

impl BackendRoleFilter {
    pub fn new(config: &SecurityConfig) -> Self {
        Self { enabled: config.filter_by_backend_roles }
    }
}

impl Authorizer for BackendRoleFilter {
    fn authorize(&self, ctx: &CallerContext) -> AuthDecision {
        if !self.enabled {
            return AuthDecision::Allow;
        }
        match &ctx.principal {
            None => AuthDecision::Deny(NO_PERMISSIONS.into()),
            Some(user) if user.is_admin() => AuthDecision::Allow,
            Some(user) if user.backend_roles.is_empty() => {
                debug!(user = %user.name, "user has no backend roles");
                AuthDecision::Deny(NO_PERMISSIONS.into())
            }
            Some(_) => AuthDecision::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tif_core::{Principal, ADMIN_ROLE};

    fn filter(enabled: bool) -> BackendRoleFilter {
        BackendRoleFilter::new(&SecurityConfig { filter_by_backend_roles: enabled })
    }

    #[test]
    fn disabled_filter_allows_everyone() {
        assert_eq!(filter(false).authorize(&CallerContext::anonymous()), AuthDecision::Allow);
        let user = CallerContext::user(Principal::new("bob", &[], &[]));
        assert_eq!(filter(false).authorize(&user), AuthDecision::Allow);
    }

    #[test]
    fn enabled_filter_denies_anonymous() {
        assert_eq!(
            filter(true).authorize(&CallerContext::anonymous()),
            AuthDecision::Deny(NO_PERMISSIONS.into())
        );
    }

    #[test]
    fn enabled_filter_needs_backend_roles() {
        let without = CallerContext::user(Principal::new("bob", &[], &["readall"]));
        let with = CallerContext::user(Principal::new("alice", &["analysts"], &[]));
        assert!(matches!(filter(true).authorize(&without), AuthDecision::Deny(_)));
        assert_eq!(filter(true).authorize(&with), AuthDecision::Allow);
    }

    #[test]
    fn admins_bypass_the_filter() {
        let admin = CallerContext::user(Principal::new("root", &[], &[ADMIN_ROLE]));
        assert_eq!(filter(true).authorize(&admin), AuthDecision::Allow);
    }
}
