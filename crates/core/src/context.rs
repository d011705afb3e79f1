//! Execution identity for requests entering the job workflow.
//!
//! Work past authorization runs under a [`SystemContext`], obtained by
//! stashing the caller's [`CallerContext`]. Stages receive the token as an
//! argument instead of reading ambient per-thread state.

use serde::{Deserialize, Serialize};

/// Role that bypasses backend-role filtering.
pub const ADMIN_ROLE: &str = "all_access";

/// Authenticated user as reported by the security layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    #[serde(default)]
    pub backend_roles: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(name: &str, backend_roles: &[&str], roles: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            backend_roles: backend_roles.iter().map(|s| s.to_string()).collect(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ADMIN_ROLE)
    }
}

/// Request-scoped identity. `principal` is `None` when security is disabled.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub principal: Option<Principal>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    pub fn user(principal: Principal) -> Self {
        Self { principal: Some(principal) }
    }

    /// Drop caller credentials; the workflow continues with system privilege.
    pub fn stash(self) -> SystemContext {
        SystemContext {
            on_behalf_of: self.principal.map(|p| p.name),
        }
    }
}

/// System-privileged execution token carried through the workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemContext {
    /// Name of the caller that triggered the work, kept for logging only.
    pub on_behalf_of: Option<String>,
}

impl SystemContext {
    pub fn initiator(&self) -> &str {
        self.on_behalf_of.as_deref().unwrap_or("system")
    }
}
