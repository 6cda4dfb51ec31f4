//! The outcome of evaluating a request, handed back to the caller.

use crate::config::PathConfig;
use crate::token::Permission;

/// Permissions the caller holds for the current request and whether access
/// was granted.
///
/// A context created without evaluating any permission (disabled paths,
/// requests outside every protected path) answers every query with its
/// `granted` flag.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationContext {
    granted: bool,
    permissions: Vec<Permission>,
    path: Option<PathConfig>,
    evaluated: bool,
}

impl AuthorizationContext {
    pub fn empty(granted: bool) -> Self {
        Self {
            granted,
            permissions: Vec::new(),
            path: None,
            evaluated: false,
        }
    }

    /// A denied context carrying no permissions.
    pub fn denied() -> Self {
        Self::empty(false)
    }

    pub fn granted(permissions: Vec<Permission>, path: Option<PathConfig>) -> Self {
        Self {
            granted: true,
            permissions,
            path,
            evaluated: true,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Configuration of the path the request was matched to, if any.
    pub fn path_config(&self) -> Option<&PathConfig> {
        self.path.as_ref()
    }

    /// Whether a permission exists for `resource` (name or id) with `scope`,
    /// or any scope when `scope` is `None`.
    pub fn has_permission(&self, resource: &str, scope: Option<&str>) -> bool {
        if !self.evaluated {
            return self.granted;
        }
        self.permissions.iter().any(|permission| {
            let resource_matches = permission.resource_name.as_deref() == Some(resource)
                || permission.resource_id.as_deref() == Some(resource);
            resource_matches && scope.is_none_or(|scope| permission.scopes.contains(scope))
        })
    }

    pub fn has_resource_permission(&self, resource: &str) -> bool {
        self.has_permission(resource, None)
    }

    pub fn has_scope_permission(&self, scope: &str) -> bool {
        if !self.evaluated {
            return self.granted;
        }
        self.permissions
            .iter()
            .any(|permission| permission.scopes.contains(scope))
    }
}
