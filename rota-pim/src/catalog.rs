use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use rota_slo::{errors, Result};

/// Read-only `role -> permissions` lookup table.
///
/// The JSON form mirrors the permissions file consumed at startup:
///
/// ```json
/// { "roles": { "admin": { "permissions": ["read:data", "delete:users"] } } }
/// ```
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct RoleCatalog {
    #[serde(default)]
    roles: HashMap<String, RoleEntry>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct RoleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl RoleCatalog {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(errors::any)
    }

    pub fn with_role<I, S>(mut self, role: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.insert(
            role.to_owned(),
            RoleEntry {
                description: None,
                permissions: permissions.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    pub fn permissions(&self, role: &str) -> Option<&BTreeSet<String>> {
        self.roles.get(role).map(|entry| &entry.permissions)
    }

    /// Union of the permissions granted by every role. Roles missing from
    /// the catalog grant nothing.
    pub fn resolve<S: AsRef<str>>(&self, roles: &[S]) -> BTreeSet<String> {
        let mut permissions = BTreeSet::new();
        for role in roles {
            match self.roles.get(role.as_ref()) {
                Some(entry) => {
                    permissions.extend(entry.permissions.iter().cloned())
                }
                None => tracing::debug!(
                    "role {} is not in the catalog",
                    role.as_ref()
                ),
            }
        }
        permissions
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> RoleCatalog {
        RoleCatalog::default()
            .with_role("user", ["read:data"])
            .with_role("admin", ["read:data", "write:data", "delete:users"])
    }

    #[test]
    fn resolve_unions_roles() {
        let permissions = catalog().resolve(&["user", "admin"]);
        assert_eq!(
            permissions.into_iter().collect::<Vec<_>>(),
            vec!["delete:users", "read:data", "write:data"]
        );
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        assert!(catalog().resolve(&["ghost"]).is_empty());
        assert_eq!(catalog().resolve(&["ghost", "user"]).len(), 1);
    }

    #[test]
    fn parse_permissions_file() {
        let catalog = RoleCatalog::from_json(
            r#"{
                "roles": {
                    "admin": {
                        "description": "everything",
                        "permissions": ["read:data", "delete:users"]
                    },
                    "user": { "permissions": ["read:data"] }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("admin"));
        assert!(catalog.permissions("admin").unwrap().contains("delete:users"));
        assert!(!catalog.permissions("user").unwrap().contains("delete:users"));
    }

    #[test]
    fn reject_invalid_file() {
        assert!(RoleCatalog::from_json(r#"{"roles": []}"#).is_err());
    }
}
