use std::{collections::BTreeSet, fmt};

use rota_slo::{errors, Result};

/// The parts of a verified identity the guard looks at.
pub trait Principal {
    fn subject(&self) -> &str;
    fn roles(&self) -> &[String];
    fn permissions(&self) -> &BTreeSet<String>;
}

pub fn require_permission<P: Principal + ?Sized>(
    principal: &P,
    permission: &str,
) -> Result<()> {
    if principal.permissions().contains(permission) {
        return Ok(());
    }
    tracing::debug!(
        "{} is missing permission {}",
        principal.subject(),
        permission
    );
    Err(errors::denied(
        &format!("permission `{}`", permission),
        principal.permissions().iter().cloned().collect(),
    ))
}

pub fn require_role<P: Principal + ?Sized>(
    principal: &P,
    role: &str,
) -> Result<()> {
    if principal.roles().iter().any(|r| r == role) {
        return Ok(());
    }
    tracing::debug!("{} is missing role {}", principal.subject(), role);
    Err(errors::denied(
        &format!("role `{}`", role),
        principal.roles().to_vec(),
    ))
}

pub fn require_any_role<P: Principal + ?Sized>(
    principal: &P,
    roles: &[&str],
) -> Result<()> {
    if roles
        .iter()
        .any(|role| principal.roles().iter().any(|r| r == role))
    {
        return Ok(());
    }
    Err(errors::denied(
        &format!("one of roles {:?}", roles),
        principal.roles().to_vec(),
    ))
}

/// A single gate a route table can attach to an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Permission(String),
    Role(String),
}

impl Requirement {
    pub fn check<P: Principal + ?Sized>(&self, principal: &P) -> Result<()> {
        match self {
            Self::Authenticated => Ok(()),
            Self::Permission(permission) => {
                require_permission(principal, permission)
            }
            Self::Role(role) => require_role(principal, role),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticated => write!(f, "authenticated"),
            Self::Permission(permission) => {
                write!(f, "permission `{}`", permission)
            }
            Self::Role(role) => write!(f, "role `{}`", role),
        }
    }
}
