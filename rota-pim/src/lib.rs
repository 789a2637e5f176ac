//! Role to permission resolution and the authorization predicates applied
//! to an already verified principal.

pub mod catalog;
pub mod guard;

pub use catalog::{RoleCatalog, RoleEntry};
pub use guard::{
    require_any_role, require_permission, require_role, Principal,
    Requirement,
};
