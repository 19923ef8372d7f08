//! Role based access control.
//!
//! Admin (and superusers, who are issued the Admin role) may do anything.
//! HR may do anything except delete. Every other authenticated role is
//! read-only and may only read records owned by its linked employee profile.

use actix_web::http::Method;

use crate::model::role::Role;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Verb {
    Read,
    Create,
    Update,
    Delete,
}

impl Verb {
    pub fn from_method(method: &Method) -> Self {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => Verb::Read,
            Method::POST => Verb::Create,
            Method::DELETE => Verb::Delete,
            _ => Verb::Update,
        }
    }
}

/// What the request acts on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Target {
    /// The resource as a whole, before any record is loaded.
    Collection,
    /// A loaded record belonging to the employee with this id.
    Owned { owner: u64 },
    /// A loaded record that belongs to nobody (departments).
    Shared,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Decision {
    Allow,
    Deny,
}

pub fn authorize(role: Role, own_employee: Option<u64>, verb: Verb, target: Target) -> Decision {
    match role {
        Role::Admin => Decision::Allow,
        Role::Hr if verb == Verb::Delete => Decision::Deny,
        Role::Hr => Decision::Allow,
        Role::Employee | Role::ApiUser => {
            if verb != Verb::Read {
                return Decision::Deny;
            }
            match target {
                Target::Collection | Target::Shared => Decision::Allow,
                Target::Owned { owner } if own_employee == Some(owner) => Decision::Allow,
                Target::Owned { .. } => Decision::Deny,
            }
        }
    }
}

/// Which rows a list query may return for a principal.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ListScope {
    All,
    OwnedBy(u64),
    Nothing,
}

pub fn list_scope(role: Role, own_employee: Option<u64>) -> ListScope {
    match role {
        Role::Admin | Role::Hr => ListScope::All,
        Role::Employee | Role::ApiUser => match own_employee {
            Some(id) => ListScope::OwnedBy(id),
            None => ListScope::Nothing,
        },
    }
}
