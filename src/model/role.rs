use serde::{Deserialize, Serialize};

/// Role carried in the access token. Superusers are issued `Admin`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    /// Service accounts and other authenticated principals; treated like `Employee`.
    ApiUser = 4,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            4 => Some(Role::ApiUser),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}
