use crate::auth::rbac::{self, Decision, ListScope, Target, Verb};
use crate::error::ApiError;
use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

/// Authenticated principal, placed in request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| {
                    ApiError::unauthorized("Authentication credentials were not provided.")
                }),
        )
    }
}

impl AuthUser {
    pub fn authorize(&self, verb: Verb, target: Target) -> Result<(), ApiError> {
        match rbac::authorize(self.role, self.employee_id, verb, target) {
            Decision::Allow => Ok(()),
            Decision::Deny => {
                tracing::debug!(
                    user_id = self.user_id,
                    role = ?self.role,
                    ?verb,
                    ?target,
                    "Access denied"
                );
                Err(ApiError::forbidden())
            }
        }
    }

    pub fn list_scope(&self) -> ListScope {
        rbac::list_scope(self.role, self.employee_id)
    }
}
