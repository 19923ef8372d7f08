use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use crate::models::TokenType;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;
use tracing::debug;

fn reject(req: ServiceRequest, message: &str) -> ServiceResponse<BoxBody> {
    debug!(path = %req.path(), reason = message, "Rejected unauthenticated request");
    let resp = HttpResponse::Unauthorized()
        .insert_header(("WWW-Authenticate", "Bearer"))
        .json(json!({ "message": message }));
    req.into_response(resp.map_into_boxed_body())
}

/// Verifies the bearer access token and stores the resulting `AuthUser`
/// in request extensions. Every failure is a uniform 401.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?
        .clone();

    let token = match req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(t) => t.trim().to_string(),
        None => return Ok(reject(req, "Authentication credentials were not provided.")),
    };

    let claims = match verify_token(&token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return Ok(reject(req, "Given token not valid for any token type")),
    };

    if claims.token_type != TokenType::Access {
        return Ok(reject(req, "Token has wrong type"));
    }

    let role = match Role::from_id(claims.role) {
        Some(role) => role,
        None => return Ok(reject(req, "Invalid role")),
    };

    let auth_user = AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        employee_id: claims.employee_id,
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
