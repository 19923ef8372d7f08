use crate::{
    auth::{
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::verify_password,
    },
    config::Config,
    error::ApiError,
    model::{role::Role, user::User},
    models::{Claims, LoginReqDto, RefreshReqDto, TokenPairResponse, TokenType},
};
use actix_web::{HttpResponse, web};
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{debug, error, info, instrument};

const USER_COLUMNS: &str =
    "id, username, password, role_id, is_superuser, is_active, employee_id";

const BAD_CREDENTIALS: &str = "No active account found with the given credentials";

fn subject_for(user: &User) -> TokenSubject {
    // superusers are always issued the Admin role
    let role = if user.is_superuser {
        Role::Admin.id()
    } else {
        user.role_id
    };
    TokenSubject {
        user_id: user.id,
        username: user.username.clone(),
        role,
        employee_id: user.employee_id,
    }
}

/// Issues an access + refresh pair and records the refresh `jti`.
async fn issue_pair(
    tx: &mut Transaction<'_, MySql>,
    user: &User,
    config: &Config,
) -> Result<TokenPairResponse, ApiError> {
    let subject = subject_for(user);

    debug!("Generating access token");
    let access_token = generate_access_token(&subject, &config.jwt_secret, config.access_token_ttl)
        .map_err(|e| ApiError::internal(format!("failed to sign access token: {e}")))?;

    debug!("Generating refresh token");
    let (refresh_token, refresh_claims) =
        generate_refresh_token(&subject, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(|e| ApiError::internal(format!("failed to sign refresh token: {e}")))?;

    debug!(user_id = user.id, jti = %refresh_claims.jti, "Storing refresh token");
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user.id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to store refresh token");
        ApiError::from(e)
    })?;

    Ok(TokenPairResponse {
        access_token,
        refresh_token,
    })
}

async fn fetch_user_by_username(pool: &MySqlPool, username: &str) -> Result<Option<User>, ApiError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?)
}

/// Decodes a refresh token; access tokens and garbage are both a 401.
fn refresh_claims(token: &str, config: &Config) -> Result<Claims, ApiError> {
    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::unauthorized("Token is invalid or expired"))?;
    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::unauthorized("Token has wrong type"));
    }
    Ok(claims)
}

/// Obtain a token pair
#[utoipa::path(
    post,
    path = "/api/auth/token",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPairResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials or inactive account")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        let mut errors = crate::error::FieldErrors::new();
        if user.username.trim().is_empty() {
            errors.add("username", "This field may not be blank.");
        }
        if user.password.is_empty() {
            errors.add("password", "This field may not be blank.");
        }
        return Err(ApiError::validation(errors));
    }

    debug!("Fetching user from database");
    let db_user = match fetch_user_by_username(pool.get_ref(), user.username.trim()).await? {
        Some(u) if u.is_active => u,
        Some(_) => {
            info!("Invalid credentials: account inactive");
            return Err(ApiError::unauthorized(BAD_CREDENTIALS));
        }
        None => {
            info!("Invalid credentials: user not found");
            return Err(ApiError::unauthorized(BAD_CREDENTIALS));
        }
    };

    debug!("Verifying password");
    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    }

    let mut tx = pool.begin().await?;
    let pair = issue_pair(&mut tx, &db_user, &config).await?;
    tx.commit().await?;

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = db_user.id, "Login successful");
    Ok(HttpResponse::Ok().json(pair))
}

#[derive(sqlx::FromRow)]
struct RefreshRecord {
    id: u64,
    user_id: u64,
}

/// Exchange a refresh token for a new token pair
///
/// The presented refresh token is revoked; a revoked or unknown token is a 401.
#[utoipa::path(
    post,
    path = "/api/auth/token/refresh",
    request_body = RefreshReqDto,
    responses(
        (status = 200, description = "New token pair", body = TokenPairResponse),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_refresh", skip_all)]
pub async fn refresh_token(
    body: web::Json<RefreshReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let claims = refresh_claims(&body.refresh_token, &config)?;

    let mut tx = pool.begin().await?;

    let record = sqlx::query_as::<_, RefreshRecord>(
        r#"
        SELECT id, user_id
        FROM refresh_tokens
        WHERE jti = ? AND revoked = FALSE AND expires_at > NOW()
        FOR UPDATE
        "#,
    )
    .bind(&claims.jti)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::unauthorized("Token is invalid or expired"))?;

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ?")
        .bind(record.id)
        .execute(&mut *tx)
        .await?;

    // role or profile link may have changed since the token was issued
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let user = match sqlx::query_as::<_, User>(&sql)
        .bind(record.user_id)
        .fetch_optional(&mut *tx)
        .await?
    {
        Some(u) if u.is_active => u,
        _ => {
            tx.commit().await?;
            return Err(ApiError::unauthorized(BAD_CREDENTIALS));
        }
    };

    let pair = issue_pair(&mut tx, &user, &config).await?;
    tx.commit().await?;

    debug!(user_id = user.id, "Refresh token rotated");
    Ok(HttpResponse::Ok().json(pair))
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = RefreshReqDto,
    responses(
        (status = 204, description = "Refresh token revoked (idempotent)")
    ),
    tag = "Auth"
)]
pub async fn logout(
    body: web::Json<RefreshReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    // unknown or malformed tokens still get a 204
    let Ok(claims) = refresh_claims(&body.refresh_token, &config) else {
        return Ok(HttpResponse::NoContent().finish());
    };

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role_id: u8, is_superuser: bool) -> User {
        User {
            id: 1,
            username: "root".to_string(),
            password: String::new(),
            role_id,
            is_superuser,
            is_active: true,
            employee_id: None,
        }
    }

    #[test]
    fn superuser_is_issued_admin_role() {
        assert_eq!(subject_for(&user(Role::Employee.id(), true)).role, Role::Admin.id());
        assert_eq!(subject_for(&user(Role::Hr.id(), false)).role, Role::Hr.id());
    }

    #[test]
    fn access_token_is_not_accepted_for_refresh() {
        let config = crate::config::test_config();
        let access =
            generate_access_token(&subject_for(&user(2, false)), &config.jwt_secret, 60).unwrap();
        let err = refresh_claims(&access, &config).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
