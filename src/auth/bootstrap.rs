//! One-time administrative account setup, run from the CLI rather than at
//! server startup.

use anyhow::{Context, Result, anyhow, bail};
use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::auth::password::hash_password;
use crate::model::role::Role;

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Created(u64),
    AlreadyExists,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub role: Role,
    pub is_superuser: bool,
    pub employee_id: Option<u64>,
}

fn check(user: &NewUser<'_>) -> Result<()> {
    if user.username.trim().is_empty() {
        bail!("username must not be empty");
    }
    if user.password.len() < 8 {
        bail!("password must be at least 8 characters");
    }
    if user.role == Role::Employee && user.employee_id.is_none() {
        bail!("employee accounts must be linked to an employee record (--employee-id)");
    }
    Ok(())
}

/// Creates the user unless the username is already taken.
pub async fn create_user(pool: &MySqlPool, user: NewUser<'_>) -> Result<Outcome> {
    check(&user)?;

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ? LIMIT 1)",
    )
    .bind(user.username.trim())
    .fetch_one(pool)
    .await
    .context("Failed to look up user")?;

    if exists != 0 {
        warn!(username = user.username, "User already exists");
        return Ok(Outcome::AlreadyExists);
    }

    if let Some(employee_id) = user.employee_id {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM employees WHERE id = ? LIMIT 1)",
        )
        .bind(employee_id)
        .fetch_one(pool)
        .await
        .context("Failed to look up employee")?;
        if found == 0 {
            bail!("employee {employee_id} does not exist");
        }
    }

    let hashed = hash_password(user.password).map_err(|e| anyhow!("Failed to hash password: {e}"))?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password, role_id, is_superuser, employee_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.username.trim())
    .bind(hashed)
    .bind(user.role.id())
    .bind(user.is_superuser)
    .bind(user.employee_id)
    .execute(pool)
    .await
    .context("Failed to insert user")?;

    let id = result.last_insert_id();
    info!(user_id = id, username = user.username, role = ?user.role, "User created");
    Ok(Outcome::Created(id))
}

pub async fn create_admin(pool: &MySqlPool, username: &str, password: &str) -> Result<Outcome> {
    create_user(
        pool,
        NewUser {
            username,
            password,
            role: Role::Admin,
            is_superuser: true,
            employee_id: None,
        },
    )
    .await
}
