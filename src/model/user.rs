/// Row from `users`, as needed by login and token refresh.
#[derive(Debug, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub role_id: u8,
    pub is_superuser: bool,
    pub is_active: bool,
    pub employee_id: Option<u64>,
}
