use crate::{
    auth::{
        auth::AuthUser,
        rbac::{Target, Verb},
    },
    error::{ApiError, FieldErrors, ForeignKey, UniqueKey},
    model::employee::Employee,
    utils::{
        db_utils::{Conditions, Page, SqlValue, exists, fetch_page, order_by},
        validation::{
            WriteMode, double_option, email, invalid_pk, max_chars, non_blank, parse_date,
            required,
        },
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const COLUMNS: &str = "e.id, e.name, e.email, e.phone_number, e.address, e.date_of_joining, e.department_id";
const FROM: &str = "employees e LEFT JOIN departments d ON d.id = e.department_id";

const SEARCH: &[&str] = &["e.name", "e.email", "e.phone_number", "e.address", "d.name"];

const ORDERING: &[(&str, &str)] = &[
    ("name", "e.name"),
    ("date_of_joining", "e.date_of_joining"),
    ("department__name", "d.name"),
];

const UNIQUE_KEYS: &[UniqueKey] = &[UniqueKey {
    constraint: "uq_employees_email",
    field: "email",
    message: "employee with this email already exists.",
}];

const FOREIGN_KEYS: &[ForeignKey] = &[ForeignKey {
    constraint: "fk_employees_department",
    field: "department_id",
}];

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    /// Page number (20 per page)
    pub page: Option<i64>,
    /// Exact department id
    pub department: Option<u64>,
    /// Joined on or after (YYYY-MM-DD)
    #[serde(rename = "date_of_joining__gte")]
    #[param(value_type = Option<String>)]
    pub joined_from: Option<NaiveDate>,
    /// Joined on or before (YYYY-MM-DD)
    #[serde(rename = "date_of_joining__lte")]
    #[param(value_type = Option<String>)]
    pub joined_to: Option<NaiveDate>,
    /// Case-insensitive match on name, email, phone, address or department name
    pub search: Option<String>,
    /// Any of `name`, `date_of_joining`, `department__name`, `-` prefix for descending
    pub ordering: Option<String>,
}

impl EmployeeQuery {
    fn conditions(&self, auth: &AuthUser) -> Conditions {
        let mut c = Conditions::new();
        c.scope("e.id", auth.list_scope())
            .eq("e.department_id", self.department.map(SqlValue::U64))
            .gte("e.date_of_joining", self.joined_from.map(SqlValue::Date))
            .lte("e.date_of_joining", self.joined_to.map(SqlValue::Date))
            .search(SEARCH, self.search.as_deref());
        c
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EmployeePayload {
    #[schema(example = "Jane Doe")]
    pub name: Option<String>,
    #[schema(example = "jane.doe@company.com")]
    pub email: Option<String>,
    #[schema(example = "+8801712345678")]
    pub phone_number: Option<String>,
    #[schema(example = "12 Main Street")]
    pub address: Option<String>,
    #[schema(example = "2026-01-01", format = "date")]
    pub date_of_joining: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<u64>, example = 1)]
    pub department_id: Option<Option<u64>>,
}

#[derive(Debug)]
struct EmployeeFields {
    name: String,
    email: String,
    phone_number: String,
    address: String,
    date_of_joining: NaiveDate,
    department_id: Option<u64>,
}

impl EmployeePayload {
    fn into_fields(self, mode: WriteMode<'_, Employee>) -> Result<EmployeeFields, ApiError> {
        let mut errors = FieldErrors::new();
        let current = mode.for_required();
        let stored = mode.for_optional();

        let name = required(&mut errors, "name", self.name, current.map(|e| e.name.clone()))
            .unwrap_or_default();
        if errors.get("name").is_none() {
            non_blank(&mut errors, "name", &name);
            max_chars(&mut errors, "name", &name, 120);
        }

        let email_addr = required(&mut errors, "email", self.email, current.map(|e| e.email.clone()))
            .map(|e| e.trim().to_string())
            .unwrap_or_default();
        if errors.get("email").is_none() {
            email(&mut errors, "email", &email_addr);
            max_chars(&mut errors, "email", &email_addr, 254);
        }

        let phone_number = self
            .phone_number
            .or_else(|| stored.map(|e| e.phone_number.clone()))
            .unwrap_or_default();
        max_chars(&mut errors, "phone_number", &phone_number, 30);

        let address = self
            .address
            .or_else(|| stored.map(|e| e.address.clone()))
            .unwrap_or_default();

        let date_of_joining = match self.date_of_joining {
            Some(raw) => parse_date(&mut errors, "date_of_joining", &raw),
            None => required(
                &mut errors,
                "date_of_joining",
                None,
                current.map(|e| e.date_of_joining),
            ),
        };

        let department_id = match self.department_id {
            Some(value) => value,
            None => stored.and_then(|e| e.department_id),
        };

        match date_of_joining {
            Some(date_of_joining) => errors.finish(EmployeeFields {
                name: name.trim().to_string(),
                email: email_addr,
                phone_number: phone_number.trim().to_string(),
                address,
                date_of_joining,
                department_id,
            }),
            None => Err(ApiError::validation(errors)),
        }
    }
}

async fn check_department(pool: &MySqlPool, department_id: Option<u64>) -> Result<(), ApiError> {
    if let Some(id) = department_id {
        if !exists(pool, "departments", id).await? {
            return Err(ApiError::validation(FieldErrors::single(
                "department_id",
                invalid_pk(id),
            )));
        }
    }
    Ok(())
}

async fn fetch(pool: &MySqlPool, id: u64) -> Result<Employee, ApiError> {
    let sql = format!("SELECT {COLUMNS} FROM {FROM} WHERE e.id = ?");
    sqlx::query_as::<_, Employee>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee"))
}

/// List employees
#[utoipa::path(
    get,
    path = "/api/v1/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeePage),
        (status = 400, description = "Invalid filter value"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Invalid page")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Read, Target::Collection)?;
    let page = Page::from_query(query.page)?;

    let conditions = query.conditions(&auth);
    let order = order_by(query.ordering.as_deref(), ORDERING, "name", "e.id");
    let result =
        fetch_page::<Employee>(pool.get_ref(), COLUMNS, FROM, &conditions, &order, page).await?;

    Ok(HttpResponse::Ok().json(result))
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/v1/employees",
    request_body = EmployeePayload,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 400, description = "Validation failed", body = Object, example = json!({
            "message": "Validation failed",
            "errors": { "email": ["Enter a valid email address."] }
        })),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Email already in use", body = Object, example = json!({
            "message": "Conflict",
            "errors": { "email": ["employee with this email already exists."] }
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<EmployeePayload>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Create, Target::Collection)?;
    let fields = payload.into_inner().into_fields(WriteMode::Create)?;
    check_department(pool.get_ref(), fields.department_id).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (name, email, phone_number, address, date_of_joining, department_id)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&fields.name)
    .bind(&fields.email)
    .bind(&fields.phone_number)
    .bind(&fields.address)
    .bind(fields.date_of_joining)
    .bind(fields.department_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::from_write(e, UNIQUE_KEYS, FOREIGN_KEYS))?;

    let id = result.last_insert_id();
    info!(employee_id = id, user_id = auth.user_id, "Employee created");
    Ok(HttpResponse::Created().json(fetch(pool.get_ref(), id).await?))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/v1/employees/{id}",
    params(("id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 403, description = "Not your record"),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Read, Target::Collection)?;
    let employee = fetch(pool.get_ref(), path.into_inner()).await?;
    auth.authorize(Verb::Read, Target::Owned { owner: employee.id })?;
    Ok(HttpResponse::Ok().json(employee))
}

async fn write_update(
    auth: AuthUser,
    pool: &MySqlPool,
    id: u64,
    payload: EmployeePayload,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Update, Target::Collection)?;
    let current = fetch(pool, id).await?;
    auth.authorize(Verb::Update, Target::Owned { owner: current.id })?;

    let fields = payload.into_fields(WriteMode::update(&current, partial))?;
    if fields.department_id != current.department_id {
        check_department(pool, fields.department_id).await?;
    }

    sqlx::query(
        r#"
        UPDATE employees
        SET name = ?, email = ?, phone_number = ?, address = ?, date_of_joining = ?, department_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&fields.name)
    .bind(&fields.email)
    .bind(&fields.phone_number)
    .bind(&fields.address)
    .bind(fields.date_of_joining)
    .bind(fields.department_id)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| ApiError::from_write(e, UNIQUE_KEYS, FOREIGN_KEYS))?;

    info!(employee_id = id, user_id = auth.user_id, partial, "Employee updated");
    Ok(HttpResponse::Ok().json(fetch(pool, id).await?))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/v1/employees/{id}",
    params(("id" = u64, Path, description = "Employee ID")),
    request_body = EmployeePayload,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Email already in use")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<EmployeePayload>,
) -> Result<HttpResponse, ApiError> {
    write_update(auth, pool.get_ref(), path.into_inner(), payload.into_inner(), false).await
}

/// Partially update Employee
#[utoipa::path(
    patch,
    path = "/api/v1/employees/{id}",
    params(("id" = u64, Path, description = "Employee ID")),
    request_body = EmployeePayload,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Email already in use")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn patch_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<EmployeePayload>,
) -> Result<HttpResponse, ApiError> {
    write_update(auth, pool.get_ref(), path.into_inner(), payload.into_inner(), true).await
}

/// Delete Employee
///
/// Attendance and performance records of the employee are deleted with it.
#[utoipa::path(
    delete,
    path = "/api/v1/employees/{id}",
    params(("id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 204, description = "Successfully deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Delete, Target::Collection)?;
    let employee = fetch(pool.get_ref(), path.into_inner()).await?;
    auth.authorize(Verb::Delete, Target::Owned { owner: employee.id })?;

    sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee.id)
        .execute(pool.get_ref())
        .await?;

    info!(employee_id = employee.id, user_id = auth.user_id, "Employee deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    #[test]
    fn taken_email_is_a_conflict_on_email() {
        let err = ApiError::from_write(
            crate::error::store_error(
                sqlx::error::ErrorKind::UniqueViolation,
                "Duplicate entry 'jane@corp.io' for key 'employees.uq_employees_email'",
            ),
            UNIQUE_KEYS,
            FOREIGN_KEYS,
        );
        match err {
            ApiError::Conflict { errors, .. } => assert!(errors.get("email").is_some()),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    fn employee() -> Employee {
        Employee {
            id: 9,
            name: "Jane Doe".to_string(),
            email: "jane@corp.io".to_string(),
            phone_number: "555".to_string(),
            address: "Somewhere".to_string(),
            date_of_joining: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            department_id: Some(2),
        }
    }

    fn field_errors(err: ApiError) -> FieldErrors {
        match err {
            ApiError::Validation { errors, .. } => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn create_reports_every_missing_required_field() {
        let errors = field_errors(EmployeePayload::default().into_fields(WriteMode::Create).unwrap_err());
        for field in ["name", "email", "date_of_joining"] {
            assert_eq!(errors.get(field).unwrap(), [crate::error::REQUIRED.to_string()]);
        }
        assert!(errors.get("department_id").is_none());
    }

    #[test]
    fn bad_email_and_date_are_field_errors() {
        let payload: EmployeePayload = serde_json::from_str(
            r#"{"name": "A", "email": "nope", "date_of_joining": "01/02/2026"}"#,
        )
        .unwrap();
        let errors = field_errors(payload.into_fields(WriteMode::Create).unwrap_err());
        assert!(errors.get("email").is_some());
        assert!(errors.get("date_of_joining").is_some());
    }

    #[test]
    fn email_is_trimmed_but_keeps_case() {
        let payload: EmployeePayload = serde_json::from_str(
            r#"{"name": "A", "email": " Jane@Corp.IO ", "date_of_joining": "2026-01-05"}"#,
        )
        .unwrap();
        assert_eq!(payload.into_fields(WriteMode::Create).unwrap().email, "Jane@Corp.IO");
    }

    #[test]
    fn patch_merges_with_current_record() {
        let current = employee();
        let payload: EmployeePayload =
            serde_json::from_str(r#"{"phone_number": "777", "department_id": null}"#).unwrap();
        let fields = payload.into_fields(WriteMode::Patch(&current)).unwrap();

        assert_eq!(fields.name, "Jane Doe");
        assert_eq!(fields.phone_number, "777");
        assert_eq!(fields.department_id, None);
        assert_eq!(fields.date_of_joining, current.date_of_joining);
    }

    #[test]
    fn put_keeps_omitted_optional_fields() {
        let current = employee();
        let payload: EmployeePayload = serde_json::from_str(
            r#"{"name": "A", "email": "a@b.co", "date_of_joining": "2026-01-05"}"#,
        )
        .unwrap();
        let fields = payload.into_fields(WriteMode::Replace(&current)).unwrap();
        assert_eq!(fields.name, "A");
        assert_eq!(fields.department_id, Some(2));
        assert_eq!(fields.phone_number, "555");
        assert_eq!(fields.address, "Somewhere");
    }

    #[test]
    fn put_clears_department_with_explicit_null() {
        let current = employee();
        let payload: EmployeePayload = serde_json::from_str(
            r#"{"name": "A", "email": "a@b.co", "date_of_joining": "2026-01-05", "department_id": null}"#,
        )
        .unwrap();
        let fields = payload.into_fields(WriteMode::Replace(&current)).unwrap();
        assert_eq!(fields.department_id, None);
    }

    #[test]
    fn put_still_requires_required_fields() {
        let current = employee();
        let payload: EmployeePayload =
            serde_json::from_str(r#"{"department_id": 4}"#).unwrap();
        let errors = field_errors(payload.into_fields(WriteMode::Replace(&current)).unwrap_err());
        for field in ["name", "email", "date_of_joining"] {
            assert!(errors.get(field).is_some(), "{field} not required on PUT");
        }
    }

    #[test]
    fn create_leaves_optional_fields_empty() {
        let payload: EmployeePayload = serde_json::from_str(
            r#"{"name": "A", "email": "a@b.co", "date_of_joining": "2026-01-05"}"#,
        )
        .unwrap();
        let fields = payload.into_fields(WriteMode::Create).unwrap();
        assert_eq!(fields.phone_number, "");
        assert_eq!(fields.department_id, None);
    }

    #[test]
    fn filters_translate_to_where_clause() {
        let query: EmployeeQuery = parse_query(
            "department=3&date_of_joining__gte=2025-01-01&date_of_joining__lte=2025-12-31&search=eng",
        );
        let hr = AuthUser {
            user_id: 1,
            username: "hr".into(),
            role: Role::Hr,
            employee_id: None,
        };
        let c = query.conditions(&hr);
        assert!(c.where_clause().starts_with(
            "WHERE e.department_id = ? AND e.date_of_joining >= ? AND e.date_of_joining <= ? AND (LOWER(e.name) LIKE ?"
        ));
        assert_eq!(c.values().len(), 3 + SEARCH.len());
    }

    #[test]
    fn employee_role_lists_only_itself() {
        let query: EmployeeQuery = parse_query("");
        let me = AuthUser {
            user_id: 5,
            username: "me".into(),
            role: Role::Employee,
            employee_id: Some(9),
        };
        let c = query.conditions(&me);
        assert_eq!(c.where_clause(), "WHERE e.id = ?");
        assert_eq!(c.values(), [SqlValue::U64(9)]);
    }

    fn parse_query<T: serde::de::DeserializeOwned>(raw: &str) -> T {
        web::Query::<T>::from_query(raw).unwrap().into_inner()
    }
}
