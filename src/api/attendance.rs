use crate::{
    auth::{
        auth::AuthUser,
        rbac::{Target, Verb},
    },
    error::{ApiError, FieldErrors, ForeignKey, UniqueKey},
    model::attendance::{Attendance, AttendanceStatus},
    utils::{
        db_utils::{Conditions, Page, SqlValue, exists, fetch_page, order_by},
        validation::{invalid_pk, parse_date, required},
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const COLUMNS: &str = "a.id, a.employee_id, a.date, a.status";
const FROM: &str = "attendance a \
    JOIN employees e ON e.id = a.employee_id \
    LEFT JOIN departments d ON d.id = e.department_id";

const SEARCH: &[&str] = &["e.name", "e.email", "d.name"];

const ORDERING: &[(&str, &str)] = &[("date", "a.date"), ("employee", "a.employee_id")];

const UNIQUE_KEYS: &[UniqueKey] = &[UniqueKey {
    constraint: "uq_attendance_employee_date",
    field: "non_field_errors",
    message: "The fields employee, date must make a unique set.",
}];

const FOREIGN_KEYS: &[ForeignKey] = &[ForeignKey {
    constraint: "fk_attendance_employee",
    field: "employee",
}];

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttendanceQuery {
    /// Page number (20 per page)
    pub page: Option<i64>,
    /// Exact employee id
    pub employee: Option<u64>,
    /// `Present`, `Absent` or `Late`
    #[param(value_type = Option<String>)]
    pub status: Option<AttendanceStatus>,
    /// Exact date (YYYY-MM-DD)
    #[param(value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    /// On or after (YYYY-MM-DD)
    #[serde(rename = "date__gte")]
    #[param(value_type = Option<String>)]
    pub date_from: Option<NaiveDate>,
    /// On or before (YYYY-MM-DD)
    #[serde(rename = "date__lte")]
    #[param(value_type = Option<String>)]
    pub date_to: Option<NaiveDate>,
    /// Case-insensitive match on employee name, email or department name
    pub search: Option<String>,
    /// `date` or `employee`, `-` prefix for descending
    pub ordering: Option<String>,
}

impl AttendanceQuery {
    fn conditions(&self, auth: &AuthUser) -> Conditions {
        let mut c = Conditions::new();
        c.scope("a.employee_id", auth.list_scope())
            .eq("a.employee_id", self.employee.map(SqlValue::U64))
            .eq(
                "a.status",
                self.status.map(|s| SqlValue::String(s.as_ref().to_string())),
            )
            .eq("a.date", self.date.map(SqlValue::Date))
            .gte("a.date", self.date_from.map(SqlValue::Date))
            .lte("a.date", self.date_to.map(SqlValue::Date))
            .search(SEARCH, self.search.as_deref());
        c
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AttendancePayload {
    #[schema(example = 12)]
    pub employee: Option<u64>,
    #[schema(example = "2026-03-02", format = "date")]
    pub date: Option<String>,
    #[schema(example = "Present")]
    pub status: Option<String>,
}

#[derive(Debug)]
struct AttendanceFields {
    employee_id: u64,
    date: NaiveDate,
    status: AttendanceStatus,
}

impl AttendancePayload {
    /// Full payload when `current` is `None`, partial update otherwise.
    fn into_fields(self, current: Option<&Attendance>) -> Result<AttendanceFields, ApiError> {
        let mut errors = FieldErrors::new();

        let employee_id = required(
            &mut errors,
            "employee",
            self.employee,
            current.map(|a| a.employee_id),
        );

        let date = match self.date {
            Some(raw) => parse_date(&mut errors, "date", &raw),
            None => required(&mut errors, "date", None, current.map(|a| a.date)),
        };

        let status = match self.status {
            Some(raw) => match raw.parse::<AttendanceStatus>() {
                Ok(status) => Some(status),
                Err(_) => {
                    errors.add("status", format!("\"{raw}\" is not a valid choice."));
                    None
                }
            },
            None => required(&mut errors, "status", None, current.map(|a| a.status)),
        };

        match (employee_id, date, status) {
            (Some(employee_id), Some(date), Some(status)) => errors.finish(AttendanceFields {
                employee_id,
                date,
                status,
            }),
            _ => Err(ApiError::validation(errors)),
        }
    }
}

async fn check_employee(pool: &MySqlPool, employee_id: u64) -> Result<(), ApiError> {
    if !exists(pool, "employees", employee_id).await? {
        return Err(ApiError::validation(FieldErrors::single(
            "employee",
            invalid_pk(employee_id),
        )));
    }
    Ok(())
}

async fn fetch(pool: &MySqlPool, id: u64) -> Result<Attendance, ApiError> {
    sqlx::query_as::<_, Attendance>(
        "SELECT id, employee_id, date, status FROM attendance WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Attendance record"))
}

/// List attendance records
#[utoipa::path(
    get,
    path = "/api/v1/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance list", body = AttendancePage),
        (status = 400, description = "Invalid filter value"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Invalid page")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Read, Target::Collection)?;
    let page = Page::from_query(query.page)?;

    let conditions = query.conditions(&auth);
    let order = order_by(query.ordering.as_deref(), ORDERING, "-date", "a.id");
    let result =
        fetch_page::<Attendance>(pool.get_ref(), COLUMNS, FROM, &conditions, &order, page).await?;

    Ok(HttpResponse::Ok().json(result))
}

/// Record attendance
///
/// One record per employee per day; a second record for the same day is a conflict.
#[utoipa::path(
    post,
    path = "/api/v1/attendance",
    request_body = AttendancePayload,
    responses(
        (status = 201, description = "Attendance recorded", body = Attendance),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Already recorded for this day", body = Object, example = json!({
            "message": "Conflict",
            "errors": { "non_field_errors": ["The fields employee, date must make a unique set."] }
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn create_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<AttendancePayload>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Create, Target::Collection)?;
    let fields = payload.into_inner().into_fields(None)?;
    check_employee(pool.get_ref(), fields.employee_id).await?;

    let result = sqlx::query("INSERT INTO attendance (employee_id, date, status) VALUES (?, ?, ?)")
        .bind(fields.employee_id)
        .bind(fields.date)
        .bind(fields.status.as_ref())
        .execute(pool.get_ref())
        .await
        .map_err(|e| ApiError::from_write(e, UNIQUE_KEYS, FOREIGN_KEYS))?;

    let id = result.last_insert_id();
    info!(
        attendance_id = id,
        employee_id = fields.employee_id,
        user_id = auth.user_id,
        "Attendance recorded"
    );
    Ok(HttpResponse::Created().json(fetch(pool.get_ref(), id).await?))
}

/// Get an attendance record
#[utoipa::path(
    get,
    path = "/api/v1/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance record ID")),
    responses(
        (status = 200, description = "Attendance record", body = Attendance),
        (status = 403, description = "Not your record"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn get_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Read, Target::Collection)?;
    let record = fetch(pool.get_ref(), path.into_inner()).await?;
    auth.authorize(Verb::Read, Target::Owned { owner: record.employee_id })?;
    Ok(HttpResponse::Ok().json(record))
}

async fn write_update(
    auth: AuthUser,
    pool: &MySqlPool,
    id: u64,
    payload: AttendancePayload,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Update, Target::Collection)?;
    let current = fetch(pool, id).await?;
    auth.authorize(Verb::Update, Target::Owned { owner: current.employee_id })?;

    let fields = payload.into_fields(partial.then_some(&current))?;
    if fields.employee_id != current.employee_id {
        check_employee(pool, fields.employee_id).await?;
    }

    sqlx::query("UPDATE attendance SET employee_id = ?, date = ?, status = ? WHERE id = ?")
        .bind(fields.employee_id)
        .bind(fields.date)
        .bind(fields.status.as_ref())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| ApiError::from_write(e, UNIQUE_KEYS, FOREIGN_KEYS))?;

    info!(attendance_id = id, user_id = auth.user_id, partial, "Attendance updated");
    Ok(HttpResponse::Ok().json(fetch(pool, id).await?))
}

/// Replace an attendance record
#[utoipa::path(
    put,
    path = "/api/v1/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance record ID")),
    request_body = AttendancePayload,
    responses(
        (status = 200, description = "Attendance updated", body = Attendance),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Already recorded for this day")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn update_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AttendancePayload>,
) -> Result<HttpResponse, ApiError> {
    write_update(auth, pool.get_ref(), path.into_inner(), payload.into_inner(), false).await
}

/// Partially update an attendance record
#[utoipa::path(
    patch,
    path = "/api/v1/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance record ID")),
    request_body = AttendancePayload,
    responses(
        (status = 200, description = "Attendance updated", body = Attendance),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Already recorded for this day")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn patch_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AttendancePayload>,
) -> Result<HttpResponse, ApiError> {
    write_update(auth, pool.get_ref(), path.into_inner(), payload.into_inner(), true).await
}

/// Delete an attendance record
#[utoipa::path(
    delete,
    path = "/api/v1/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance record ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn delete_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Delete, Target::Collection)?;
    let record = fetch(pool.get_ref(), path.into_inner()).await?;
    auth.authorize(Verb::Delete, Target::Owned { owner: record.employee_id })?;

    sqlx::query("DELETE FROM attendance WHERE id = ?")
        .bind(record.id)
        .execute(pool.get_ref())
        .await?;

    info!(attendance_id = record.id, user_id = auth.user_id, "Attendance deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_employee_and_day_is_a_conflict() {
        let err = ApiError::from_write(
            crate::error::store_error(
                sqlx::error::ErrorKind::UniqueViolation,
                "Duplicate entry '3-2026-03-02' for key 'attendance.uq_attendance_employee_date'",
            ),
            UNIQUE_KEYS,
            FOREIGN_KEYS,
        );
        match err {
            ApiError::Conflict { errors, .. } => assert_eq!(
                errors.get("non_field_errors").unwrap(),
                ["The fields employee, date must make a unique set.".to_string()]
            ),
            other => panic!("expected conflict, got {other:?}"),
        }
    }
    use crate::model::role::Role;

    fn field_errors(err: ApiError) -> FieldErrors {
        match err {
            ApiError::Validation { errors, .. } => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_status_is_not_a_valid_choice() {
        let payload: AttendancePayload =
            serde_json::from_str(r#"{"employee": 1, "date": "2026-03-02", "status": "Sick"}"#)
                .unwrap();
        let errors = field_errors(payload.into_fields(None).unwrap_err());
        assert_eq!(
            errors.get("status").unwrap(),
            ["\"Sick\" is not a valid choice.".to_string()]
        );
    }

    #[test]
    fn all_fields_required_on_create() {
        let errors = field_errors(AttendancePayload::default().into_fields(None).unwrap_err());
        for field in ["employee", "date", "status"] {
            assert!(errors.get(field).is_some(), "{field} should be required");
        }
    }

    #[test]
    fn patch_status_only() {
        let current = Attendance {
            id: 3,
            employee_id: 8,
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            status: AttendanceStatus::Present,
        };
        let payload: AttendancePayload = serde_json::from_str(r#"{"status": "Late"}"#).unwrap();
        let fields = payload.into_fields(Some(&current)).unwrap();
        assert_eq!(fields.employee_id, 8);
        assert_eq!(fields.date, current.date);
        assert_eq!(fields.status, AttendanceStatus::Late);
    }

    #[test]
    fn status_filter_binds_stored_spelling() {
        let query = web::Query::<AttendanceQuery>::from_query(
            "status=Absent&date__gte=2026-01-01&date__lte=2026-01-31",
        )
        .unwrap()
        .into_inner();
        let hr = AuthUser {
            user_id: 1,
            username: "hr".into(),
            role: Role::Hr,
            employee_id: None,
        };
        let c = query.conditions(&hr);
        assert_eq!(
            c.where_clause(),
            "WHERE a.status = ? AND a.date >= ? AND a.date <= ?"
        );
        assert_eq!(c.values()[0], SqlValue::String("Absent".into()));
    }

    #[test]
    fn invalid_status_filter_is_rejected_by_extractor() {
        assert!(web::Query::<AttendanceQuery>::from_query("status=Sick").is_err());
    }

    #[test]
    fn employee_role_lists_only_own_attendance() {
        let query = web::Query::<AttendanceQuery>::from_query("employee=99")
            .unwrap()
            .into_inner();
        let me = AuthUser {
            user_id: 2,
            username: "me".into(),
            role: Role::Employee,
            employee_id: Some(4),
        };
        let c = query.conditions(&me);
        // asking for someone else's rows yields the intersection: nothing
        assert_eq!(c.where_clause(), "WHERE a.employee_id = ? AND a.employee_id = ?");
        assert_eq!(c.values(), [SqlValue::U64(4), SqlValue::U64(99)]);
    }
}
