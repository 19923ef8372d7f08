use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::analytics::UNASSIGNED,
    auth::{
        auth::AuthUser,
        rbac::{Target, Verb},
    },
    error::{ApiError, FieldErrors, UniqueKey},
    model::department::Department,
    utils::{
        db_utils::{Conditions, Page, fetch_page, order_by},
        validation::{WriteMode, double_option, max_chars, non_blank, required},
    },
};

const COLUMNS: &str = "d.id, d.name, d.description";
const FROM: &str = "departments d";

const ORDERING: &[(&str, &str)] = &[("name", "d.name")];

const UNIQUE_KEYS: &[UniqueKey] = &[UniqueKey {
    constraint: "uq_departments_name",
    field: "name",
    message: "department with this name already exists.",
}];

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DepartmentQuery {
    /// Page number (20 per page)
    pub page: Option<i64>,
    /// Case-insensitive match on name or description
    pub search: Option<String>,
    /// `name` or `-name`
    pub ordering: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DepartmentPayload {
    #[schema(example = "Engineering")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, example = "Builds and runs the product")]
    pub description: Option<Option<String>>,
}

#[derive(Debug)]
struct DepartmentFields {
    name: String,
    description: Option<String>,
}

impl DepartmentPayload {
    fn into_fields(self, mode: WriteMode<'_, Department>) -> Result<DepartmentFields, ApiError> {
        let mut errors = FieldErrors::new();

        let name = required(
            &mut errors,
            "name",
            self.name,
            mode.for_required().map(|d| d.name.clone()),
        )
        .unwrap_or_default();
        if errors.get("name").is_none() {
            non_blank(&mut errors, "name", &name);
            max_chars(&mut errors, "name", &name, 100);
            // the headcount chart uses this label for employees with no department
            if name.trim().eq_ignore_ascii_case(UNASSIGNED) {
                errors.add("name", format!("\"{UNASSIGNED}\" is a reserved name."));
            }
        }

        let description = match self.description {
            Some(value) => value,
            None => mode.for_optional().and_then(|d| d.description.clone()),
        };

        errors.finish(DepartmentFields {
            name: name.trim().to_string(),
            description,
        })
    }
}

async fn fetch(pool: &MySqlPool, id: u64) -> Result<Department, ApiError> {
    let sql = format!("SELECT {COLUMNS} FROM {FROM} WHERE d.id = ?");
    sqlx::query_as::<_, Department>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Department"))
}

/// List departments
#[utoipa::path(
    get,
    path = "/api/v1/departments",
    params(DepartmentQuery),
    responses(
        (status = 200, description = "Paginated department list", body = DepartmentPage),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Invalid page")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn list_departments(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<DepartmentQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Read, Target::Collection)?;
    let page = Page::from_query(query.page)?;

    let mut conditions = Conditions::new();
    conditions.search(&["d.name", "d.description"], query.search.as_deref());

    let order = order_by(query.ordering.as_deref(), ORDERING, "name", "d.id");
    let result =
        fetch_page::<Department>(pool.get_ref(), COLUMNS, FROM, &conditions, &order, page).await?;

    Ok(HttpResponse::Ok().json(result))
}

/// Create a department
#[utoipa::path(
    post,
    path = "/api/v1/departments",
    request_body = DepartmentPayload,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Name already taken")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<DepartmentPayload>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Create, Target::Collection)?;
    let fields = payload.into_inner().into_fields(WriteMode::Create)?;

    let result = sqlx::query("INSERT INTO departments (name, description) VALUES (?, ?)")
        .bind(&fields.name)
        .bind(&fields.description)
        .execute(pool.get_ref())
        .await
        .map_err(|e| ApiError::from_write(e, UNIQUE_KEYS, &[]))?;

    let id = result.last_insert_id();
    info!(department_id = id, user_id = auth.user_id, "Department created");
    Ok(HttpResponse::Created().json(fetch(pool.get_ref(), id).await?))
}

/// Get a department
#[utoipa::path(
    get,
    path = "/api/v1/departments/{id}",
    params(("id" = u64, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department found", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn get_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Read, Target::Collection)?;
    let department = fetch(pool.get_ref(), path.into_inner()).await?;
    auth.authorize(Verb::Read, Target::Shared)?;
    Ok(HttpResponse::Ok().json(department))
}

async fn write_update(
    auth: AuthUser,
    pool: &MySqlPool,
    id: u64,
    payload: DepartmentPayload,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Update, Target::Collection)?;
    let current = fetch(pool, id).await?;
    auth.authorize(Verb::Update, Target::Shared)?;

    let fields = payload.into_fields(WriteMode::update(&current, partial))?;

    sqlx::query("UPDATE departments SET name = ?, description = ? WHERE id = ?")
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| ApiError::from_write(e, UNIQUE_KEYS, &[]))?;

    info!(department_id = id, user_id = auth.user_id, partial, "Department updated");
    Ok(HttpResponse::Ok().json(fetch(pool, id).await?))
}

/// Replace a department
#[utoipa::path(
    put,
    path = "/api/v1/departments/{id}",
    params(("id" = u64, Path, description = "Department ID")),
    request_body = DepartmentPayload,
    responses(
        (status = 200, description = "Department updated", body = Department),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Department not found"),
        (status = 409, description = "Name already taken")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn update_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<DepartmentPayload>,
) -> Result<HttpResponse, ApiError> {
    write_update(auth, pool.get_ref(), path.into_inner(), payload.into_inner(), false).await
}

/// Partially update a department
#[utoipa::path(
    patch,
    path = "/api/v1/departments/{id}",
    params(("id" = u64, Path, description = "Department ID")),
    request_body = DepartmentPayload,
    responses(
        (status = 200, description = "Department updated", body = Department),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Department not found"),
        (status = 409, description = "Name already taken")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn patch_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<DepartmentPayload>,
) -> Result<HttpResponse, ApiError> {
    write_update(auth, pool.get_ref(), path.into_inner(), payload.into_inner(), true).await
}

/// Delete a department
///
/// Employees of the department become unassigned.
#[utoipa::path(
    delete,
    path = "/api/v1/departments/{id}",
    params(("id" = u64, Path, description = "Department ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Department not found")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn delete_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Delete, Target::Collection)?;
    let id = path.into_inner();
    fetch(pool.get_ref(), id).await?;
    auth.authorize(Verb::Delete, Target::Shared)?;

    sqlx::query("DELETE FROM departments WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    info!(department_id = id, user_id = auth.user_id, "Department deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing() -> Department {
        Department {
            id: 1,
            name: "Finance".to_string(),
            description: Some("Money".to_string()),
        }
    }

    #[test]
    fn create_requires_name() {
        let err = DepartmentPayload::default().into_fields(WriteMode::Create).err().unwrap();
        match err {
            ApiError::Validation { errors, .. } => {
                assert_eq!(errors.get("name").unwrap(), [crate::error::REQUIRED.to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unassigned_name_is_reserved() {
        for name in ["Unassigned", " unassigned "] {
            let payload = DepartmentPayload {
                name: Some(name.to_string()),
                description: None,
            };
            match payload.into_fields(WriteMode::Create) {
                Err(ApiError::Validation { errors, .. }) => assert!(errors.get("name").is_some()),
                other => panic!("{name:?} accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn overlong_name_is_rejected() {
        let payload = DepartmentPayload {
            name: Some("x".repeat(101)),
            description: None,
        };
        assert!(payload.into_fields(WriteMode::Create).is_err());
    }

    #[test]
    fn patch_keeps_untouched_fields() {
        let current = existing();
        let payload: DepartmentPayload =
            serde_json::from_str(r#"{"name": "Treasury"}"#).unwrap();
        let fields = payload.into_fields(WriteMode::Patch(&current)).unwrap();
        assert_eq!(fields.name, "Treasury");
        assert_eq!(fields.description.as_deref(), Some("Money"));
    }

    #[test]
    fn patch_can_clear_description() {
        let current = existing();
        let payload: DepartmentPayload =
            serde_json::from_str(r#"{"description": null}"#).unwrap();
        let fields = payload.into_fields(WriteMode::Patch(&current)).unwrap();
        assert_eq!(fields.name, "Finance");
        assert_eq!(fields.description, None);
    }

    #[test]
    fn put_without_description_keeps_it() {
        let current = existing();
        let payload: DepartmentPayload = serde_json::from_str(r#"{"name": "HR"}"#).unwrap();
        let fields = payload.into_fields(WriteMode::Replace(&current)).unwrap();
        assert_eq!(fields.name, "HR");
        assert_eq!(fields.description.as_deref(), Some("Money"));
    }

    #[test]
    fn put_requires_name_again() {
        let current = existing();
        let payload: DepartmentPayload =
            serde_json::from_str(r#"{"description": "Cash"}"#).unwrap();
        assert!(payload.into_fields(WriteMode::Replace(&current)).is_err());
    }
}
