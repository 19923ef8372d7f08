use crate::{
    auth::{
        auth::AuthUser,
        rbac::{Target, Verb},
    },
    error::{ApiError, FieldErrors, ForeignKey},
    model::performance::{MAX_RATING, MIN_RATING, Performance},
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

const COLUMNS: &str = "p.id, p.employee_id, p.rating, p.review_date";
const FROM: &str = "performance p \
    JOIN employees e ON e.id = p.employee_id \
    LEFT JOIN departments d ON d.id = e.department_id";

const SEARCH: &[&str] = &["e.name", "e.email", "d.name"];

const ORDERING: &[(&str, &str)] = &[
    ("review_date", "p.review_date"),
    ("rating", "p.rating"),
    ("employee", "p.employee_id"),
];

const FOREIGN_KEYS: &[ForeignKey] = &[ForeignKey {
    constraint: "fk_performance_employee",
    field: "employee",
}];

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PerformanceQuery {
    /// Page number (20 per page)
    pub page: Option<i64>,
    /// Exact employee id
    pub employee: Option<u64>,
    /// Exact rating
    pub rating: Option<i64>,
    /// Rating at least
    #[serde(rename = "rating__gte")]
    pub rating_min: Option<i64>,
    /// Rating at most
    #[serde(rename = "rating__lte")]
    pub rating_max: Option<i64>,
    /// Exact review date (YYYY-MM-DD)
    #[param(value_type = Option<String>)]
    pub review_date: Option<NaiveDate>,
    /// Reviewed on or after (YYYY-MM-DD)
    #[serde(rename = "review_date__gte")]
    #[param(value_type = Option<String>)]
    pub reviewed_from: Option<NaiveDate>,
    /// Reviewed on or before (YYYY-MM-DD)
    #[serde(rename = "review_date__lte")]
    #[param(value_type = Option<String>)]
    pub reviewed_to: Option<NaiveDate>,
    /// Case-insensitive match on employee name, email or department name
    pub search: Option<String>,
    /// Any of `review_date`, `rating`, `employee`, `-` prefix for descending
    pub ordering: Option<String>,
}

impl PerformanceQuery {
    fn conditions(&self, auth: &AuthUser) -> Conditions {
        let mut c = Conditions::new();
        c.scope("p.employee_id", auth.list_scope())
            .eq("p.employee_id", self.employee.map(SqlValue::U64))
            .eq("p.rating", self.rating.map(SqlValue::I64))
            .gte("p.rating", self.rating_min.map(SqlValue::I64))
            .lte("p.rating", self.rating_max.map(SqlValue::I64))
            .eq("p.review_date", self.review_date.map(SqlValue::Date))
            .gte("p.review_date", self.reviewed_from.map(SqlValue::Date))
            .lte("p.review_date", self.reviewed_to.map(SqlValue::Date))
            .search(SEARCH, self.search.as_deref());
        c
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PerformancePayload {
    #[schema(example = 12)]
    pub employee: Option<u64>,
    #[schema(example = 4, minimum = 1, maximum = 5)]
    pub rating: Option<i64>,
    #[schema(example = "2026-02-15", format = "date")]
    pub review_date: Option<String>,
}

#[derive(Debug)]
struct PerformanceFields {
    employee_id: u64,
    rating: u8,
    review_date: NaiveDate,
}

impl PerformancePayload {
    /// Full payload when `current` is `None`, partial update otherwise.
    fn into_fields(self, current: Option<&Performance>) -> Result<PerformanceFields, ApiError> {
        let mut errors = FieldErrors::new();

        let employee_id = required(
            &mut errors,
            "employee",
            self.employee,
            current.map(|p| p.employee_id),
        );

        let rating = match self.rating {
            Some(r) if (MIN_RATING..=MAX_RATING).contains(&r) => Some(r as u8),
            Some(r) => {
                errors.add("rating", format!("\"{r}\" is not a valid choice."));
                None
            }
            None => required(&mut errors, "rating", None, current.map(|p| p.rating)),
        };

        let review_date = match self.review_date {
            Some(raw) => parse_date(&mut errors, "review_date", &raw),
            None => required(&mut errors, "review_date", None, current.map(|p| p.review_date)),
        };

        match (employee_id, rating, review_date) {
            (Some(employee_id), Some(rating), Some(review_date)) => {
                errors.finish(PerformanceFields {
                    employee_id,
                    rating,
                    review_date,
                })
            }
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

async fn fetch(pool: &MySqlPool, id: u64) -> Result<Performance, ApiError> {
    sqlx::query_as::<_, Performance>(
        "SELECT id, employee_id, rating, review_date FROM performance WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Performance review"))
}

/// List performance reviews
#[utoipa::path(
    get,
    path = "/api/v1/performance",
    params(PerformanceQuery),
    responses(
        (status = 200, description = "Paginated performance list", body = PerformancePage),
        (status = 400, description = "Invalid filter value"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Invalid page")
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn list_performance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PerformanceQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Read, Target::Collection)?;
    let page = Page::from_query(query.page)?;

    let conditions = query.conditions(&auth);
    let order = order_by(query.ordering.as_deref(), ORDERING, "-review_date", "p.id");
    let result =
        fetch_page::<Performance>(pool.get_ref(), COLUMNS, FROM, &conditions, &order, page)
            .await?;

    Ok(HttpResponse::Ok().json(result))
}

/// Create a performance review
#[utoipa::path(
    post,
    path = "/api/v1/performance",
    request_body = PerformancePayload,
    responses(
        (status = 201, description = "Review created", body = Performance),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn create_performance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<PerformancePayload>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Create, Target::Collection)?;
    let fields = payload.into_inner().into_fields(None)?;
    check_employee(pool.get_ref(), fields.employee_id).await?;

    let result = sqlx::query(
        "INSERT INTO performance (employee_id, rating, review_date) VALUES (?, ?, ?)",
    )
    .bind(fields.employee_id)
    .bind(fields.rating)
    .bind(fields.review_date)
    .execute(pool.get_ref())
    .await
    .map_err(|e| ApiError::from_write(e, &[], FOREIGN_KEYS))?;

    let id = result.last_insert_id();
    info!(performance_id = id, employee_id = fields.employee_id, user_id = auth.user_id, "Performance review created");
    Ok(HttpResponse::Created().json(fetch(pool.get_ref(), id).await?))
}

/// Get a performance review
#[utoipa::path(
    get,
    path = "/api/v1/performance/{id}",
    params(("id" = u64, Path, description = "Performance review ID")),
    responses(
        (status = 200, description = "Performance review", body = Performance),
        (status = 403, description = "Not your record"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn get_performance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Read, Target::Collection)?;
    let review = fetch(pool.get_ref(), path.into_inner()).await?;
    auth.authorize(Verb::Read, Target::Owned { owner: review.employee_id })?;
    Ok(HttpResponse::Ok().json(review))
}

async fn write_update(
    auth: AuthUser,
    pool: &MySqlPool,
    id: u64,
    payload: PerformancePayload,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Update, Target::Collection)?;
    let current = fetch(pool, id).await?;
    auth.authorize(Verb::Update, Target::Owned { owner: current.employee_id })?;

    let fields = payload.into_fields(partial.then_some(&current))?;
    if fields.employee_id != current.employee_id {
        check_employee(pool, fields.employee_id).await?;
    }

    sqlx::query("UPDATE performance SET employee_id = ?, rating = ?, review_date = ? WHERE id = ?")
        .bind(fields.employee_id)
        .bind(fields.rating)
        .bind(fields.review_date)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| ApiError::from_write(e, &[], FOREIGN_KEYS))?;

    info!(performance_id = id, user_id = auth.user_id, partial, "Performance review updated");
    Ok(HttpResponse::Ok().json(fetch(pool, id).await?))
}

/// Replace a performance review
#[utoipa::path(
    put,
    path = "/api/v1/performance/{id}",
    params(("id" = u64, Path, description = "Performance review ID")),
    request_body = PerformancePayload,
    responses(
        (status = 200, description = "Review updated", body = Performance),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn update_performance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<PerformancePayload>,
) -> Result<HttpResponse, ApiError> {
    write_update(auth, pool.get_ref(), path.into_inner(), payload.into_inner(), false).await
}

/// Partially update a performance review
#[utoipa::path(
    patch,
    path = "/api/v1/performance/{id}",
    params(("id" = u64, Path, description = "Performance review ID")),
    request_body = PerformancePayload,
    responses(
        (status = 200, description = "Review updated", body = Performance),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn patch_performance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<PerformancePayload>,
) -> Result<HttpResponse, ApiError> {
    write_update(auth, pool.get_ref(), path.into_inner(), payload.into_inner(), true).await
}

/// Delete a performance review
#[utoipa::path(
    delete,
    path = "/api/v1/performance/{id}",
    params(("id" = u64, Path, description = "Performance review ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn delete_performance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Delete, Target::Collection)?;
    let review = fetch(pool.get_ref(), path.into_inner()).await?;
    auth.authorize(Verb::Delete, Target::Owned { owner: review.employee_id })?;

    sqlx::query("DELETE FROM performance WHERE id = ?")
        .bind(review.id)
        .execute(pool.get_ref())
        .await?;

    info!(performance_id = review.id, user_id = auth.user_id, "Performance review deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_errors(err: ApiError) -> FieldErrors {
        match err {
            ApiError::Validation { errors, .. } => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn rating_outside_one_to_five_is_rejected() {
        for rating in [0, 6, -1] {
            let payload = PerformancePayload {
                employee: Some(1),
                rating: Some(rating),
                review_date: Some("2026-01-10".into()),
            };
            let errors = field_errors(payload.into_fields(None).unwrap_err());
            assert!(errors.get("rating").is_some(), "rating {rating} accepted");
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        for rating in [1, 5] {
            let payload = PerformancePayload {
                employee: Some(1),
                rating: Some(rating),
                review_date: Some("2026-01-10".into()),
            };
            assert_eq!(payload.into_fields(None).unwrap().rating as i64, rating);
        }
    }

    #[test]
    fn patch_rating_keeps_employee_and_date() {
        let current = Performance {
            id: 1,
            employee_id: 7,
            rating: 2,
            review_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        };
        let payload: PerformancePayload = serde_json::from_str(r#"{"rating": 5}"#).unwrap();
        let fields = payload.into_fields(Some(&current)).unwrap();
        assert_eq!((fields.employee_id, fields.rating), (7, 5));
        assert_eq!(fields.review_date, current.review_date);
    }

    #[test]
    fn rating_range_filters() {
        let query = web::Query::<PerformanceQuery>::from_query("rating__gte=3&rating__lte=4&employee=2")
            .unwrap()
            .into_inner();
        let admin = AuthUser {
            user_id: 1,
            username: "admin".into(),
            role: crate::model::role::Role::Admin,
            employee_id: None,
        };
        assert_eq!(
            query.conditions(&admin).where_clause(),
            "WHERE p.employee_id = ? AND p.rating >= ? AND p.rating <= ?"
        );
    }
}
