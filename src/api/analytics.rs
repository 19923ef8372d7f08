use std::collections::BTreeMap;

use actix_web::{HttpResponse, web};
use chrono::{Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{
        auth::AuthUser,
        rbac::{Target, Verb},
    },
    error::{ApiError, FieldErrors},
    model::attendance::AttendanceStatus,
};

pub const UNASSIGNED: &str = "Unassigned";
pub const DEFAULT_MONTHS: u32 = 6;
pub const MAX_MONTHS: u32 = 24;

/// Chart-ready series: `labels[i]` pairs with `values[i]`.
#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct ChartData {
    #[schema(example = json!(["Engineering", "Finance"]))]
    pub labels: Vec<String>,
    #[schema(example = json!([12, 4]))]
    pub values: Vec<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MonthlyQuery {
    /// Whole calendar months to look back before the current one (1-24, default 6)
    pub months: Option<i64>,
}

impl MonthlyQuery {
    fn months(&self) -> Result<u32, ApiError> {
        match self.months {
            None => Ok(DEFAULT_MONTHS),
            Some(m) if (1..=MAX_MONTHS as i64).contains(&m) => Ok(m as u32),
            Some(_) => Err(ApiError::validation(FieldErrors::single(
                "months",
                format!("Ensure this value is between 1 and {MAX_MONTHS}."),
            ))),
        }
    }
}

/// Folds per-department counts into a chart sorted by department name.
/// Employees without a department are counted under [`UNASSIGNED`].
pub fn headcount_chart(rows: Vec<(Option<String>, i64)>) -> ChartData {
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for (name, count) in rows {
        let label = name.unwrap_or_else(|| UNASSIGNED.to_string());
        *counts.entry(label).or_default() += count;
    }
    let (labels, values) = counts.into_iter().unzip();
    ChartData { labels, values }
}

/// First day of the month `months` months before `today`'s month.
pub fn window_start(today: NaiveDate, months: u32) -> NaiveDate {
    let first = today.with_day(1).unwrap_or(today);
    first
        .checked_sub_months(Months::new(months))
        .unwrap_or(first)
}

/// `YYYY-MM` labels for every month from `start` through `end`, in order.
pub fn month_labels(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let mut labels = Vec::new();
    let mut cursor = start.with_day(1).unwrap_or(start);
    while cursor <= end {
        labels.push(cursor.format("%Y-%m").to_string());
        match cursor.checked_add_months(Months::new(1)) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    labels
}

/// Present-day counts per month, zero-filled across the whole window.
/// Rows for months outside the window are dropped.
pub fn presence_chart(start: NaiveDate, end: NaiveDate, rows: Vec<(String, i64)>) -> ChartData {
    let found: BTreeMap<String, i64> = rows.into_iter().collect();
    let labels = month_labels(start, end);
    let values = labels
        .iter()
        .map(|month| found.get(month).copied().unwrap_or(0))
        .collect();
    ChartData { labels, values }
}

/// Employees per department
#[utoipa::path(
    get,
    path = "/api/v1/analytics/employees-per-department",
    responses(
        (status = 200, description = "Headcount by department", body = ChartData),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn employees_per_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Read, Target::Shared)?;

    let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
        "SELECT d.name, COUNT(e.id) \
         FROM employees e LEFT JOIN departments d ON d.id = e.department_id \
         GROUP BY d.id, d.name",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(headcount_chart(rows)))
}

/// Monthly attendance
///
/// Number of `Present` records per calendar month, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/analytics/monthly-attendance",
    params(MonthlyQuery),
    responses(
        (status = 200, description = "Present days per month", body = ChartData),
        (status = 400, description = "months out of range"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn monthly_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MonthlyQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.authorize(Verb::Read, Target::Shared)?;
    let months = query.months()?;

    let today = Utc::now().date_naive();
    let start = window_start(today, months);

    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT DATE_FORMAT(date, '%Y-%m') AS month, COUNT(*) AS present \
         FROM attendance \
         WHERE status = ? AND date BETWEEN ? AND ? \
         GROUP BY month ORDER BY month",
    )
    .bind(AttendanceStatus::Present.as_ref())
    .bind(start)
    .bind(today)
    .fetch_all(pool.get_ref())
    .await?;

    tracing::debug!(months, %start, %today, buckets = rows.len(), "Monthly attendance");
    Ok(HttpResponse::Ok().json(presence_chart(start, today, rows)))
}
