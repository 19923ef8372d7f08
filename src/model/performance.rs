use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 4,
    "employee": 12,
    "rating": 4,
    "review_date": "2026-02-15"
}))]
pub struct Performance {
    pub id: u64,
    #[serde(rename = "employee")]
    pub employee_id: u64,
    #[schema(minimum = 1, maximum = 5)]
    pub rating: u8,
    #[schema(value_type = String, format = "date")]
    pub review_date: NaiveDate,
}
