use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "name": "John Doe",
        "email": "john.doe@company.com",
        "phone_number": "+8801712345678",
        "address": "221B Baker Street, London",
        "date_of_joining": "2024-01-01",
        "department_id": 10
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "John Doe")]
    pub name: String,

    #[schema(example = "john.doe@company.com")]
    pub email: String,

    #[schema(example = "+8801712345678")]
    pub phone_number: String,

    #[schema(example = "221B Baker Street, London")]
    pub address: String,

    #[schema(
        example = "2024-01-01",
        value_type = String,
        format = "date"
    )]
    pub date_of_joining: NaiveDate,

    #[schema(example = 10, nullable = true)]
    pub department_id: Option<u64>,
}
