use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema,
)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl TryFrom<String> for AttendanceStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "employee": 12,
    "date": "2026-03-02",
    "status": "Present"
}))]
pub struct Attendance {
    pub id: u64,
    #[serde(rename = "employee")]
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: AttendanceStatus,
}
