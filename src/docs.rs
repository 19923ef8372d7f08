use crate::api::analytics::ChartData;
use crate::api::attendance::AttendancePayload;
use crate::api::department::DepartmentPayload;
use crate::api::employee::EmployeePayload;
use crate::api::health::HealthStatus;
use crate::api::performance::PerformancePayload;
use crate::model::{
    attendance::{Attendance, AttendanceStatus},
    department::Department,
    employee::Employee,
    performance::Performance,
};
use crate::models::{LoginReqDto, RefreshReqDto, TokenPairResponse};
use crate::utils::db_utils::{AttendancePage, DepartmentPage, EmployeePage, PerformancePage};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Analytics API",
        version = "0.2.0",
        description = r#"
## Human Resource Management (HRM) backend

Departments, employees, daily attendance and performance reviews, plus
two chart-ready analytics endpoints.

### Roles
- **Admin**: full access
- **HR**: create, read and update everything, no deletes
- **Employee**: read-only, limited to their own records

### Conventions
- Lists return `{"data", "page", "per_page", "total"}` with 20 items per page
- `search` is a case-insensitive substring match, `ordering` takes a field name with optional `-`
- Validation errors return `{"message", "errors": {"field": ["..."]}}`

Obtain a token from `POST /api/auth/token` and send it as `Authorization: Bearer <access_token>`.
"#,
    ),
    paths(
        crate::api::health::health,

        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::department::list_departments,
        crate::api::department::create_department,
        crate::api::department::get_department,
        crate::api::department::update_department,
        crate::api::department::patch_department,
        crate::api::department::delete_department,

        crate::api::employee::list_employees,
        crate::api::employee::create_employee,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::patch_employee,
        crate::api::employee::delete_employee,

        crate::api::attendance::list_attendance,
        crate::api::attendance::create_attendance,
        crate::api::attendance::get_attendance,
        crate::api::attendance::update_attendance,
        crate::api::attendance::patch_attendance,
        crate::api::attendance::delete_attendance,

        crate::api::performance::list_performance,
        crate::api::performance::create_performance,
        crate::api::performance::get_performance,
        crate::api::performance::update_performance,
        crate::api::performance::patch_performance,
        crate::api::performance::delete_performance,

        crate::api::analytics::employees_per_department,
        crate::api::analytics::monthly_attendance
    ),
    components(
        schemas(
            HealthStatus,
            LoginReqDto,
            RefreshReqDto,
            TokenPairResponse,
            Department,
            DepartmentPayload,
            DepartmentPage,
            Employee,
            EmployeePayload,
            EmployeePage,
            Attendance,
            AttendanceStatus,
            AttendancePayload,
            AttendancePage,
            Performance,
            PerformancePayload,
            PerformancePage,
            ChartData
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Token issue, refresh and revoke"),
        (name = "Department", description = "Department management APIs"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "Attendance", description = "Attendance management APIs"),
        (name = "Performance", description = "Performance review APIs"),
        (name = "Analytics", description = "Chart-ready aggregates"),
        (name = "Health", description = "Liveness check"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Prefix the handlers are documented under; `API_PREFIX` may move them.
const DOCUMENTED_PREFIX: &str = "/api/v1";

/// The API document with protected paths moved under `api_prefix`.
pub fn openapi_for(api_prefix: &str) -> openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    if api_prefix != DOCUMENTED_PREFIX {
        let paths = std::mem::take(&mut doc.paths.paths);
        doc.paths.paths = paths
            .into_iter()
            .map(|(path, item)| match path.strip_prefix(DOCUMENTED_PREFIX) {
                Some(rest) => (format!("{api_prefix}{rest}"), item),
                None => (path, item),
            })
            .collect();
    }
    doc
}
