use std::collections::BTreeMap;

use actix_web::{
    HttpRequest, HttpResponse, ResponseError,
    error::{JsonPayloadError, PathError, QueryPayloadError},
    http::StatusCode,
};
use derive_more::Display;
use serde::Serialize;
use serde_json::json;
use sqlx::error::ErrorKind;
use tracing::error;

pub const REQUIRED: &str = "This field is required.";

/// Per-field validation messages, serialized as `{"field": ["msg", ...]}`.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(value)` when no field failed, otherwise a validation error.
    pub fn finish<T>(self, value: T) -> Result<T, ApiError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(ApiError::validation(self))
        }
    }
}

#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "{}", message)]
    Validation { message: String, errors: FieldErrors },
    #[display(fmt = "{}", _0)]
    BadRequest(String),
    #[display(fmt = "{}", _0)]
    Unauthorized(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", message)]
    Conflict { message: String, errors: FieldErrors },
    #[display(fmt = "Internal Server Error: {}", _0)]
    Internal(String),
}

impl ApiError {
    pub fn validation(errors: FieldErrors) -> Self {
        Self::Validation {
            message: "Validation failed".to_string(),
            errors,
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("You do not have permission to perform this action.".to_string())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation { message, errors } | ApiError::Conflict { message, errors } => {
                json!({ "message": message, "errors": errors })
            }
            ApiError::Internal(_) => json!({ "message": "Internal Server Error" }),
            other => json!({ "message": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Maps a named unique key of the store onto the request field it guards.
pub struct UniqueKey {
    pub constraint: &'static str,
    pub field: &'static str,
    pub message: &'static str,
}

/// Maps a named foreign key onto the request field carrying the reference.
pub struct ForeignKey {
    pub constraint: &'static str,
    pub field: &'static str,
}

impl ApiError {
    /// Classifies a failed write: unique violations become conflicts on the
    /// field that owns the key, foreign key violations become field errors.
    pub fn from_write(err: sqlx::Error, uniques: &[UniqueKey], foreign: &[ForeignKey]) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let message = db_err.message();
            match db_err.kind() {
                ErrorKind::UniqueViolation => {
                    let errors = match uniques.iter().find(|k| message.contains(k.constraint)) {
                        Some(key) => FieldErrors::single(key.field, key.message),
                        None => FieldErrors::single("non_field_errors", "Duplicate record."),
                    };
                    return ApiError::Conflict {
                        message: "Conflict".to_string(),
                        errors,
                    };
                }
                ErrorKind::ForeignKeyViolation => {
                    let field = foreign
                        .iter()
                        .find(|k| message.contains(k.constraint))
                        .map(|k| k.field)
                        .unwrap_or("non_field_errors");
                    return ApiError::validation(FieldErrors::single(
                        field,
                        "Referenced object does not exist.",
                    ));
                }
                _ => {}
            }
        }
        err.into()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Not found.".to_string()),
            other => {
                error!(error = %other, "Database error");
                ApiError::internal(other.to_string())
            }
        }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Invalid JSON payload: {err}")).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Invalid query parameters: {err}")).into()
}

pub fn path_error_handler(_err: PathError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::NotFound("Not found.".to_string()).into()
}

/// A store error of the given kind, shaped like what the MySQL driver returns.
#[cfg(test)]
pub(crate) fn store_error(kind: ErrorKind, message: &'static str) -> sqlx::Error {
    #[derive(Debug)]
    struct StoreError {
        kind: ErrorKind,
        message: &'static str,
    }

    impl std::fmt::Display for StoreError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message)
        }
    }

    impl std::error::Error for StoreError {}

    impl sqlx::error::DatabaseError for StoreError {
        fn message(&self) -> &str {
            self.message
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.kind {
                ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
                ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
                ErrorKind::NotNullViolation => ErrorKind::NotNullViolation,
                ErrorKind::CheckViolation => ErrorKind::CheckViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    sqlx::Error::Database(Box::new(StoreError { kind, message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn validation_errors_are_keyed_by_field() {
        let mut errors = FieldErrors::new();
        errors.add("email", "Enter a valid email address.");
        errors.add("name", REQUIRED);
        errors.add("name", "Ensure this field has no more than 120 characters.");

        let (status, body) = body_json(ApiError::validation(errors)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["email"][0], "Enter a valid email address.");
        assert_eq!(body["errors"]["name"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn internal_errors_hide_details() {
        let (status, body) = body_json(ApiError::internal("pool timed out")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal Server Error");
    }

    #[actix_web::test]
    async fn conflict_maps_to_409() {
        let err = ApiError::Conflict {
            message: "Conflict".to_string(),
            errors: FieldErrors::single("email", "taken"),
        };
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["errors"]["email"][0], "taken");
    }

    const KEYS: &[UniqueKey] = &[UniqueKey {
        constraint: "uq_employees_email",
        field: "email",
        message: "employee with this email already exists.",
    }];

    const REFS: &[ForeignKey] = &[ForeignKey {
        constraint: "fk_employees_department",
        field: "department_id",
    }];

    fn errors_of(err: &ApiError) -> &FieldErrors {
        match err {
            ApiError::Conflict { errors, .. } | ApiError::Validation { errors, .. } => errors,
            other => panic!("no field errors on {other:?}"),
        }
    }

    #[test]
    fn duplicate_key_is_a_conflict_on_the_owning_field() {
        let err = ApiError::from_write(
            store_error(
                ErrorKind::UniqueViolation,
                "Duplicate entry 'jane@corp.io' for key 'employees.uq_employees_email'",
            ),
            KEYS,
            REFS,
        );
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            errors_of(&err).get("email").unwrap(),
            ["employee with this email already exists.".to_string()]
        );
    }

    #[test]
    fn unknown_unique_key_falls_back_to_non_field_errors() {
        let err = ApiError::from_write(
            store_error(
                ErrorKind::UniqueViolation,
                "Duplicate entry 'x' for key 'employees.uq_something_else'",
            ),
            KEYS,
            REFS,
        );
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(errors_of(&err).get("non_field_errors").is_some());
        assert!(errors_of(&err).get("email").is_none());
    }

    #[test]
    fn broken_reference_is_a_field_error() {
        let err = ApiError::from_write(
            store_error(
                ErrorKind::ForeignKeyViolation,
                "Cannot add or update a child row: a foreign key constraint fails \
                 (`hrm`.`employees`, CONSTRAINT `fk_employees_department` FOREIGN KEY \
                 (`department_id`) REFERENCES `departments` (`id`) ON DELETE SET NULL)",
            ),
            KEYS,
            REFS,
        );
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(errors_of(&err).get("department_id").is_some());
    }

    #[test]
    fn other_store_failures_stay_internal() {
        let err = ApiError::from_write(
            store_error(ErrorKind::Other, "Lock wait timeout exceeded"),
            KEYS,
            REFS,
        );
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unavailable_store_is_a_server_error() {
        let err: ApiError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn finish_passes_value_through_when_clean() {
        assert_eq!(FieldErrors::new().finish(7).unwrap(), 7);
        assert!(FieldErrors::single("x", "bad").finish(7).is_err());
    }
}
