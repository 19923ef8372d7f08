use actix_web::{HttpResponse, Responder, get, http::header};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    #[schema(example = "ok")]
    pub status: String,
}

/// Liveness check
///
/// Does not touch the database.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthStatus)),
    tag = "Health"
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthStatus { status: "ok".to_string() })
}

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/swagger-ui/index.html"))
        .finish()
}
