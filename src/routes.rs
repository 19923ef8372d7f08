use crate::{
    api::{analytics, attendance, department, employee, health, performance},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    error,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Context, Result};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-IP limiters, built once and shared by every worker.
#[derive(Clone)]
pub struct RateLimiters {
    login: Limiter,
    refresh: Limiter,
    protected: Limiter,
}

fn build_limiter(requests_per_min: u32) -> Result<Limiter> {
    let per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond((60_000 / per_min as u64).max(1))
        .burst_size(per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .context("invalid rate limit configuration")?;
    Ok(Arc::new(Governor::new(&cfg)))
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            login: build_limiter(config.rate_login_per_min)?,
            refresh: build_limiter(config.rate_refresh_per_min)?,
            protected: build_limiter(config.rate_protected_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &RateLimiters) {
    cfg.service(health::index).service(health::health);

    // Public routes
    cfg.service(
        web::scope("/api/auth")
            .service(
                web::resource("/token")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/token/refresh")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(limiters.protected.clone())
            // /departments
            .service(
                web::resource("/departments")
                    .route(web::get().to(department::list_departments))
                    .route(web::post().to(department::create_department)),
            )
            .service(
                web::resource("/departments/{id}")
                    .route(web::get().to(department::get_department))
                    .route(web::put().to(department::update_department))
                    .route(web::patch().to(department::patch_department))
                    .route(web::delete().to(department::delete_department)),
            )
            // /employees
            .service(
                web::resource("/employees")
                    .route(web::get().to(employee::list_employees))
                    .route(web::post().to(employee::create_employee)),
            )
            .service(
                web::resource("/employees/{id}")
                    .route(web::get().to(employee::get_employee))
                    .route(web::put().to(employee::update_employee))
                    .route(web::patch().to(employee::patch_employee))
                    .route(web::delete().to(employee::delete_employee)),
            )
            // /attendance
            .service(
                web::resource("/attendance")
                    .route(web::get().to(attendance::list_attendance))
                    .route(web::post().to(attendance::create_attendance)),
            )
            .service(
                web::resource("/attendance/{id}")
                    .route(web::get().to(attendance::get_attendance))
                    .route(web::put().to(attendance::update_attendance))
                    .route(web::patch().to(attendance::patch_attendance))
                    .route(web::delete().to(attendance::delete_attendance)),
            )
            // /performance
            .service(
                web::resource("/performance")
                    .route(web::get().to(performance::list_performance))
                    .route(web::post().to(performance::create_performance)),
            )
            .service(
                web::resource("/performance/{id}")
                    .route(web::get().to(performance::get_performance))
                    .route(web::put().to(performance::update_performance))
                    .route(web::patch().to(performance::patch_performance))
                    .route(web::delete().to(performance::delete_performance)),
            )
            // /analytics
            .service(
                web::scope("/analytics")
                    .route(
                        "/employees-per-department",
                        web::get().to(analytics::employees_per_department),
                    )
                    .route(
                        "/monthly-attendance",
                        web::get().to(analytics::monthly_attendance),
                    ),
            ),
    );
}

/// Routes extractor failures through `ApiError` so they share its JSON shape.
pub fn extractor_config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(error::json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(error::query_error_handler))
        .app_data(web::PathConfig::default().error_handler(error::path_error_handler));
}

// LOGIN  POST /api/auth/token
//  ├─ access_token  (ACCESS_TOKEN_TTL, default 12 h)
//  └─ refresh_token (REFRESH_TOKEN_TTL, default 30 days)
//
// API REQUEST
//  └─ Authorization: Bearer access_token
//
// ACCESS EXPIRED  POST /api/auth/token/refresh
//  └─ old refresh_token revoked, new pair returned
