use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;

mod api;
mod auth;
mod cli;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod seed;
mod utils;

use crate::auth::bootstrap::{self, NewUser, Outcome};
use crate::cli::{Cli, Command};
use crate::docs::openapi_for;
use crate::routes::RateLimiters;
use config::Config;
use db::{init_db, run_migrations};
use sqlx::MySqlPool;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use utoipa_swagger_ui::SwaggerUi;

fn init_tracing(config: &Config) -> WorkerGuard {
    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    guard
}

async fn serve(config: Config, pool: MySqlPool) -> Result<()> {
    let limiters = RateLimiters::from_config(&config)?;
    let server_addr = config.server_addr.clone();
    let api_doc = openapi_for(&config.api_prefix);

    info!(addr = %server_addr, prefix = %config.api_prefix, "Server starting...");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", api_doc.clone()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .configure(routes::extractor_config)
            .configure(|cfg| routes::configure(cfg, &config, &limiters))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await
    .context("Server error")
}

fn report(outcome: Outcome, username: &str) {
    match outcome {
        Outcome::Created(id) => println!("Created user {username} (id {id})"),
        Outcome::AlreadyExists => println!("User {username} already exists, nothing to do"),
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let _guard = init_tracing(&config);

    let pool = init_db(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            run_migrations(&pool).await?;
            serve(config, pool).await?;
        }
        Command::Migrate => {
            run_migrations(&pool).await?;
            println!("Migrations applied");
        }
        Command::Seed(args) => {
            run_migrations(&pool).await?;
            let plan = seed::plan(&mut rand::thread_rng(), args.employees, args.days, seed::today());
            let summary = seed::apply(&pool, &plan, args.force).await?;
            if summary.skipped {
                println!("Employees already exist; rerun with --force to replace them");
            } else {
                println!(
                    "Seeded {} departments, {} employees, {} attendance records, {} performance reviews",
                    summary.departments, summary.employees, summary.attendance, summary.reviews
                );
            }
        }
        Command::CreateAdmin(args) => {
            let outcome = bootstrap::create_admin(&pool, &args.username, &args.password).await?;
            report(outcome, &args.username);
        }
        Command::CreateUser(args) => {
            let outcome = bootstrap::create_user(
                &pool,
                NewUser {
                    username: &args.username,
                    password: &args.password,
                    role: args.role.into(),
                    is_superuser: false,
                    employee_id: args.employee_id,
                },
            )
            .await?;
            report(outcome, &args.username);
        }
    }

    Ok(())
}
