use std::process;

use lectern::{
    application::error::{AppError, ErrorReport},
    config::{self, StoreBackend},
    infra::{
        bootstrap::{Backends, Services},
        db::PostgresRepositories,
        error::InfraError,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = ErrorReport::from_error("lectern", error);
    if dispatcher::has_been_set() {
        error!(source = report.source, error = %report.chain(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, error = %report.chain(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Health(config::HealthArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Health(_) => run_health(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    if settings.store.backend == StoreBackend::Memory {
        info!(
            target = "lectern::migrate",
            "In-memory store selected; nothing to migrate"
        );
        return Ok(());
    }

    let url = settings.database.url.as_deref().ok_or_else(|| {
        InfraError::configuration("database.url is required to run migrations")
    })?;
    let pool = PostgresRepositories::connect(
        url,
        settings.database.max_connections.get(),
        settings.database.statement_timeout,
    )
    .await
    .map_err(|err| InfraError::database(err.to_string()))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    info!(target = "lectern::migrate", "Migrations applied");
    Ok(())
}

async fn run_health(settings: config::Settings) -> Result<(), AppError> {
    let backends = Backends::connect(&settings).await?;
    backends.health_check().await?;

    let services = Services::build(&backends, &settings)?;
    services.articles.write_back().flush().await;

    info!(
        target = "lectern::health",
        backend = ?settings.store.backend,
        cache = if settings.redis.url.is_some() { "redis" } else { "memory" },
        publish_mode = ?settings.store.publish_mode,
        "Primary store and cache are reachable"
    );
    Ok(())
}
