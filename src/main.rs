use std::{process::ExitCode, sync::Arc};

use parlor::{
    application::{error::AppError, forum::ForumService, repos::ForumStore},
    cache::{CacheConfig, ForumCache},
    config::{self, Command, Settings},
    infra::{db::PostgresStore, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_application_error(&error);
            ExitCode::from(error.exit_code())
        }
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(InfraError::from)?;

    telemetry::init(&settings.logging)?;

    let service = build_service(&settings).await?;

    match cli_args.command {
        Command::Stats => run_stats(&service).await,
        Command::Whois(args) => run_whois(&service, &args.login).await,
    }
}

async fn build_service(settings: &Settings) -> Result<ForumService, AppError> {
    let url = settings.database.url.as_deref().ok_or_else(|| {
        InfraError::configuration("database.url is required (set PARLOR__DATABASE__URL)")
    })?;

    let pool = PostgresStore::connect(url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;
    let store = PostgresStore::new(pool);
    store.health_check().await.map_err(InfraError::from)?;
    info!(
        max_connections = settings.database.max_connections.get(),
        "Connected to database"
    );

    let store: Arc<dyn ForumStore> = Arc::new(store);
    let cache = ForumCache::new(&CacheConfig::from(&settings.cache), Arc::clone(&store));

    Ok(ForumService::new(
        store,
        cache,
        settings.forum.max_post_chars.get(),
    ))
}

async fn run_stats(service: &ForumService) -> Result<(), AppError> {
    let totals = service.board_totals().await?;
    print_json(&totals)
}

async fn run_whois(service: &ForumService, login: &str) -> Result<(), AppError> {
    let user = service
        .cache()
        .identity()
        .get_user_by_login(login)
        .await?
        .ok_or(AppError::NotFound)?;
    print_json(&user)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::validation(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
