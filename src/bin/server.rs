use std::{fs::OpenOptions, net::SocketAddr, path::Path, process::ExitCode, sync::Arc};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use finbook_rs::{
    AppState, Config, Services, build_router, count_users, cors_layer, graceful_shutdown,
    logging_middleware,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    if let Err(error) = setup_logging(config.log_file.as_deref()) {
        eprintln!("Could not set up logging: {error}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("The server could not start: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let database_path = config.database_path()?;
    let db_connection = Connection::open(&database_path)?;
    tracing::info!("Opened database {}", database_path.display());

    let services = Services::from_config(&config)?;
    let state = AppState::new(
        db_connection,
        &config.secret_key,
        &config.session_secret,
        &config.frontend_url,
        config.reset_token.clone(),
        services,
    )?
    .with_body_limit(config.body_limit());

    if let Ok(connection) = state.db_connection.lock() {
        tracing::info!("The database has {} users", count_users(&connection)?);
    }

    if state.reset_token.is_some() {
        tracing::warn!("The database reset route is enabled");
    }

    let body_limit = state.body_limit;
    let router = build_router(state)
        .layer(middleware::from_fn_with_state(body_limit, logging_middleware))
        .layer(cors_layer(&config.cors_origins()));
    let router = add_tracing_layer(router);

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let addr = SocketAddr::from((config.host, config.port));
    tracing::info!("HTTP server listening on {}", addr);

    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}

fn setup_logging(log_file: Option<&Path>) -> Result<(), std::io::Error> {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(env_filter());

    let file_log = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;

            Some(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(env_filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_log)
        .with(file_log)
        .init();

    Ok(())
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but we're doing our specific
        // logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
