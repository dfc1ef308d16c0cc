use anyhow::{Context, Result};
use playlist_etl::config::{AppConfig, EnvVars, FileConfig};
use playlist_etl::pipeline::OutcomeStatus;
use playlist_etl::run_log::LogCapture;
use playlist_etl::spotify::ReqwestTransport;
use playlist_etl::{Pipeline, SpotifyClient, SqliteRunLog, SqliteWarehouse};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    // A missing .env is fine; the real environment still applies.
    let dotenv = dotenvy::dotenv();

    let capture = LogCapture::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(capture.clone())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {:?}", path);
    }

    match run(capture) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Pipeline could not run: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every resource succeeded.
fn run(capture: LogCapture) -> Result<bool> {
    let env = EnvVars::from_env();
    let file_config = match &env.pipeline_config {
        Some(path) => {
            info!("Loading pipeline config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&env, file_config)?;

    info!(
        "Opening warehouse at {:?} and run log at {:?}",
        config.warehouse_db_path, config.run_log_db_path
    );
    let warehouse = SqliteWarehouse::open(&config.warehouse_db_path)?;
    let mut run_log = SqliteRunLog::open(&config.run_log_db_path)?.with_log_capture(capture);
    if let Some(folder) = &config.log_folder_path {
        info!("Writing run logs to {:?}", folder);
        run_log = run_log.with_log_folder(folder.clone());
    }

    let transport = ReqwestTransport::new(Duration::from_secs(
        config.spotify.request_timeout_secs,
    ))
    .context("Failed to build HTTP client")?;
    let client = SpotifyClient::new(&config.spotify, Box::new(transport));

    let pipeline = Pipeline::new(
        config.pipeline_name.clone(),
        &client,
        &warehouse,
        &run_log,
        &config.resources,
    );
    let summary = pipeline.run();

    for outcome in &summary.outcomes {
        match outcome.status {
            OutcomeStatus::Succeeded => info!(
                "{}: {} extracted, {} loaded ({})",
                outcome.resource, outcome.rows_extracted, outcome.rows_loaded, outcome.strategy
            ),
            OutcomeStatus::Failed | OutcomeStatus::Skipped => error!(
                "{}: {:?} in state {}: {}",
                outcome.resource,
                outcome.status,
                outcome.state,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    Ok(summary.all_succeeded())
}
