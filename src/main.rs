//! `scdcat [serve|refresh] [config]`
//!
//! `serve` (the default) exposes the collection as JSON over HTTP, `refresh`
//! replaces the dataset once and prints the outcome. The optional second
//! argument names a settings file; otherwise `scdcat.toml` is used if present.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use scdcat::collection::Collection;
use scdcat::error::{CatalogError, Result};
use scdcat::refresh::RefreshOutcome;
use scdcat::server;
use scdcat::settings::Settings;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "serve".to_string());
    let config = args.next();

    let outcome = Settings::load(config.as_deref()).and_then(|settings| match command.as_str() {
        "serve" => serve(settings),
        "refresh" => refresh(settings),
        other => Err(CatalogError::Config(format!(
            "unknown command '{other}', expected 'serve' or 'refresh'"
        ))),
    });
    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "scdcat stopped");
            ExitCode::FAILURE
        }
    }
}

fn serve(settings: Settings) -> Result<ExitCode> {
    let bind = settings.bind.clone();
    let collection = Arc::new(Collection::open(settings)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        info!(address = %bind, "listening");
        axum::serve(listener, server::router(collection)).await?;
        Ok::<_, CatalogError>(ExitCode::SUCCESS)
    })
}

fn refresh(settings: Settings) -> Result<ExitCode> {
    let collection = Collection::open(settings)?;
    let outcome = collection.refresh();
    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{json}"),
        Err(_) => println!("{outcome:?}"),
    }
    Ok(ExitCode::from(match outcome {
        RefreshOutcome::Updated(_) => 0,
        RefreshOutcome::Failed(_) => 1,
        RefreshOutcome::Offline => 2,
        RefreshOutcome::Fatal(_) => 3,
    }))
}
