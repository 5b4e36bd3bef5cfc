use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod ai;
mod app;
mod config;
mod db;
mod error;
mod models;
mod newsletter;
mod pipeline;
mod ranking;
mod services;
mod web;

#[cfg(test)]
mod test_support;

use app::App;
use config::Config;
use error::Result;
use pipeline::RefreshOutcome;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so LOG_LEVEL can seed the filter
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let headless_refresh = args.iter().any(|a| a == "--refresh");
    let print_newsletter = args.iter().any(|a| a == "--newsletter");

    let app = Arc::new(App::new(config).await?);

    // Run the pipeline once and exit
    if headless_refresh {
        match app.pipeline.refresh().await? {
            RefreshOutcome::Completed(report) => println!(
                "Fetched {} articles: {} stored, {} failed, {} purged",
                report.fetched, report.stored, report.failed, report.purged
            ),
            RefreshOutcome::AlreadyRunning => println!("A refresh is already running"),
        }
        return Ok(());
    }

    if print_newsletter {
        print!("{}", app.newsletter().await?.markdown());
        return Ok(());
    }

    web::serve(app).await
}
