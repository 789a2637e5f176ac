use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rota_server::{
    flow, load, shutdown_signal, spawn_rotation, version, App, AppConfig,
    Command,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = AppConfig::parse();
    let config = match &args.config {
        Some(path) => {
            let mut config = load(path)?;
            config.command = args.command.clone();
            config
        }
        None => args,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    debug!("{:#?}", &config);
    info!("{}", version());

    let command = config.command.clone().unwrap_or(Command::Flow);
    let app = Arc::new(App::new(config)?);
    match command {
        Command::Flow => {
            let report = flow::run(&app);
            for step in &report.steps {
                println!("{}", step);
            }
            if !report.passed() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Jwks => {
            let jwks = app.jwks()?;
            println!("{}", serde_json::to_string_pretty(&jwks)?);
        }
        Command::Login { username, password } => {
            let response = app.login(&username, &password)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Inspect { token } => {
            let claims = app.validator.verify_access(&token)?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Command::Run => run(app).await?,
    }
    Ok(ExitCode::SUCCESS)
}

async fn run(app: Arc<App>) -> Result<()> {
    let period = Duration::from_secs(app.config.rotation_interval);
    info!("rotating signing keys every {:?}", period);
    spawn_rotation(Arc::clone(&app.keys), period, shutdown_signal())
        .await
        .context("rotation task failed")?;
    Ok(())
}
