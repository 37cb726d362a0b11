use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bioage_core::app::{App, AppBuilder, Requester, SubmitOutcome};
use bioage_core::config::AppConfig;
use bioage_core::domain::{Answers, NewModel, TaskStatus, UserId};
use bioage_core::scoring::StubPredictor;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_MODEL: &str = "bioage";
const DEMO_FEATURES: &[&str] = &["age", "bmi", "glucose"];

#[derive(Parser)]
#[command(name = "bioage")]
#[command(about = "Paid biological-age scoring with a credit wallet", long_about = None)]
struct Cli {
    /// Configuration file path (JSON); BIOAGE_* variables override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a wallet, submit one questionnaire through the queue and print the result
    Demo {
        /// Initial wallet balance
        #[arg(long, default_value = "50")]
        balance: u64,

        /// Price of the demo model
        #[arg(long, default_value = "25")]
        price: u64,

        /// Answers as a JSON object
        #[arg(long, default_value = r#"{"age": 40, "bmi": 26.5, "glucose": 5.4}"#)]
        answers: String,
    },

    /// Run the worker group until Ctrl-C
    Worker,

    /// Print the resolved configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Demo {
            balance,
            price,
            answers,
        } => demo(config, balance, price, &answers).await,
        Commands::Worker => worker(config).await,
        Commands::CheckConfig => {
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn build(config: AppConfig, price: u64) -> Result<App> {
    let app = AppBuilder::new(config)
        .register_predictor(DEMO_MODEL, Arc::new(StubPredictor))
        .seed_model(NewModel::new(DEMO_MODEL, price, DEMO_FEATURES))
        .expect_models(&[DEMO_MODEL])
        .build()
        .await?;
    Ok(app)
}

async fn demo(config: AppConfig, balance: u64, price: u64, answers: &str) -> Result<()> {
    let answers: Answers = serde_json::from_str(answers).context("--answers must be a JSON object")?;
    let app = build(config, price).await?;
    let Some(model) = app.models.first().cloned() else {
        bail!("no model seeded");
    };

    let user = UserId(1);
    app.ledger.open_wallet(user, balance).await?;
    let workers = app.spawn_workers();

    let outcome = app.orchestrator.predict(user, model.id, answers).await?;
    let task_id = outcome.task().external_id;
    if let SubmitOutcome::ValidationFailed { errors, .. } = &outcome {
        for e in errors {
            println!("invalid answer: {}: {}", e.field_name, e.message);
        }
    }

    let mut task = outcome.task().clone();
    while matches!(task.status(), TaskStatus::Validated | TaskStatus::Processing) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        task = app.orchestrator.get_task(Requester::User(user), task_id).await?;
    }
    workers.shutdown_and_join().await;

    println!("{}", serde_json::to_string_pretty(&task)?);
    println!("balance: {}", app.ledger.balance(user).await?);
    for tx in app.ledger.transactions(user).await? {
        println!("  {:?} {} (task: {:?})", tx.kind, tx.amount, tx.task);
    }
    Ok(())
}

async fn worker(config: AppConfig) -> Result<()> {
    let app = build(config, 25).await?;
    let workers = app.spawn_workers();
    info!(
        queue = %app.queue.name(),
        workers = workers.len(),
        "workers running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("shutting down");
    workers.shutdown_and_join().await;

    let status = app.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
