//! CLI module for the evaluation engine
//!
//! Every subcommand loads configuration, installs logging, wires an
//! [`EvaluationEngine`](crate::EvaluationEngine) and prints its result as JSON on stdout.

pub mod admin;
pub mod ingest;
pub mod run;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::AppConfig;
use crate::engine::EvaluationEngine;
use crate::infrastructure::logging;

/// PMP Evaluation Engine - retrieval-augmented evaluation of business documents
#[derive(Parser)]
#[command(name = "pmp-eval")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Index plain-text or markdown files for an entity
    Ingest(ingest::IngestArgs),

    /// Run a full topic evaluation
    Evaluate(run::RunArgs),

    /// Score an entity across weighted categories
    Score(run::RunArgs),

    /// Compare claimed market size with web-validated figures
    Market(run::MarketArgs),

    /// Ask a question about a stored evaluation
    Ask(run::AskArgs),

    /// Show the questions asked about an evaluation
    History(run::HistoryArgs),

    /// Delete an entity's index, cached queries and profile
    Delete(admin::DeleteArgs),

    /// Show a user's quota usage
    Usage(admin::UsageArgs),

    /// Change a user's subscription tier
    SetTier(admin::SetTierArgs),
}

/// Load configuration, install logging and wire the engine
pub async fn bootstrap() -> anyhow::Result<EvaluationEngine> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);

    Ok(EvaluationEngine::from_config(&config).await?)
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
