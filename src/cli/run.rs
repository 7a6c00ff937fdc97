//! Evaluate, score, market, ask and history commands

use clap::Args;

use super::{bootstrap, print_json};
use crate::domain::context::EntityId;
use crate::domain::evaluation::CancellationFlag;

#[derive(Args, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub entity: String,

    /// User charged for the run
    #[arg(long)]
    pub user: String,
}

#[derive(Args, Clone)]
pub struct AskArgs {
    #[arg(long)]
    pub entity: String,

    #[arg(long)]
    pub user: String,

    /// Run id of the evaluation being asked about
    #[arg(long)]
    pub evaluation: String,

    pub question: String,
}

#[derive(Args, Clone)]
pub struct MarketArgs {
    #[arg(long)]
    pub entity: String,

    /// List stored analyses instead of running a new one
    #[arg(long)]
    pub list: bool,
}

#[derive(Args, Clone)]
pub struct HistoryArgs {
    /// Run id of the evaluation
    #[arg(long)]
    pub evaluation: String,
}

/// Flag cancelled on Ctrl-C; sub-tasks already running still finish
fn cancel_on_interrupt() -> CancellationFlag {
    let cancel = CancellationFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, no further sub-tasks will be dispatched");
            flag.cancel();
        }
    });
    cancel
}

pub async fn evaluate(args: RunArgs) -> anyhow::Result<()> {
    let engine = bootstrap().await?;
    let entity_id = EntityId::new(&args.entity)?;

    let result = engine
        .evaluate_for(&args.user, &entity_id, &cancel_on_interrupt())
        .await?;
    print_json(&result)
}

pub async fn score(args: RunArgs) -> anyhow::Result<()> {
    let engine = bootstrap().await?;
    let entity_id = EntityId::new(&args.entity)?;

    let card = engine
        .score_for(&args.user, &entity_id, &cancel_on_interrupt())
        .await?;
    print_json(&card)
}

pub async fn ask(args: AskArgs) -> anyhow::Result<()> {
    let engine = bootstrap().await?;
    let entity_id = EntityId::new(&args.entity)?;

    let answer = engine
        .ask_question(&args.user, &entity_id, &args.evaluation, &args.question)
        .await?;
    print_json(&answer)
}

pub async fn market(args: MarketArgs) -> anyhow::Result<()> {
    let engine = bootstrap().await?;
    let entity_id = EntityId::new(&args.entity)?;

    if args.list {
        return print_json(&engine.market_analyses(&entity_id).await?);
    }
    let analysis = engine.run_market_analysis(&entity_id).await?;
    print_json(&analysis)
}

pub async fn history(args: HistoryArgs) -> anyhow::Result<()> {
    let engine = bootstrap().await?;
    print_json(&engine.question_history(&args.evaluation).await?)
}
