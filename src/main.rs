use clap::Parser;
use pmp_evaluation_engine::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Ingest(args) => cli::ingest::run(args).await,
        Command::Evaluate(args) => cli::run::evaluate(args).await,
        Command::Score(args) => cli::run::score(args).await,
        Command::Market(args) => cli::run::market(args).await,
        Command::Ask(args) => cli::run::ask(args).await,
        Command::History(args) => cli::run::history(args).await,
        Command::Delete(args) => cli::admin::delete(args).await,
        Command::Usage(args) => cli::admin::usage(args).await,
        Command::SetTier(args) => cli::admin::set_tier(args).await,
    }
}
