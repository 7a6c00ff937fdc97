//! Entity and quota administration commands

use clap::Args;
use serde_json::json;

use super::{bootstrap, print_json};
use crate::domain::context::EntityId;
use crate::domain::quota::SubscriptionTier;

#[derive(Args, Clone)]
pub struct DeleteArgs {
    #[arg(long)]
    pub entity: String,
}

#[derive(Args, Clone)]
pub struct UsageArgs {
    #[arg(long)]
    pub user: String,
}

#[derive(Args, Clone)]
pub struct SetTierArgs {
    #[arg(long)]
    pub user: String,

    /// free, pro or enterprise
    #[arg(long)]
    pub tier: SubscriptionTier,
}

pub async fn delete(args: DeleteArgs) -> anyhow::Result<()> {
    let engine = bootstrap().await?;
    let entity_id = EntityId::new(&args.entity)?;

    let deleted = engine.delete_entity(&entity_id).await?;
    print_json(&json!({ "entity": entity_id, "deleted": deleted }))
}

pub async fn usage(args: UsageArgs) -> anyhow::Result<()> {
    let engine = bootstrap().await?;
    print_json(&engine.usage_status(&args.user).await?)
}

pub async fn set_tier(args: SetTierArgs) -> anyhow::Result<()> {
    let engine = bootstrap().await?;
    engine.set_tier(&args.user, args.tier).await?;
    print_json(&engine.usage_status(&args.user).await?)
}
