//! Ingest command - indexes document files for an entity

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use tracing::info;

use super::{bootstrap, print_json};
use crate::domain::context::{DocumentMetadata, EntityId, EntityProfile};

#[derive(Args, Clone)]
pub struct IngestArgs {
    /// Entity the documents belong to
    #[arg(long)]
    pub entity: String,

    /// Display name; registers or updates the entity profile
    #[arg(long)]
    pub name: Option<String>,

    /// Industry used for evidence queries
    #[arg(long)]
    pub industry: Option<String>,

    /// Plain-text or markdown files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct IngestedFile {
    file: String,
    chunks: usize,
}

pub async fn run(args: IngestArgs) -> anyhow::Result<()> {
    let engine = bootstrap().await?;
    let entity_id = EntityId::new(&args.entity)?;

    let existing = engine.entity(&entity_id).await?;
    if args.name.is_some() || args.industry.is_some() || existing.is_none() {
        let mut profile = existing
            .unwrap_or_else(|| EntityProfile::new(entity_id.clone(), args.entity.clone()));
        if let Some(name) = args.name {
            profile.name = name;
        }
        if let Some(industry) = args.industry {
            profile.industry = Some(industry);
        }
        engine.register_entity(&profile).await?;
    }

    let mut ingested = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut metadata = DocumentMetadata::new().with_source_id(path.display().to_string());
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            metadata = metadata.with_doc_type(ext.to_lowercase());
        }

        let chunks = engine.add_document(&entity_id, &text, metadata).await?;
        info!(file = %path.display(), chunks, "Ingested document");
        ingested.push(IngestedFile {
            file: path.display().to_string(),
            chunks,
        });
    }

    print_json(&ingested)
}
