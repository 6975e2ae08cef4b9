use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use docvec::{
    access_log::{self, RequestContext},
    config::Config,
    embedding, logging,
    pipeline::{ContentType, DocumentRequest, PipelineService, PipelineSettings},
};
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "docvec-embed",
    about = "Embed a single document from disk and print the result as JSON"
)]
struct Cli {
    /// Document to embed (`.json`, `.pdf`, anything else is read as plain text).
    path: PathBuf,
    /// Override the content type inferred from the file extension.
    #[arg(long)]
    content_type: Option<String>,
    /// Override `CHUNK_SIZE`.
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Override `CHUNK_OVERLAP`.
    #[arg(long)]
    chunk_overlap: Option<usize>,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

fn infer_content_type(path: &std::path::Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => ContentType::Json.as_str(),
        Some("pdf") => ContentType::Pdf.as_str(),
        _ => ContentType::PlainText.as_str(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(size) = cli.chunk_size {
        config.chunk_size = size;
    }
    if let Some(overlap) = cli.chunk_overlap {
        config.chunk_overlap = overlap;
    }

    let body = tokio::fs::read(&cli.path)
        .await
        .with_context(|| format!("failed to read {}", cli.path.display()))?;
    let content_type = cli
        .content_type
        .clone()
        .unwrap_or_else(|| infer_content_type(&cli.path).to_string());

    let model = embedding::build_embedding_model(&config).context("failed to load model")?;
    let service = PipelineService::new(Arc::clone(&model), PipelineSettings::from(&config));
    let context = RequestContext::new("local", "CLI", cli.path.display().to_string());

    let request = DocumentRequest::new(content_type, body);
    let outcome = access_log::track_call(&context, service.embed_document(request, &context))
        .await
        .map_err(|error| anyhow::anyhow!("{} ({})", error, error.detail_kind()))?;

    let output = json!({
        "num_chunks": outcome.num_chunks,
        "chunk_embedding_shape": outcome.chunk_embedding_shape(),
        "document_embedding": outcome.document_embedding.values,
    });
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{rendered}");
    Ok(())
}
