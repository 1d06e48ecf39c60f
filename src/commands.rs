//! CLI command implementations.
//!
//! Each `run_*` function opens the [`DocumentService`] from configuration,
//! performs one operation and prints a human-readable result to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use crate::chat::ChatService;
use crate::config::Config;
use crate::extract::DocumentFormat;
use crate::llm::create_completion_provider;
use crate::models::RetrievalMode;
use crate::service::DocumentService;

/// Expand `paths` into the files to upload. Directories are walked
/// recursively and filtered to recognized extensions; explicit file
/// arguments are passed through so unsupported ones report an error.
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    e.file_name()
                        .to_str()
                        .and_then(DocumentFormat::from_filename)
                        .is_some()
                })
                .map(|e| e.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}

pub async fn run_upload(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let service = DocumentService::open(config).await?;
    let files = collect_files(paths);
    if files.is_empty() {
        bail!("no supported files found");
    }

    let mut failed = 0usize;
    for file in &files {
        match service.upload_path(file).await {
            Ok(summary) => println!(
                "{}  {}  pages={}  chunks={}  chars={}",
                summary.id,
                summary.filename,
                summary
                    .pages
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".into()),
                summary.chunk_count,
                summary.total_chars
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", file.display(), e);
            }
        }
    }

    println!("Uploaded {} of {} files.", files.len() - failed, files.len());
    if failed > 0 {
        bail!("{} uploads failed", failed);
    }
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let service = DocumentService::open(config).await?;
    let documents = service.list().await?;
    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for d in &documents {
        println!(
            "{}  {:<5} {:>8} chars  {:>4} chunks  {}  {}",
            d.id,
            d.format.as_str(),
            d.total_chars,
            d.chunk_count,
            d.uploaded_at.format("%Y-%m-%d %H:%M"),
            d.filename
        );
    }
    println!("{} documents.", documents.len());
    Ok(())
}

pub async fn run_get(config: &Config, id: &str, text: bool) -> Result<()> {
    let service = DocumentService::open(config).await?;
    let record = service.get(id).await?;
    if text {
        println!("{}", record.text);
        return Ok(());
    }
    let summary = record.summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let service = DocumentService::open(config).await?;
    service.delete(id).await?;
    println!("Deleted {}.", id);
    Ok(())
}

pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let service = DocumentService::open(config).await?;
    let k = limit.unwrap_or(config.retrieval.top_k);
    let passages = service.retrieve_passages(query, k).await?;
    if passages.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, p) in passages.iter().enumerate() {
        let label = match (p.mode, p.score) {
            (RetrievalMode::Semantic, Some(score)) => format!("score={:.3}", score),
            _ => "lexical".to_string(),
        };
        println!("{}. [{}] {}", i + 1, label, p.document_id);
        println!("{}", preview(&p.content, 300));
        println!();
    }
    Ok(())
}

pub async fn run_ask(config: &Config, question: &str, document: Option<&str>) -> Result<()> {
    let llm = create_completion_provider(&config.llm)?
        .context("llm.provider is disabled; configure a provider to ask questions")?;
    let documents = Arc::new(DocumentService::open(config).await?);
    let chat = ChatService::new(documents, llm, config.llm.clone());

    let answer = chat.ask(question, &[], document).await?;
    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources: {}", answer.sources.join(", "));
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
