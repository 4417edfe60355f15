use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use lila_bot::config::Settings;
use lila_bot::indexer::chunker::TextSplitter;
use lila_bot::indexer::index_files;
use lila_bot::indexer::walker::walk_directory;
use lila_bot::openai::OpenAiClient;
use lila_bot::rag::vector_store::{self, ensure_index};

#[derive(Parser, Debug)]
#[command(name = "memory-indexer")]
#[command(about = "Load text files into the bot's memory index")]
struct Args {
    /// Directory to recursively index
    #[arg(short, long)]
    dir: PathBuf,

    /// Maximum chunk size in characters
    #[arg(long, default_value_t = 1000)]
    chunk_size: usize,

    /// Overlap between chunks in characters
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Chunks embedded per request
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    lila_bot::init_tracing();
    let args = Args::parse();

    if !args.dir.exists() {
        anyhow::bail!("Directory does not exist: {}", args.dir.display());
    }
    let splitter = TextSplitter::new(args.chunk_size, args.chunk_overlap)?;
    let batch_size = args.batch_size.max(1);

    let settings = Settings::load()?;
    let embeddings = OpenAiClient::from_settings(&settings)?;

    println!("Connecting to {:?} index {}...", settings.index.provider, settings.index.name);
    let store = vector_store::connect(&settings).await?;
    ensure_index(store.as_ref(), &settings.index.name, settings.index.dimension).await?;

    println!("Scanning directory: {}", args.dir.display());
    let files = walk_directory(&args.dir);
    println!("Found {} text files", files.len());

    if files.is_empty() {
        println!("No text files found. Exiting.");
        return Ok(());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let report = index_files(&files, &splitter, batch_size, &embeddings, store.as_ref(), |path| {
        pb.set_message(path.file_name().unwrap_or_default().to_string_lossy().to_string());
        pb.inc(1);
    })
    .await;

    pb.finish_with_message("done");

    println!("\nIndexing complete!");
    println!("  Files processed: {}/{}", report.processed, files.len());
    println!("  Files failed:    {}", report.failed.len());
    println!("  Total chunks:    {}", report.total_chunks);
    println!("  Index:           {}", settings.index.name);

    if !report.failed.is_empty() {
        println!("\nFailed files:");
        for (path, err) in &report.failed {
            println!("  {}: {}", path.display(), err);
        }
    }

    Ok(())
}
