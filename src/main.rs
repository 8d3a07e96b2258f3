//! deskbuddy CLI - run the support query pipeline from a terminal
//!
//! One-shot mode answers a single question; without a query it drops
//! into an interactive loop. Intended for operating and smoke-testing a
//! knowledge base, not as the production transport (that lives in the
//! webhook service that embeds this crate).

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deskbuddy::config::RagConfig;
use deskbuddy::embedding::SentenceEmbedder;
use deskbuddy::generation::OllamaGenerator;
use deskbuddy::index::{ChunkStore, FlatIndex};
use deskbuddy::query::{PipelineResult, QueryPipeline};
use deskbuddy::ratelimit::SlidingWindowLimiter;
use deskbuddy::sink::QueryLog;

#[derive(Parser, Debug)]
#[command(name = "deskbuddy", version, about = "Closed-domain support assistant query core")]
struct Args {
    /// Path to config.toml (default: ~/.deskbuddy/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the chunk snapshot path
    #[arg(long)]
    chunks: Option<PathBuf>,

    /// Override the Ollama model
    #[arg(short, long)]
    model: Option<String>,

    /// Requester id used for rate limiting
    #[arg(short, long, default_value = "cli-user")]
    requester: String,

    /// Answer a single query and exit; omit for interactive mode
    query: Option<String>,

    /// Skip startup health checks
    #[arg(long)]
    skip_checks: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = RagConfig::load(args.config.clone()).context("loading configuration")?;
    if let Some(model) = &args.model {
        config.ollama.model = model.clone();
    }

    let chunks_path = args.chunks.clone().unwrap_or_else(|| config.chunks_file());

    let store = Arc::new(
        ChunkStore::load(&chunks_path).with_context(|| {
            format!(
                "loading chunk snapshot from {} (run the ingestion step first)",
                chunks_path.display()
            )
        })?,
    );
    let index = Arc::new(FlatIndex::build(&store).context("building vector index")?);

    let generator = Arc::new(
        OllamaGenerator::with_config(
            &config.ollama_url(),
            &config.ollama.model,
            Duration::from_secs(config.responder.timeout_seconds),
        )
        .context("creating Ollama client")?,
    );

    if !args.skip_checks {
        run_startup_checks(&store, &generator).await;
    }

    eprintln!("{}", "Cargando modelo de embeddings...".dimmed());
    let embedder = Arc::new(SentenceEmbedder::new().context("loading embedding model")?);

    let limiter = Arc::new(SlidingWindowLimiter::new(&config.rate_limit));
    let log = QueryLog::new();

    let pipeline = QueryPipeline::new(
        &config,
        store,
        index,
        embedder,
        generator,
        limiter,
        Arc::new(log.clone()),
    );

    match &args.query {
        Some(query) => {
            let result = pipeline.process(&args.requester, query).await;
            print_result(&result);
        }
        None => interactive_loop(&pipeline, &log, &args.requester).await?,
    }

    Ok(())
}

async fn run_startup_checks(store: &ChunkStore, generator: &OllamaGenerator) {
    eprintln!(
        "{} {} chunks en {} dimensiones",
        "Base de conocimiento:".dimmed(),
        store.len(),
        store.dimension()
    );

    match generator.health_check().await {
        Ok(true) => eprintln!(
            "{} {} ({})",
            "Ollama:".dimmed(),
            "disponible".green(),
            generator.model()
        ),
        _ => eprintln!(
            "{} {} en {}: las respuestas usarán el mensaje de contingencia",
            "Ollama:".dimmed(),
            "no disponible".yellow(),
            generator.base_url()
        ),
    }
}

async fn interactive_loop(
    pipeline: &QueryPipeline,
    log: &QueryLog,
    requester: &str,
) -> Result<()> {
    println!(
        "{}",
        "deskbuddy: escriba su consulta (:stats, :salir)".bold()
    );

    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line).ok();

                match line {
                    ":salir" | ":exit" | ":q" => break,
                    ":stats" => print_stats(pipeline, log),
                    _ => {
                        let result = pipeline.process(requester, line).await;
                        print_result(&result);
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn print_result(result: &PipelineResult) {
    println!();
    if result.success {
        println!("{}", result.response);
    } else {
        println!("{}", result.response.yellow());
    }

    let mut meta = vec![
        format!("intent: {}", result.intent.label()),
        format!("{} ms", result.latency_ms),
    ];
    if result.cache_hit {
        meta.push("cache".to_string());
    }
    if result.tokens_used > 0 {
        meta.push(format!("{} tokens", result.tokens_used));
    }
    if let Some(error) = &result.error {
        meta.push(format!("error: {}", error));
    }
    println!("{}", format!("[{}]", meta.join(" | ")).dimmed());

    for source in &result.sources {
        println!(
            "{}",
            format!(
                "  fuente: {} ({}) score {:.2}",
                source.source_file, source.section_label, source.score
            )
            .dimmed()
        );
    }
    println!();
}

fn print_stats(pipeline: &QueryPipeline, log: &QueryLog) {
    let cache = pipeline.cache_stats();
    let stats = log.stats();

    println!("Consultas procesadas:  {}", stats.processed);
    println!("  exitosas:            {}", stats.succeeded);
    println!("  rechazadas:          {}", stats.rejected);
    println!("  rate-limited:        {}", stats.rate_limited);
    println!("  degradadas:          {}", stats.degraded);
    println!("Cache: {} entradas, {} hits, {} misses ({:.0}% hit rate)",
        cache.entries,
        cache.hits,
        cache.misses,
        cache.hit_rate() * 100.0
    );
    println!("Tokens consumidos:     {}", stats.tokens_used);
    println!("Latencia media:        {:.0} ms", stats.mean_latency_ms());
}
