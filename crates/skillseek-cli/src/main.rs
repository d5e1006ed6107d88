use anyhow::Result;
use clap::{Parser, Subcommand};
use skillseek_mcp::SkillsMcpServer;
use skillseek_runtime::{FastEmbedder, ServiceConfig, ServiceContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "skillseek")]
#[command(about = "Semantic retrieval service for agent skills", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the JSON configuration file (built-in defaults if omitted)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the retrieval service
    ///
    /// Speaks MCP over stdio by default. With --http it serves the
    /// streamable MCP endpoint at /mcp plus the upload and health
    /// endpoints instead.
    Serve {
        /// Serve over HTTP instead of stdio
        #[arg(long)]
        http: bool,

        /// Host to bind in HTTP mode
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind in HTTP mode
        #[arg(short, long, default_value_t = 8090)]
        port: u16,
    },

    /// One-shot search: ingest the configured sources, print the best
    /// matches for a task description, and exit
    Find {
        /// Natural language task description
        query: String,

        /// Number of results
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<usize>,
    },
}

// Exit codes: 0 clean shutdown, 1 configuration error, 2 unrecoverable
// runtime error.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr: stdout is reserved for stdio JSON-RPC.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    let embedder = match FastEmbedder::new(&config.embedding_model) {
        Ok(embedder) => Arc::new(embedder),
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    let ctx = ServiceContext::new(config, embedder);

    let result = match cli.command {
        Commands::Serve { http, host, port } => serve(ctx, http, &host, port).await,
        Commands::Find { query, top_k } => find(ctx, &query, top_k).await,
    };

    if let Err(e) = result {
        eprintln!("fatal: {e}");
        std::process::exit(2);
    }
}

fn load_config(path: Option<&Path>) -> skillseek_runtime::Result<ServiceConfig> {
    match path {
        Some(path) => ServiceConfig::load(path),
        None => {
            let config = ServiceConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn serve(ctx: Arc<ServiceContext>, http: bool, host: &str, port: u16) -> Result<()> {
    tracing::info!(
        sources = ctx.config.skill_sources.len(),
        model = %ctx.config.embedding_model,
        "starting skillseek"
    );
    ctx.start();
    let mut fatal = ctx.loading().fatal_signal();

    let transport = {
        let ctx = ctx.clone();
        let host = host.to_string();
        async move {
            if http {
                skillseek_http::serve(ctx, &host, port).await
            } else {
                SkillsMcpServer::run_stdio(ctx).await
            }
        }
    };

    tokio::select! {
        result = transport => {
            ctx.coordinator.stop().await;
            result
        }
        _ = fatal.changed() => {
            let message = fatal.borrow().clone().unwrap_or_default();
            ctx.coordinator.stop().await;
            Err(anyhow::anyhow!(message))
        }
    }
}

async fn find(ctx: Arc<ServiceContext>, query: &str, top_k: Option<usize>) -> Result<()> {
    ctx.start();
    let mut fatal = ctx.loading().fatal_signal();
    while !ctx.loading().is_complete() {
        if fatal.has_changed().unwrap_or(false) {
            let message = fatal.borrow_and_update().clone().unwrap_or_default();
            return Err(anyhow::anyhow!(message));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let top_k = top_k.unwrap_or(ctx.config.default_top_k).clamp(1, 20);
    let hits = ctx.index.search(query, top_k, None, &[]).await?;
    if hits.is_empty() {
        println!("no skills matched");
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} ({:.4})\n   {}\n   source: {}",
            rank + 1,
            hit.skill.name,
            hit.relevance_score,
            hit.skill.description,
            hit.skill.source,
        );
    }
    ctx.coordinator.stop().await;
    Ok(())
}
