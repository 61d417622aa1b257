use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use ayurveda_research::{
    config::Config, create_router, utils::init_logger, AppState, RequestOptions, ResearchPipeline,
};

#[derive(Parser)]
#[command(name = "ayurveda-research", version, about = "Evidence reports on Ayurveda from PubMed")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one question and print the markdown report
    Ask {
        /// The research question
        query: String,
        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Run the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = init_logger(config.logging.directory.as_deref());

    let result = match cli.command {
        Command::Ask { query, timeout_secs } => ask(&config, &query, timeout_secs).await,
        Command::Serve => serve(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn ask(config: &Config, query: &str, timeout_secs: Option<u64>) -> anyhow::Result<()> {
    let pipeline = ResearchPipeline::from_config(config)?;
    let options = timeout_secs
        .map(|secs| RequestOptions::with_deadline(Duration::from_secs(secs)))
        .unwrap_or_default();

    let report = pipeline.answer_with(query, options).await?;
    println!("{}", report);
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(ResearchPipeline::from_config(&config)?);
    let state = AppState {
        pipeline,
        config: config.clone(),
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
