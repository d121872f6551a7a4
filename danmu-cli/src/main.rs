//! `danmu` - query the cross-provider danmu aggregation engine.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use danmu_core::ProviderParams;
use danmu_providers::ProviderRegistry;

#[derive(Parser)]
#[command(name = "danmu", version, about = "Cross-provider danmu aggregation")]
struct Cli {
    /// Disable merging of identical comments across providers
    #[arg(long, global = true)]
    no_aggregation: bool,

    /// Drop comments matching this regular expression
    #[arg(long, global = true)]
    blacklist: Option<String>,

    /// Overall timeout for one aggregation call, in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search all capable providers (plus the secondary matcher) for a drama
    Search {
        /// Search keyword
        keyword: String,
    },
    /// List the episodes behind one or more `provider:idString` pairs
    Episodes {
        /// Comma-separated `provider:idString` list
        ids: String,
        /// Only return the episode with this number
        #[arg(long)]
        episode: Option<u32>,
    },
    /// Fetch the merged comments active at a playback position
    Danmu {
        /// Comma-separated `provider:idString` list
        ids: String,
        /// Playback position in seconds
        #[arg(long, default_value_t = 0.0)]
        time: f64,
    },
}

fn build_params(cli: &Cli) -> ProviderParams {
    let mut params = ProviderParams::new()
        .aggregation_enabled(!cli.no_aggregation)
        .request_timeout(Duration::from_secs(cli.timeout));
    params.set_blacklist(cli.blacklist.as_deref());
    params
}

/// Split a composite `provider:idString` list into request pairs.
fn split_requests(ids: &str) -> Vec<(String, String)> {
    ids.split(',')
        .filter_map(|part| {
            let (provider, id_string) = part.trim().split_once(':')?;
            Some((provider.to_string(), id_string.to_string()))
        })
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let registry = ProviderRegistry::with_defaults();
    registry.update_params(build_params(&cli));

    let output = match &cli.command {
        Commands::Search { keyword } => {
            let dramas = registry.get_episode_params(keyword).await;
            serde_json::to_value(dramas)
        }
        Commands::Episodes { ids, episode } => {
            let requests = split_requests(ids);
            let episodes = registry.get_episodes(&requests, *episode).await;
            serde_json::to_value(episodes)
        }
        Commands::Danmu { ids, time } => {
            let comments = registry.get_danmu(ids, *time).await;
            serde_json::to_value(comments)
        }
    };

    match output.and_then(|v| serde_json::to_string_pretty(&v)) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to serialize output");
            ExitCode::FAILURE
        }
    }
}
