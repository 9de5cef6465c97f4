mod config;
mod summary;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use modpack_pm::provider::GithubSettings;
use modpack_pm::{run_batch, HttpClient, HttpClientConfig, PackConfig, Transport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

const GITHUB_API_HOST: &str = "api.github.com";

#[derive(Parser, Debug)]
#[command(name = "modpack")]
#[command(about = "Resolve mod declarations and lay out modpack install trees")]
struct Args {
    /// Pack configuration file
    #[arg(short = 'c', long, default_value = "modpack.toml")]
    config: PathBuf,

    /// Only build this pack (can be used multiple times)
    #[arg(short = 'p', long = "pack", value_name = "NAME", action = clap::ArgAction::Append)]
    packs: Vec<String>,

    /// Resolve entries without downloading or writing the install tree
    #[arg(long)]
    dry_run: bool,

    /// Disable progress output
    #[arg(long)]
    no_progress: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Shared HTTP client; the first pack with a GitHub token authenticates API
/// requests for the whole batch.
fn http_client(packs: &[PackConfig]) -> Result<HttpClient> {
    let mut config = HttpClientConfig::new();
    for pack in packs {
        let github: GithubSettings = pack.provider_settings.section("github")?;
        if let Some(token) = github.token {
            config = config.with_bearer(GITHUB_API_HOST, token);
            break;
        }
    }
    HttpClient::with_config(config).context("Failed to create HTTP client")
}

async fn run(args: Args) -> Result<u8> {
    let packs = config::load_packs(&args.config, &args.packs)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if packs.is_empty() {
        println!("{} Nothing to do", style("Info:").cyan());
        return Ok(0);
    }

    if args.dry_run {
        println!("{} Running in dry-run mode", style("Info:").cyan());
    }

    let transport: Arc<dyn Transport> = Arc::new(http_client(&packs)?);

    let spinner = if args.no_progress || args.verbose > 0 {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };
    let names: Vec<&str> = packs.iter().map(|p| p.name.as_str()).collect();
    spinner.set_message(format!("Building {}...", names.join(", ")));

    let outcomes = run_batch(packs, transport, args.dry_run).await;
    spinner.finish_and_clear();

    let failed = summary::print_outcomes(&outcomes, args.dry_run);
    if failed > 0 {
        eprintln!(
            "{} {} of {} packs failed",
            style("Error:").red().bold(),
            failed,
            outcomes.len()
        );
        return Ok(1);
    }
    Ok(0)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.verbose);

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
