use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt_transcript::extractors::{is_playlist_url, youtube::YtDlpCatalog, VideoRef};
use yt_transcript::output::{self, FormatOptions};
use yt_transcript::transcript::api::ApiFetcher;
use yt_transcript::transcript::batch::{BatchOptions, BatchRunner};
use yt_transcript::transcript::browser::{BrowserFallback, UserAgentPool};
use yt_transcript::transcript::{FallbackSource, TranscriptService};
use yt_transcript::{utils, Cli, Config};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "yt_transcript=debug"
    } else if cli.quiet {
        "yt_transcript=warn"
    } else {
        "yt_transcript=info"
    };

    // Logs go to stderr so stdout carries only the transcript
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    let language = cli.language.clone().unwrap_or_else(|| config.language.clone());
    let Ok(delay) = Duration::try_from_secs_f64(cli.delay.unwrap_or(config.delay)) else {
        anyhow::bail!("--delay must be a non-negative number of seconds");
    };
    let format = FormatOptions {
        timestamps: cli.timestamps,
        paragraphs: !cli.no_formatting,
    };

    let primary = Arc::new(ApiFetcher::new(Duration::from_secs(config.request_timeout_secs))?);
    let fallback: Option<Arc<dyn FallbackSource>> =
        if cli.use_playwright_fallback.unwrap_or(config.browser_fallback) {
            Some(Arc::new(BrowserFallback::new(
                UserAgentPool::new(config.user_agents.clone()),
                cli.headless.unwrap_or(config.headless),
            )))
        } else {
            None
        };
    let service = TranscriptService::new(primary, fallback);

    if is_playlist_url(&cli.url) {
        let missing_deps = utils::check_dependencies(&config.yt_dlp_path).await;
        if !missing_deps.is_empty() {
            eprintln!("⚠️  Dependency check warnings:");
            for dep in missing_deps {
                eprintln!("   • {}", dep);
            }
        }

        let output_dir = cli.output.clone().unwrap_or_else(|| config.output_dir.clone());
        println!(
            "Detected playlist URL. Downloading all transcripts to: {}",
            output_dir.display()
        );

        let catalog = YtDlpCatalog::new(
            config.yt_dlp_path.clone(),
            Duration::from_secs(config.title_timeout_secs),
        );
        let options = BatchOptions {
            language,
            format,
            delay,
            max_retries: cli.max_retries.unwrap_or(config.max_retries),
            skip_existing: true,
            show_progress: !cli.quiet,
        };

        let runner = BatchRunner::new(service, Arc::new(catalog), options);
        let report = runner.run_playlist(&cli.url, &output_dir).await?;

        println!(
            "\n✓ Downloaded {}/{} transcripts to {}/",
            report.succeeded(),
            report.total(),
            output_dir.display()
        );
        return Ok(());
    }

    let video = VideoRef::parse(&cli.url)?;
    let result = service.acquire(&video, &language).await?;

    match &cli.output {
        Some(path) => {
            output::save_to_file(&result, path, &format)?;
            println!("✓ Transcript saved to: {}", path.display());
        }
        None => output::print_to_console(&result, &format),
    }

    Ok(())
}
