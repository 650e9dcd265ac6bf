//! throwback-post - Post a random throwback album to Twitter/X and Bluesky

use anyhow::Context;
use clap::{Parser, ValueEnum};
use libthrowback::caption::TemplatePaths;
use libthrowback::config::{expand_path, Config};
use libthrowback::history::HistoryLedger;
use libthrowback::logging::LoggingConfig;
use libthrowback::manifest;
use libthrowback::poster::{create_publishers, PublisherSettings};
use libthrowback::{PlatformSelection, PublishOrchestrator, RunOptions, RunReport, ThrowbackError};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "throwback-post")]
#[command(version, about = "Post a random throwback album that has not been posted recently")]
#[command(long_about = r#"Pick one album from a cover manifest that has not been posted within the
threshold, render a caption per platform, and post it with its cover images.

EXAMPLES:
    # Preview what would be posted
    throwback-post --dry-run

    # Reproducible pick, Bluesky only
    throwback-post --seed 2025-06 --platform bluesky

    # Force a specific album regardless of history
    throwback-post --set-name "Autumn Lake"

    # Machine-readable report
    throwback-post --dry-run --format json | jq '.outcomes[].caption'

EXIT CODES:
    0 - Every requested platform succeeded (or dry run)
    1 - One or more platforms failed to publish
    2 - Configuration, manifest or history error
    3 - No eligible sets, or --set-name not found
    4 - Template error
"#)]
struct Cli {
    /// Path to manifest.json
    #[arg(long, env = "THROWBACK_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Directory containing cover images
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Twitter auth JSON file (legacy flag, same as --twitter-auth)
    #[arg(long)]
    auth: Option<PathBuf>,

    /// Twitter auth JSON file (overrides --auth)
    #[arg(long)]
    twitter_auth: Option<PathBuf>,

    /// Bluesky auth JSON file
    #[arg(long)]
    bluesky_auth: Option<PathBuf>,

    /// History file used to avoid repeats
    #[arg(long)]
    history: Option<PathBuf>,

    /// Do not repeat a set within this many days
    #[arg(long)]
    threshold_days: Option<u32>,

    /// Post this set (exact name), ignoring the threshold
    #[arg(long)]
    set_name: Option<String>,

    /// Seed for a reproducible choice
    #[arg(long)]
    seed: Option<String>,

    /// Twitter caption template
    #[arg(long)]
    template: Option<PathBuf>,

    /// Bluesky caption template (falls back to the Twitter template)
    #[arg(long)]
    bluesky_template: Option<PathBuf>,

    /// Marker appended to truncated captions
    #[arg(long)]
    ellipsis: Option<String>,

    /// Largest image uploaded as-is, in MB
    #[arg(long)]
    max_image_mb: Option<u64>,

    /// Where to post: twitter, bluesky, or both
    #[arg(long)]
    platform: Option<PlatformSelection>,

    /// Print what would be posted without posting
    #[arg(long)]
    dry_run: bool,

    /// With --dry-run, still record the selection in history
    #[arg(long, requires = "dry_run")]
    record_dry_run: bool,

    /// Per-request network timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: ~/.config/throwback/config.toml)
    #[arg(long, env = "THROWBACK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<ThrowbackError>()
        .map(ThrowbackError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = Config::load(cli.config.as_deref())?;
    let settings = Settings::merge(&cli, &config)?;

    let sets = manifest::load(&settings.manifest)?;
    let ledger = HistoryLedger::load(&settings.history, &settings.legacy_history)?;
    tracing::debug!(
        "Loaded {} sets and {} history records",
        sets.len(),
        ledger.len()
    );

    let options = RunOptions {
        threshold_days: settings.threshold_days,
        override_set: cli.set_name.as_deref().map(manifest::normalize_set_name),
        seed: cli.seed.clone(),
        platforms: settings.platforms.platforms(),
        dry_run: cli.dry_run,
        record_dry_run: cli.record_dry_run,
        images_dir: settings.images_dir.clone(),
        templates: settings.templates.clone(),
        ellipsis: settings.ellipsis.clone(),
        twitter_limit: config.caption.twitter_limit,
        bluesky_limit: config.caption.bluesky_limit,
    };

    let mut orchestrator = if cli.dry_run {
        PublishOrchestrator::new(sets, ledger, Vec::new())
    } else {
        let (publishers, unavailable) = create_publishers(
            &options.platforms,
            &PublisherSettings {
                twitter_auth: settings.twitter_auth.clone(),
                bluesky_auth: settings.bluesky_auth.clone(),
                max_image_mb: settings.max_image_mb,
                timeout: Duration::from_secs(settings.timeout_secs),
            },
        );
        unavailable.into_iter().fold(
            PublishOrchestrator::new(sets, ledger, publishers),
            |orchestrator, (platform, error)| orchestrator.with_unavailable(platform, error),
        )
    };

    let report = orchestrator.run(&options, chrono::Utc::now()).await?;

    match cli.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{}", json);
        }
        OutputFormat::Text => print_text(&report, orchestrator.ledger().path()),
    }

    Ok(report.exit_code())
}

/// Effective settings after layering CLI flags over the config file
struct Settings {
    manifest: PathBuf,
    images_dir: PathBuf,
    history: PathBuf,
    legacy_history: Vec<PathBuf>,
    twitter_auth: PathBuf,
    bluesky_auth: PathBuf,
    templates: TemplatePaths,
    threshold_days: u32,
    ellipsis: String,
    platforms: PlatformSelection,
    max_image_mb: u64,
    timeout_secs: u64,
}

impl Settings {
    /// Layer flags over `config`, then hold the result to the config file's bounds
    fn merge(cli: &Cli, config: &Config) -> libthrowback::Result<Self> {
        let paths = &config.paths;
        // Legacy history files only stand in for the default ledger
        let legacy_history = if cli.history.is_some() {
            Vec::new()
        } else {
            paths.legacy_history.iter().map(|p| expand_path(p)).collect()
        };

        let twitter_template = cli
            .template
            .clone()
            .or_else(|| paths.twitter_template.as_deref().map(expand_path));
        let bluesky_template = cli
            .bluesky_template
            .clone()
            .or_else(|| paths.bluesky_template.as_deref().map(expand_path));

        let settings = Self {
            manifest: cli.manifest.clone().unwrap_or_else(|| expand_path(&paths.manifest)),
            images_dir: cli
                .images_dir
                .clone()
                .unwrap_or_else(|| expand_path(&paths.images_dir)),
            history: cli.history.clone().unwrap_or_else(|| expand_path(&paths.history)),
            legacy_history,
            twitter_auth: cli
                .twitter_auth
                .clone()
                .or_else(|| cli.auth.clone())
                .unwrap_or_else(|| expand_path(&paths.twitter_auth)),
            bluesky_auth: cli
                .bluesky_auth
                .clone()
                .unwrap_or_else(|| expand_path(&paths.bluesky_auth)),
            templates: TemplatePaths::resolve(twitter_template, bluesky_template, Path::new(".")),
            threshold_days: cli.threshold_days.unwrap_or(config.selection.threshold_days),
            ellipsis: cli.ellipsis.clone().unwrap_or_else(|| config.caption.ellipsis.clone()),
            platforms: cli.platform.unwrap_or(config.publish.platforms),
            max_image_mb: cli.max_image_mb.unwrap_or(config.publish.max_image_mb),
            timeout_secs: cli.timeout_secs.unwrap_or(config.publish.timeout_secs),
        };

        let mut effective = config.clone();
        effective.caption.ellipsis = settings.ellipsis.clone();
        effective.publish.max_image_mb = settings.max_image_mb;
        effective.publish.timeout_secs = settings.timeout_secs;
        effective.validate()?;

        Ok(settings)
    }
}

fn print_text(report: &RunReport, history_path: &Path) {
    match &report.set_url {
        Some(url) => println!("Selected set: {} ({})", report.set_name, url),
        None => println!("Selected set: {}", report.set_name),
    }

    for outcome in &report.outcomes {
        if report.dry_run {
            println!("\nDRY RUN - would post to {}:\n{}", outcome.platform, outcome.caption);
            if outcome.recorded {
                println!("Recorded dry run in history: {}", history_path.display());
            }
            continue;
        }

        match (&outcome.error, &outcome.url, &outcome.post_id) {
            (Some(error), _, _) => println!("✗ {}: {}", outcome.platform, error),
            (None, Some(url), _) => println!("✓ {}: {}", outcome.platform, url),
            (None, None, Some(id)) => println!("✓ {}: {}", outcome.platform, id),
            (None, None, None) => println!("✓ {}", outcome.platform),
        }
        if let Some(error) = &outcome.history_error {
            println!("  ! history not updated: {}", error);
        }
    }
}
