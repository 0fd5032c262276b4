//! CLI commands implementation.
//!
//! This module contains the CLI parser and the command handlers.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use tokio::sync::mpsc;

use zsxq_archive::config::{load_settings_with_options, LoadOptions, Settings};
use zsxq_archive::models::CredentialContext;
use zsxq_archive::scrapers::RendererKind;
use zsxq_archive::services::{CrawlOptions, Crawler};
use zsxq_archive::storage::OutputFormat;

use super::helpers;

#[derive(Parser)]
#[command(name = "zsxq")]
#[command(about = "Archive posts, comments and images from Knowledge Planet groups")]
#[command(version)]
pub struct Cli {
    /// Session cookie string copied from a logged-in browser
    #[arg(long, env = "ZSXQ_COOKIE", global = true, hide_env_values = true)]
    cookie: Option<String>,

    /// Access token (sent as the zsxq_access_token cookie)
    #[arg(long, env = "ZSXQ_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Output directory for exports and images
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Export format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the credentials can read a group
    Check {
        /// Group ID (prompted if omitted)
        group_id: Option<String>,
    },

    /// Crawl a group through the API, falling back to the web view
    Group {
        /// Group ID (prompted if omitted)
        group_id: Option<String>,
        /// Number of posts to collect
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
        /// Also fetch comments for every post
        #[arg(long)]
        comments: bool,
        /// Download post images
        #[arg(long)]
        images: bool,
        /// Renderer used for the web-view fallback
        #[arg(long, value_enum)]
        renderer: Option<RendererKind>,
        /// Do not fall back to the web view when the API fails
        #[arg(long)]
        no_fallback: bool,
        /// Stop after this many topic pages
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Crawl a rendered web page
    Web {
        /// Page URL (prompted if omitted and no group is given)
        url: Option<String>,
        /// Render this group's web view instead of a URL
        #[arg(short, long)]
        group: Option<String>,
        /// Download post images
        #[arg(long)]
        images: bool,
        /// Renderer to use
        #[arg(long, value_enum)]
        renderer: Option<RendererKind>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
    };
    let (mut settings, _config) = load_settings_with_options(options)
        .await
        .context("Failed to load configuration")?;

    if let Some(dir) = cli.output_dir {
        settings.output_dir = dir;
    }

    let credentials = helpers::resolve_credentials(cli.cookie, cli.token)?;

    match cli.command {
        Commands::Check { group_id } => {
            let group_id = helpers::value_or_prompt(group_id, "Group ID:")?;
            cmd_check(settings, credentials, &group_id).await
        }
        Commands::Group {
            group_id,
            count,
            comments,
            images,
            renderer,
            no_fallback,
            max_pages,
        } => {
            let group_id = helpers::value_or_prompt(group_id, "Group ID:")?;
            if let Some(renderer) = renderer {
                settings.renderer = renderer;
            }
            if max_pages.is_some() {
                settings.max_pages = max_pages;
            }
            let options = CrawlOptions {
                count,
                with_comments: comments,
                save_images: images,
                format: cli.format,
            };
            cmd_group(settings, credentials, &group_id, &options, !no_fallback).await
        }
        Commands::Web {
            url,
            group,
            images,
            renderer,
        } => {
            if let Some(renderer) = renderer {
                settings.renderer = renderer;
            }
            let url = match (url, group) {
                (Some(url), _) => url,
                (None, Some(group_id)) => settings.group_web_url(&group_id),
                (None, None) => helpers::value_or_prompt(None, "Page URL:")?,
            };
            let options = CrawlOptions {
                save_images: images,
                format: cli.format,
                ..Default::default()
            };
            cmd_web(settings, credentials, &url, &options).await
        }
    }
}

async fn cmd_check(
    settings: Settings,
    credentials: CredentialContext,
    group_id: &str,
) -> anyhow::Result<()> {
    let crawler = Crawler::new(settings, credentials)?.with_renderer(None);

    match crawler.check_credentials(group_id).await {
        Ok(group) => {
            println!("{} Credentials accepted", style("✓").green());
            helpers::print_group(&group);
            Ok(())
        }
        Err(e) => {
            println!("{} {} ({})", style("✗").red(), e, e.kind());
            Err(e).with_context(|| format!("Credential check against group {} failed", group_id))
        }
    }
}

async fn cmd_group(
    settings: Settings,
    credentials: CredentialContext,
    group_id: &str,
    options: &CrawlOptions,
    fallback: bool,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(64);
    let mut crawler = Crawler::new(settings, credentials)?.with_events(tx);
    if !fallback {
        crawler = crawler.with_renderer(None);
    }

    let (pb, progress) = helpers::spawn_progress(rx);
    let result = crawler.crawl_group(group_id, options).await;
    crawler.close().await;
    drop(crawler);
    let _ = progress.await;
    pb.finish_and_clear();

    match result {
        Ok(report) => {
            helpers::print_report(&report);
            Ok(())
        }
        Err(e) => {
            println!("{} {} ({})", style("✗").red(), e, e.kind());
            Err(e).with_context(|| format!("Crawl of group {} failed", group_id))
        }
    }
}

async fn cmd_web(
    settings: Settings,
    credentials: CredentialContext,
    url: &str,
    options: &CrawlOptions,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(64);
    let crawler = Crawler::new(settings, credentials)?.with_events(tx);

    let (pb, progress) = helpers::spawn_progress(rx);
    let result = crawler.crawl_web_page(url, options).await;
    crawler.close().await;
    drop(crawler);
    let _ = progress.await;
    pb.finish_and_clear();

    match result {
        Ok(report) => {
            helpers::print_report(&report);
            Ok(())
        }
        Err(e) => {
            println!("{} {} ({})", style("✗").red(), e, e.kind());
            Err(e).with_context(|| format!("Crawl of {} failed", url))
        }
    }
}
