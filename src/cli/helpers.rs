//! Shared helper functions for CLI commands.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Context;
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use zsxq_archive::models::{CredentialContext, Group, Post};
use zsxq_archive::services::{CrawlEvent, CrawlReport, RetrievalPath};

/// Number of posts shown in the summary.
const SUMMARY_POSTS: usize = 3;

/// Characters of content shown per summarized post.
const SUMMARY_CHARS: usize = 100;

/// Read one line from stdin after printing `label`.
pub fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{} ", style(label).cyan());
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Read a secret without echoing it.
fn prompt_secret(label: &str) -> anyhow::Result<String> {
    let term = Term::stdout();
    term.write_str(&format!("{} ", style(label).cyan()))?;
    Ok(term.read_secure_line()?.trim().to_string())
}

/// Use the given value or ask for one.
pub fn value_or_prompt(value: Option<String>, label: &str) -> anyhow::Result<String> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => Ok(v),
        None => {
            let v = prompt(label)?;
            anyhow::ensure!(!v.is_empty(), "{} is required", label.trim_end_matches(':'));
            Ok(v)
        }
    }
}

/// Build the credential context from flags/env, prompting when both are absent.
pub fn resolve_credentials(
    cookie: Option<String>,
    token: Option<String>,
) -> anyhow::Result<CredentialContext> {
    let (cookie, token) = if cookie.is_none() && token.is_none() {
        println!(
            "{} No ZSXQ_COOKIE or ZSXQ_TOKEN set",
            style("!").yellow()
        );
        let cookie = prompt_secret("Cookie (leave empty to use a token):")?;
        if cookie.is_empty() {
            (None, Some(prompt_secret("Access token:")?))
        } else {
            (Some(cookie), None)
        }
    } else {
        (cookie, token)
    };

    CredentialContext::new(cookie, token).context("Invalid credentials")
}

/// Spinner that follows crawl events until the sender is dropped.
pub fn spawn_progress(mut events: mpsc::Receiver<CrawlEvent>) -> (ProgressBar, JoinHandle<()>) {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Connecting...");

    let bar = pb.clone();
    let handle = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let message = match event {
                CrawlEvent::GroupLoaded(group) => format!("Loaded group {}", group.name),
                CrawlEvent::TopicsCollected { count, pages } => {
                    format!("Collected {} posts from {} pages", count, pages)
                }
                CrawlEvent::FallingBack { url, .. } => format!("API unavailable, rendering {}", url),
                CrawlEvent::CommentsCollected { topic_id, count } => {
                    format!("{} comments on topic {}", count, topic_id)
                }
                CrawlEvent::ImagesSaved {
                    post_id,
                    saved,
                    total,
                } => format!("Saved {}/{} images of post {}", saved, total, post_id),
                CrawlEvent::Exported(path) => format!("Wrote {}", path.display()),
            };
            bar.set_message(message);
        }
    });

    (pb, handle)
}

/// Print the group header.
pub fn print_group(group: &Group) {
    println!("\n{}", style(&group.name).bold());
    if !group.description.is_empty() {
        println!("  {}", group.description);
    }
    println!("  Members: {}", group.member_count);
}

fn print_post(index: usize, post: &Post) {
    let comments = post
        .comments
        .as_ref()
        .map(|c| c.len() as u64)
        .or(post.comments_count)
        .unwrap_or(0);

    println!(
        "\n{} {}",
        style(format!("[{}]", index)).cyan(),
        style(post.display_title()).bold()
    );
    if !post.author.name.is_empty() {
        println!("  Author: {}", post.author.name);
    }
    if let Some(time) = post.create_time {
        println!("  Posted: {}", time.format("%Y-%m-%d %H:%M"));
    }
    println!("  {}", post.excerpt(SUMMARY_CHARS).replace('\n', " "));
    println!(
        "  {} images, {} comments, {} likes",
        post.images.len(),
        comments,
        post.likes.unwrap_or(0)
    );
}

/// Print the crawl summary: group, first posts, files and warnings.
pub fn print_report(report: &CrawlReport) {
    if let Some(ref group) = report.group {
        print_group(group);
    }

    let via = match report.path {
        RetrievalPath::Api => "API",
        RetrievalPath::Render => "rendered page",
    };
    println!(
        "\n{} {} posts retrieved via {}",
        style("✓").green(),
        report.posts.len(),
        via
    );

    for (i, post) in report.posts.iter().take(SUMMARY_POSTS).enumerate() {
        print_post(i + 1, post);
    }

    let (saved, total) = report.image_count();
    if saved > 0 {
        println!("\n  Images saved: {}/{}", saved, total);
    }
    for file in &report.files {
        println!("  {} {}", style("→").cyan(), file.display());
    }

    if let Some(ref e) = report.interrupted {
        println!(
            "\n{} Stopped early ({}): {}",
            style("!").yellow(),
            e.kind(),
            e
        );
    }
    if report.comment_failures > 0 {
        println!(
            "{} Comments incomplete for {} posts",
            style("!").yellow(),
            report.comment_failures
        );
    }
}
