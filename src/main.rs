mod adapters;
mod config;
mod core;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::{CliReviewTool, ReviewTool};
use crate::core::{note, prompt, CiContext, Error, FileChange, GitLabClient};

#[derive(Parser)]
#[command(name = "glreview")]
#[command(
    about = "Posts LLM-generated review comments on the current GitLab merge request",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Prompt file with review instructions, prepended to every diff.
    #[arg(default_value = "prompt.txt")]
    prompt_file: PathBuf,

    /// Review CLI to run (may include arguments, e.g. "gemini --model gemini-2.5-pro").
    #[arg(long)]
    command: Option<String>,

    /// Seconds to wait for the review CLI per file.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Review the merge request's whole change set instead of its newest commit.
    #[arg(long)]
    all_changes: bool,

    #[arg(short, long)]
    verbose: bool,
}

/// Which diff the run reviews.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReviewScope {
    /// The newest commit on the merge request's source branch.
    LatestCommit,
    /// The merge request's cumulative diff against its target branch.
    MergeRequest,
}

#[derive(Debug, PartialEq, Eq)]
enum RunOutcome {
    Posted(usize),
    NothingToReview,
    AlreadyReviewed(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration from file and merge with CLI options
    let mut config = config::Config::load().unwrap_or_default();
    config.merge_with_cli(cli.command.clone(), cli.timeout_secs, cli.all_changes);

    let ctx = CiContext::from_env(config.api_key_env.as_deref())?;
    let prompt_text = prompt::load_prompt(&cli.prompt_file).await?;

    let client = GitLabClient::new(&ctx.api_url, &ctx.token)?;
    let tool = CliReviewTool::from_config(&config, ctx.tool_key.clone())?;
    let scope = if config.all_changes {
        ReviewScope::MergeRequest
    } else {
        ReviewScope::LatestCommit
    };

    info!("Using review command: {}", tool.name());

    match run_pipeline(&client, &tool, &ctx, &prompt_text, scope).await? {
        RunOutcome::Posted(count) => {
            info!("Posted {} review note(s) on merge request !{}", count, ctx.mr_iid);
        }
        RunOutcome::NothingToReview => {
            info!("No reviewable changes found, nothing to do");
        }
        RunOutcome::AlreadyReviewed(sha) => {
            info!(
                "Commit {} already has a review note, skipping (push a new commit for a fresh review)",
                note::short_sha(&sha)
            );
        }
    }

    Ok(())
}

/// Fetch the diff, review every changed file, then post one note per file.
///
/// Reviews run to completion before the first note is posted, so a review
/// CLI failure never leaves a partial set of notes on the merge request.
async fn run_pipeline(
    client: &GitLabClient,
    tool: &dyn ReviewTool,
    ctx: &CiContext,
    prompt_text: &str,
    scope: ReviewScope,
) -> Result<RunOutcome, Error> {
    let mr = client.merge_request(&ctx.project_id, &ctx.mr_iid).await?;
    info!(
        "Reviewing merge request !{} ({}): {} -> {}",
        ctx.mr_iid, mr.title, mr.source_branch, mr.target_branch
    );
    debug!("Merge request state: {} ({})", mr.state, mr.web_url);

    let (sha, changes) = match scope {
        ReviewScope::LatestCommit => {
            let branch = client
                .branch_head(&ctx.project_id, &mr.source_branch)
                .await?;
            info!(
                "Latest commit on {} is {} ({}, authored {})",
                branch.name,
                note::short_sha(&branch.commit.id),
                branch.commit.title.as_deref().unwrap_or("no title"),
                branch.commit.created_at.format("%Y-%m-%d %H:%M UTC")
            );
            let changes = client
                .commit_changes(&ctx.project_id, &branch.commit.id)
                .await?;
            (branch.commit.id, changes)
        }
        ReviewScope::MergeRequest => {
            let changes = client
                .merge_request_changes(&ctx.project_id, &ctx.mr_iid)
                .await?;
            (mr.sha, changes)
        }
    };

    let targets: Vec<&FileChange> = changes.iter().filter(|change| change.has_diff()).collect();
    if targets.is_empty() {
        return Ok(RunOutcome::NothingToReview);
    }

    // A failure to list notes only disables the skip check; it must not
    // block the review itself.
    match client.notes(&ctx.project_id, &ctx.mr_iid).await {
        Ok(notes) => {
            if note::reviewed_commits(&notes).contains(&sha) {
                return Ok(RunOutcome::AlreadyReviewed(sha));
            }
        }
        Err(err) => {
            warn!("Could not list existing notes, reviewing anyway: {}", err);
        }
    }

    let mut reviews = Vec::with_capacity(targets.len());
    for (index, change) in targets.iter().enumerate() {
        info!(
            "[{}/{}] Reviewing {} ({})",
            index + 1,
            targets.len(),
            change.display_path(),
            change.kind()
        );
        let review = tool.review(prompt_text, &change.diff).await?;
        reviews.push((*change, review));
    }

    let mut posted = 0;
    for (change, review) in &reviews {
        let body = note::review_note_body(&sha, change.display_path(), review);
        let created = client.post_note(&ctx.project_id, &ctx.mr_iid, &body).await?;
        debug!("Created note {} for {}", created.id, change.display_path());
        posted += 1;
    }

    Ok(RunOutcome::Posted(posted))
}
