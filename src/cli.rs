use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::annotations;
use crate::workflow;

pub const DEFAULT_BRANCH: &str = "pullsmith/patch";
pub const DEFAULT_COMMIT_MESSAGE: &str = "[pullsmith] automated change";
pub const DEFAULT_TITLE: &str = "Changes by pullsmith";
pub const DEFAULT_BODY: &str = "Automated changes by pullsmith";

/// Inputs for one run. In CI these normally arrive as environment
/// variables; every flag doubles as one.
#[derive(Parser, Debug)]
#[command(name = "pullsmith", version)]
#[command(about = "Commits workflow changes to a branch and creates or updates a pull request")]
pub struct Inputs {
    /// Token used for the repository remote and the GitHub API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Working directory of the repository checkout
    #[arg(long, env = "PULLSMITH_PATH")]
    pub path: Option<PathBuf>,

    /// Pull request branch to create or update
    #[arg(long, env = "PULLSMITH_BRANCH", default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// Branch name suffix: short-commit-hash, timestamp or random
    #[arg(long, env = "PULLSMITH_BRANCH_SUFFIX")]
    pub branch_suffix: Option<String>,

    /// Message for the commit capturing uncommitted changes
    #[arg(long, env = "PULLSMITH_COMMIT_MESSAGE", default_value = DEFAULT_COMMIT_MESSAGE)]
    pub commit_message: String,

    /// Committer in 'Display Name <email@address.com>' format
    #[arg(long, env = "PULLSMITH_COMMITTER")]
    pub committer: Option<String>,

    /// Author in 'Display Name <email@address.com>' format
    #[arg(long, env = "PULLSMITH_AUTHOR")]
    pub author: Option<String>,

    /// Base branch for the pull request; defaults to the checked out branch
    #[arg(long, env = "PULLSMITH_BASE")]
    pub base: Option<String>,

    /// Pull request title
    #[arg(long, env = "PULLSMITH_TITLE", default_value = DEFAULT_TITLE)]
    pub title: String,

    /// Pull request body
    #[arg(long, env = "PULLSMITH_BODY", default_value = DEFAULT_BODY)]
    pub body: String,

    /// Comma-separated list of labels
    #[arg(long, env = "PULLSMITH_LABELS")]
    pub labels: Option<String>,

    /// Comma-separated list of assignees
    #[arg(long, env = "PULLSMITH_ASSIGNEES")]
    pub assignees: Option<String>,

    /// Milestone id to associate the pull request with
    #[arg(long, env = "PULLSMITH_MILESTONE")]
    pub milestone: Option<u64>,

    /// Comma-separated list of reviewers
    #[arg(long, env = "PULLSMITH_REVIEWERS")]
    pub reviewers: Option<String>,

    /// Comma-separated list of team reviewers
    #[arg(long, env = "PULLSMITH_TEAM_REVIEWERS")]
    pub team_reviewers: Option<String>,

    /// Project to add the pull request to; requires --project-column-name
    #[arg(long, env = "PULLSMITH_PROJECT_NAME")]
    pub project_name: Option<String>,

    /// Project column for the card; requires --project-name
    #[arg(long, env = "PULLSMITH_PROJECT_COLUMN_NAME")]
    pub project_column_name: Option<String>,

    /// Open the pull request as a draft (true/1/t/y/yes/on)
    #[arg(long, env = "PULLSMITH_DRAFT")]
    pub draft: Option<String>,

    /// Open the pull request against the parent of a forked repository
    #[arg(long, env = "PULLSMITH_REQUEST_TO_PARENT")]
    pub request_to_parent: Option<String>,
}

// --- Public Entry Point ---
pub fn run() -> Result<()> {
    let inputs = Inputs::parse();
    annotations::add_mask(&inputs.token);

    if let Err(err) = execute(&inputs) {
        annotations::error(&format!("{err:#} Exiting."));
        return Err(err);
    }
    Ok(())
}

fn execute(inputs: &Inputs) -> Result<()> {
    let context = workflow::WorkflowContext::new(inputs)?;
    workflow::publish(&context, inputs)
}

/// Boolean-ish input parsing. Anything not in the accepted set, including
/// an unset input, is false.
pub fn parse_bool(value: Option<&str>) -> bool {
    let Some(value) = value else {
        return false;
    };
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "t" | "y" | "yes" | "on"
    )
}

/// Split a comma-separated input into trimmed items, dropping empties.
pub fn parse_list(value: Option<&str>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
