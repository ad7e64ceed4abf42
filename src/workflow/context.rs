use anyhow::{Context as _, Result, anyhow, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::env;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::annotations;
use crate::branch::random_token;
use crate::cli::Inputs;
use crate::git::Git;
use crate::github::{self, Protocol, RemoteDetail};
use crate::identity;

/// Shared context for a run: the repository handle, the remote it talks
/// to, and the resolved pull request branch name.
///
/// Construction performs the preflight checks; a context that exists is one
/// the engine may run against.
#[derive(Debug)]
pub struct WorkflowContext {
    pub git: Git,
    pub repo_url: String,
    pub repository: String,
    pub branch: String,
}

impl WorkflowContext {
    pub fn new(inputs: &Inputs) -> Result<Self> {
        let path = match &inputs.path {
            Some(path) => path.clone(),
            None => env::current_dir().context("Failed to resolve the current directory")?,
        };
        let mut git = Git::open(&path)?;

        // The target repository for the pull request comes from git config.
        let repo_url = git
            .config_get("remote.origin.url")?
            .ok_or_else(|| anyhow!("Failed to fetch 'remote.origin.url' from git config"))?;
        let RemoteDetail {
            protocol,
            repository,
        } = github::parse_github_repository(&repo_url)?;
        println!("Target repository set to {repository}");

        if protocol == Protocol::Https {
            annotations::debug("Using HTTPS protocol");
            // Basic credential for HTTPS access. Injected per invocation,
            // never persisted, and masked in all further log output.
            let basic_credential = STANDARD.encode(format!("x-access-token:{}", inputs.token));
            annotations::add_mask(&basic_credential);
            git.add_config_arg(&format!(
                "http.https://github.com/.extraheader=AUTHORIZATION: basic {basic_credential}"
            ));
        }

        // The checked out HEAD ref must be a branch. This fails for
        // detached HEAD, merge commits from pull_request events, and tags.
        let working_base = match git.symbolic_ref_head() {
            Ok(working_base) => working_base,
            Err(err) => {
                annotations::debug(&format!("{err:#}"));
                bail!(
                    "The checked out ref is not a valid base for a pull request. \
                    Unable to continue."
                );
            }
        };

        // A personal access token (unlike the workflow token) lets our own
        // push re-trigger the workflow; refuse to run on top of a pull
        // request branch we created.
        if working_base.starts_with(&inputs.branch) {
            bail!(
                "Working base branch '{working_base}' was created by pullsmith. \
                Unable to continue."
            );
        }

        let branch = apply_branch_suffix(&git, &inputs.branch, inputs.branch_suffix.as_deref())?;
        println!("Pull request branch to create or update set to '{branch}'");

        identity::configure(&mut git, inputs.committer.as_deref(), inputs.author.as_deref())?;

        info!(
            repository = %repository,
            branch = %branch,
            working_base = %working_base,
            "context:ready"
        );
        Ok(Self {
            git,
            repo_url,
            repository,
            branch,
        })
    }
}

fn apply_branch_suffix(git: &Git, branch: &str, suffix: Option<&str>) -> Result<String> {
    let Some(suffix) = suffix.filter(|s| !s.is_empty()) else {
        return Ok(branch.to_string());
    };
    let suffixed = match suffix {
        "short-commit-hash" => format!("{branch}-{}", git.rev_parse_short_head()?),
        "timestamp" => {
            let seconds = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("System clock is before the epoch")?
                .as_secs();
            format!("{branch}-{seconds}")
        }
        "random" => format!("{branch}-{}", random_token(7)),
        other => bail!("Branch suffix '{other}' is not a valid value. Unable to continue."),
    };
    Ok(suffixed)
}
