use anyhow::Result;
use tracing::info;

use crate::branch::{self, Action};
use crate::cli::{self, Inputs};
use crate::github::{GhClient, PullRequestSpec};

use super::context::WorkflowContext;

/// Reconcile the pull request branch, publish it, and create or update the
/// pull request.
///
/// When reconciliation reports nothing to publish, no push happens. When
/// the branch no longer differs from the base, the remote branch is deleted
/// instead of opening a pull request that would carry nothing.
pub fn publish(context: &WorkflowContext, inputs: &Inputs) -> Result<()> {
    let result = branch::create_or_update_branch(
        &context.git,
        &context.repo_url,
        &inputs.commit_message,
        inputs.base.as_deref(),
        &context.branch,
    )?;

    if !matches!(result.action, Action::Created | Action::Updated) {
        info!("publish:branch unchanged, nothing to publish");
        return Ok(());
    }

    println!("Pushing pull request branch to 'origin/{}'", context.branch);
    context.git.push_force(
        &context.repo_url,
        &format!("HEAD:refs/heads/{}", context.branch),
    )?;

    if !result.diff {
        println!(
            "Branch '{}' no longer differs from base branch '{}'",
            context.branch, result.base
        );
        println!(
            "Closing pull request and deleting branch '{}'",
            context.branch
        );
        context
            .git
            .push_delete(&context.repo_url, &format!("refs/heads/{}", context.branch))?;
        return Ok(());
    }

    let client = GhClient::new(context.repository.clone(), inputs.token.clone())?;
    let request = PullRequestSpec {
        branch: &context.branch,
        base: &result.base,
        title: &inputs.title,
        body: &inputs.body,
        labels: cli::parse_list(inputs.labels.as_deref()),
        assignees: cli::parse_list(inputs.assignees.as_deref()),
        milestone: inputs.milestone,
        reviewers: cli::parse_list(inputs.reviewers.as_deref()),
        team_reviewers: cli::parse_list(inputs.team_reviewers.as_deref()),
        project_name: inputs.project_name.as_deref(),
        project_column_name: inputs.project_column_name.as_deref(),
        draft: cli::parse_bool(inputs.draft.as_deref()),
        request_to_parent: cli::parse_bool(inputs.request_to_parent.as_deref()),
    };
    let number = client.create_or_update_pull_request(&request)?;
    info!(number, branch = %context.branch, "publish:pull request ready");
    Ok(())
}
