use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cmd::CmdError;
use crate::git::Git;

/// Signal git prints when a cherry-pick resolves to an empty commit because
/// the base already contains the change. This is a string-match contract
/// with the git executable.
const CHERRYPICK_EMPTY: &str =
    "The previous cherry-pick is now empty, possibly due to conflict resolution.";

/// What happened to the pull request branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Created,
    Updated,
}

/// Outcome of one reconciliation run.
#[derive(Debug)]
pub struct ReconcileResult {
    pub action: Action,
    /// True iff the pull request branch tip is strictly ahead of the base.
    pub diff: bool,
    /// The effective base branch, echoed for the caller.
    pub base: String,
}

/// A random lowercase-alphanumeric token for branch names.
pub fn random_token(length: usize) -> String {
    let mut token = String::new();
    while token.len() < length {
        token.push_str(&Uuid::new_v4().simple().to_string());
    }
    token.truncate(length);
    token
}

/// Reconcile the working tree and the remote pull request branch.
///
/// Captures any uncommitted changes as a single commit on a scratch branch,
/// resets the working base to its remote state, rebases the workflow
/// commits onto `base` when the working base is a different branch, and
/// then creates or resets the pull request branch so its tip carries
/// exactly the net changes of the workflow relative to the base.
///
/// The scratch branch never outlives this call, on success or failure.
pub fn create_or_update_branch(
    git: &Git,
    repo_url: &str,
    commit_message: &str,
    base: Option<&str>,
    branch: &str,
) -> Result<ReconcileResult> {
    // The working base may or may not be the actual base.
    let working_base = git.symbolic_ref_head()?;
    let base = base.unwrap_or(&working_base).to_string();

    let temp_branch = random_token(20);
    git.create_branch(&temp_branch)?;
    debug!(temp = %temp_branch, working_base = %working_base, "reconcile:scratch branch created");

    let result = reconcile(
        git,
        repo_url,
        commit_message,
        &working_base,
        &base,
        branch,
        &temp_branch,
    );

    match result {
        Ok(result) => {
            git.delete_branch(&temp_branch)?;
            Ok(result)
        }
        Err(err) => {
            // HEAD may still be on the scratch branch; move off and retry.
            if git.delete_branch(&temp_branch).is_err() {
                let _ = git.checkout(&working_base);
                let _ = git.delete_branch(&temp_branch);
            }
            Err(err)
        }
    }
}

fn reconcile(
    git: &Git,
    repo_url: &str,
    commit_message: &str,
    working_base: &str,
    base: &str,
    branch: &str,
    temp_branch: &str,
) -> Result<ReconcileResult> {
    // Capture any uncommitted changes, untracked files included, as one
    // commit on the scratch branch.
    if git.is_dirty()? {
        println!("Uncommitted changes found. Adding a commit.");
        git.add_all()?;
        git.commit(commit_message)?;
    }

    // Reset the working base to its remote state. Commits made to it during
    // the workflow are discarded from the ref but stay reachable from the
    // scratch branch.
    git.fetch_force(repo_url, &format!("{working_base}:{working_base}"))?;

    if working_base != base {
        println!("Rebasing commits made to branch '{working_base}' on to base branch '{base}'");
        git.fetch_force(repo_url, &format!("{base}:{base}"))?;
        git.checkout(base)?;
        for commit in git.commits_in_range(working_base, temp_branch)? {
            if let Err(err) = git.cherry_pick_theirs(&commit) {
                if !is_empty_cherry_pick(&err) {
                    return Err(err).with_context(|| format!("Failed to cherry-pick {commit}"));
                }
                // The base already contains this change; drop the commit.
                debug!(commit = %commit, "reconcile:empty cherry-pick dropped");
                git.cherry_pick_skip()?;
            }
        }
        // The scratch branch becomes the workflow commits rebased onto the
        // base; the base ref itself goes back to the remote tip.
        git.force_create_branch(temp_branch, "HEAD")?;
        git.fetch_force(repo_url, &format!("{base}:{base}"))?;
    }

    let mut action = Action::None;
    let diff;

    if !git.fetch(repo_url, &format!("{branch}:refs/remotes/origin/{branch}"))? {
        // The pull request branch does not exist on the remote.
        println!("Pull request branch '{branch}' does not exist yet");
        git.create_branch(branch)?;
        diff = is_ahead(git, base, branch)?;
        if diff {
            action = Action::Created;
            println!("Created branch '{branch}'");
        } else {
            println!("Branch '{branch}' is not ahead of base '{base}' and will not be created");
        }
    } else {
        println!("Pull request branch '{branch}' already exists as remote branch 'origin/{branch}'");
        git.checkout(branch)?;

        // Commit hashes always differ after a cherry-pick, so compare tree
        // content, not history.
        if git.has_diff(branch, temp_branch)? {
            // For changes on base this is similar to a rebase of the pull
            // request branch.
            println!("Resetting '{branch}'");
            git.force_create_branch(branch, temp_branch)?;
        }

        // A reset or updated branch will be ahead of its remote; it may be
        // behind when the reset leaves no diff with the base.
        if !is_even(git, &format!("origin/{branch}"), branch)? {
            action = Action::Updated;
            println!("Updated branch '{branch}'");
        } else {
            println!("Branch '{branch}' is even with its remote and will not be updated");
        }

        diff = is_ahead(git, base, branch)?;
    }

    info!(action = ?action, diff, base = %base, "reconcile:done");
    Ok(ReconcileResult {
        action,
        diff,
        base: base.to_string(),
    })
}

fn is_empty_cherry_pick(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CmdError>()
        .is_some_and(|err| err.stderr.contains(CHERRYPICK_EMPTY))
}

/// True if `branch` is strictly ahead of `base`.
fn is_ahead(git: &Git, base: &str, branch: &str) -> Result<bool> {
    Ok(git.ahead_count(base, branch)? > 0)
}

/// True if the two refs point at the same history.
fn is_even(git: &Git, a: &str, b: &str) -> Result<bool> {
    Ok(git.ahead_count(a, b)? == 0 && git.behind_count(a, b)? == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::Cmd;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const COMMIT_MESSAGE: &str = "[pullsmith] automated change";
    const BRANCH: &str = "pullsmith/patch";
    const BASE: &str = "main";
    const NOT_BASE_BRANCH: &str = "branch-that-is-not-the-base";
    const NOT_BASE_COMMIT: &str = "commit that must not reach the pull request branch";
    const TRACKED_FILE: &str = "tracked-file.txt";
    const UNTRACKED_FILE: &str = "untracked-file.txt";

    fn run(dir: &Path, args: &[&str]) {
        Cmd::new("git").workdir(dir).args(args).run().unwrap();
    }

    fn capture(dir: &Path, args: &[&str]) -> String {
        Cmd::new("git")
            .workdir(dir)
            .args(args)
            .run_and_capture_stdout()
            .unwrap()
    }

    /// A bare origin plus a working clone, mirroring a CI checkout. The
    /// base branch carries one tracked file; a second branch carries a
    /// commit that must never leak into the pull request branch.
    struct Harness {
        _tmp: TempDir,
        work: PathBuf,
        url: String,
        git: Git,
    }

    impl Harness {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let origin = tmp.path().join("origin.git");
            run(tmp.path(), &["init", "--bare", "origin.git"]);
            let work = tmp.path().join("work");
            run(tmp.path(), &["init", "--initial-branch", BASE, "work"]);
            run(&work, &["config", "user.name", "pullsmith tests"]);
            run(&work, &["config", "user.email", "tests@pullsmith.invalid"]);
            run(&work, &["config", "commit.gpgsign", "false"]);
            let url = origin.to_str().unwrap().to_string();
            run(&work, &["remote", "add", "origin", &url]);

            fs::write(work.join(TRACKED_FILE), "base\n").unwrap();
            run(&work, &["add", "-A"]);
            run(&work, &["commit", "-m", "initial"]);
            run(&work, &["push", "origin", BASE]);

            run(&work, &["checkout", "-b", NOT_BASE_BRANCH]);
            fs::write(work.join("not-base.txt"), "not base\n").unwrap();
            run(&work, &["add", "-A"]);
            run(&work, &["commit", "-m", NOT_BASE_COMMIT]);
            run(&work, &["push", "origin", NOT_BASE_BRANCH]);
            run(&work, &["checkout", BASE]);

            let git = Git::open(&work).unwrap();
            Harness {
                _tmp: tmp,
                work,
                url,
                git,
            }
        }

        fn reconcile(&self, base: Option<&str>) -> ReconcileResult {
            create_or_update_branch(&self.git, &self.url, COMMIT_MESSAGE, base, BRANCH).unwrap()
        }

        fn write_tracked(&self, content: &str) {
            fs::write(self.work.join(TRACKED_FILE), content).unwrap();
        }

        fn write_untracked(&self, content: &str) {
            fs::write(self.work.join(UNTRACKED_FILE), content).unwrap();
        }

        fn tracked_content(&self) -> String {
            fs::read_to_string(self.work.join(TRACKED_FILE)).unwrap()
        }

        fn commit_all(&self, message: &str) {
            run(&self.work, &["add", "-A"]);
            run(&self.work, &["commit", "-m", message]);
        }

        /// What the orchestrator does after `created`/`updated`.
        fn push_pull_request_branch(&self) {
            let refspec = format!("HEAD:refs/heads/{BRANCH}");
            run(&self.work, &["push", "--force", &self.url, &refspec]);
            run(&self.work, &["fetch", "origin"]);
        }

        /// Mirror the next workflow run starting from a fresh checkout of
        /// `branch`: local pull request branch gone, clean tree.
        fn fresh_checkout(&self, branch: &str) {
            run(&self.work, &["checkout", BASE]);
            let _ = Cmd::new("git")
                .workdir(&self.work)
                .args(&["branch", "--delete", "--force", BRANCH])
                .run();
            run(&self.work, &["checkout", branch]);
        }

        fn push_base(&self) {
            let refspec = format!("HEAD:refs/heads/{BASE}");
            run(&self.work, &["push", "--force", &self.url, &refspec]);
            run(&self.work, &["fetch", "origin"]);
        }

        fn local_branches(&self) -> Vec<String> {
            capture(
                &self.work,
                &["for-each-ref", "--format=%(refname:short)", "refs/heads/"],
            )
            .lines()
            .map(str::to_string)
            .collect()
        }

        fn head_messages(&self) -> String {
            capture(&self.work, &["log", "--format=%s"])
        }

        fn rev_parse(&self, rev: &str) -> String {
            capture(&self.work, &["rev-parse", rev])
        }

        fn assert_no_scratch_branches(&self) {
            for branch in self.local_branches() {
                assert!(
                    [BASE, NOT_BASE_BRANCH, BRANCH].contains(&branch.as_str()),
                    "scratch branch '{branch}' was left behind"
                );
            }
        }
    }

    #[test]
    fn test_no_changes_results_in_no_action() {
        let h = Harness::new();
        let result = h.reconcile(None);
        assert_eq!(result.action, Action::None);
        assert!(!result.diff);
        assert_eq!(result.base, BASE);
        h.assert_no_scratch_branches();
    }

    #[test]
    fn test_tracked_changes_create_then_update() {
        let h = Harness::new();
        h.write_tracked("X\n");
        let result = h.reconcile(None);
        assert_eq!(result.action, Action::Created);
        assert!(result.diff);
        assert_eq!(h.tracked_content(), "X\n");
        h.assert_no_scratch_branches();

        h.push_pull_request_branch();
        h.fresh_checkout(BASE);

        h.write_tracked("Y\n");
        let result = h.reconcile(None);
        assert_eq!(result.action, Action::Updated);
        assert!(result.diff);
        assert_eq!(h.tracked_content(), "Y\n");
        h.assert_no_scratch_branches();
    }

    #[test]
    fn test_untracked_changes_create_then_update() {
        let h = Harness::new();
        h.write_untracked("X\n");
        let result = h.reconcile(None);
        assert_eq!(result.action, Action::Created);
        assert!(result.diff);

        h.push_pull_request_branch();
        h.fresh_checkout(BASE);

        h.write_untracked("Y\n");
        let result = h.reconcile(None);
        assert_eq!(result.action, Action::Updated);
        assert!(result.diff);
        assert_eq!(
            fs::read_to_string(h.work.join(UNTRACKED_FILE)).unwrap(),
            "Y\n"
        );
    }

    #[test]
    fn test_identical_changes_produce_no_action() {
        let h = Harness::new();
        h.write_tracked("X\n");
        assert_eq!(h.reconcile(None).action, Action::Created);
        h.push_pull_request_branch();
        h.fresh_checkout(BASE);

        // The second run recreates the same content; the remote branch
        // already matches and nothing needs publishing.
        h.write_tracked("X\n");
        let result = h.reconcile(None);
        assert_eq!(result.action, Action::None);
        assert!(result.diff);
        h.assert_no_scratch_branches();
    }

    #[test]
    fn test_no_changes_reverts_branch_to_base() {
        let h = Harness::new();
        h.write_tracked("X\n");
        assert_eq!(h.reconcile(None).action, Action::Created);
        h.push_pull_request_branch();
        h.fresh_checkout(BASE);

        // Running with no update effectively reverts the branch back to
        // match the base.
        let result = h.reconcile(None);
        assert_eq!(result.action, Action::Updated);
        assert!(!result.diff);
        assert_eq!(h.tracked_content(), "base\n");
    }

    #[test]
    fn test_base_advanced_with_identical_content_leaves_no_diff() {
        let h = Harness::new();
        h.write_tracked("X\n");
        assert_eq!(h.reconcile(None).action, Action::Created);
        h.push_pull_request_branch();
        h.fresh_checkout(BASE);

        // The base gains the same content through its own commit.
        h.write_tracked("Z\n");
        h.commit_all("identical change landed on base");
        h.push_base();

        let result = h.reconcile(None);
        assert_eq!(result.action, Action::Updated);
        assert!(!result.diff);
        assert_eq!(h.tracked_content(), "Z\n");
    }

    #[test]
    fn test_commits_on_working_base_are_preserved_and_ref_reset() {
        let h = Harness::new();
        h.write_tracked("committed during workflow\n");
        h.commit_all("commit made by the workflow on the base");

        let result = h.reconcile(None);
        assert_eq!(result.action, Action::Created);
        assert!(result.diff);
        assert_eq!(h.tracked_content(), "committed during workflow\n");

        // The local base ref is back at the remote tip; the workflow commit
        // lives only on the pull request branch.
        assert_eq!(
            h.rev_parse(BASE),
            h.rev_parse(&format!("origin/{BASE}"))
        );
    }

    #[test]
    fn test_working_base_not_base_excludes_foreign_commits() {
        let h = Harness::new();
        h.fresh_checkout(NOT_BASE_BRANCH);
        h.write_tracked("X\n");
        let result = h.reconcile(Some(BASE));
        assert_eq!(result.action, Action::Created);
        assert!(result.diff);
        assert_eq!(result.base, BASE);
        assert_eq!(h.tracked_content(), "X\n");

        // The commit from the working base tip must not appear in the pull
        // request branch.
        assert!(!h.head_messages().contains(NOT_BASE_COMMIT));
        assert!(!h.work.join("not-base.txt").exists());
        h.assert_no_scratch_branches();
    }

    #[test]
    fn test_working_base_not_base_empty_cherry_pick_is_absorbed() {
        let h = Harness::new();
        h.fresh_checkout(NOT_BASE_BRANCH);
        h.write_tracked("X\n");
        assert_eq!(h.reconcile(Some(BASE)).action, Action::Created);
        h.push_pull_request_branch();
        h.fresh_checkout(BASE);

        // Land the same change on the base, then recreate it in the tree.
        // The workflow commit cherry-picks to nothing and must be dropped.
        h.write_tracked("Y\n");
        h.commit_all("identical change landed on base");
        h.push_base();
        h.fresh_checkout(NOT_BASE_BRANCH);
        h.write_tracked("Y\n");

        let result = h.reconcile(Some(BASE));
        assert_eq!(result.action, Action::Updated);
        assert!(!result.diff);
        assert_eq!(h.tracked_content(), "Y\n");
        assert_eq!(
            h.rev_parse("HEAD"),
            h.rev_parse(&format!("origin/{BASE}"))
        );
        h.assert_no_scratch_branches();
    }

    #[test]
    fn test_failure_still_removes_scratch_branch() {
        let h = Harness::new();
        h.write_tracked("X\n");
        let err = create_or_update_branch(
            &h.git,
            "/nonexistent/remote/path",
            COMMIT_MESSAGE,
            None,
            BRANCH,
        )
        .unwrap_err();
        assert!(err.downcast_ref::<CmdError>().is_some());
        h.assert_no_scratch_branches();
        assert_eq!(h.git.symbolic_ref_head().unwrap(), BASE);
    }

    #[test]
    fn test_random_token_shape() {
        let token = random_token(20);
        assert_eq!(token.len(), 20);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
        assert_ne!(random_token(20), random_token(20));
        assert_eq!(random_token(7).len(), 7);
    }
}
