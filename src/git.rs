use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

use crate::cmd::Cmd;

/// Handle to a git repository checkout.
///
/// Carries the working directory plus per-invocation state: environment
/// variables for commit identity and `-c key=value` config arguments for
/// credential injection. Neither is ever written to persistent config.
#[derive(Debug)]
pub struct Git {
    workdir: PathBuf,
    envs: Vec<(String, String)>,
    config_args: Vec<String>,
}

impl Git {
    /// Open the repository at `path`, verifying that the git executable is
    /// available and the path is inside a repository.
    pub fn open(path: &Path) -> Result<Self> {
        which::which("git")
            .map_err(|_| anyhow!("Unable to find the 'git' executable on PATH"))?;
        let git = Self {
            workdir: path.to_path_buf(),
            envs: Vec::new(),
            config_args: Vec::new(),
        };
        if !git.cmd(&["rev-parse", "--git-dir"]).run_as_check()? {
            return Err(anyhow!("'{}' is not a git repository", path.display()));
        }
        Ok(git)
    }

    /// Set an environment variable for every subsequent git subprocess.
    pub fn set_env(&mut self, key: &str, value: &str) {
        self.envs.push((key.to_string(), value.to_string()));
    }

    /// Add a `-c key=value` argument to every subsequent git subprocess.
    pub fn add_config_arg(&mut self, key_value: &str) {
        self.config_args.push(key_value.to_string());
    }

    fn cmd(&self, args: &[&str]) -> Cmd {
        let mut cmd = Cmd::new("git").workdir(&self.workdir);
        for key_value in &self.config_args {
            cmd = cmd.arg("-c").arg(key_value.as_str());
        }
        for (key, value) in &self.envs {
            cmd = cmd.env(key, value);
        }
        cmd.args(args)
    }

    /// Resolve the branch HEAD points at. Fails on detached HEAD.
    pub fn symbolic_ref_head(&self) -> Result<String> {
        self.cmd(&["symbolic-ref", "HEAD", "--short"])
            .run_and_capture_stdout()
    }

    /// Read a config value. Returns `None` when the key is unset.
    pub fn config_get(&self, name: &str) -> Result<Option<String>> {
        let output = self.cmd(&["config", "--get", name]).run_with_output()?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    pub fn rev_parse_short_head(&self) -> Result<String> {
        self.cmd(&["rev-parse", "--short", "HEAD"])
            .run_and_capture_stdout()
    }

    /// Check for uncommitted changes, untracked files included.
    pub fn is_dirty(&self) -> Result<bool> {
        let status = self
            .cmd(&["status", "--porcelain"])
            .run_and_capture_stdout()?;
        Ok(!status.is_empty())
    }

    /// Stage all paths, including deletions and untracked files.
    pub fn add_all(&self) -> Result<()> {
        self.cmd(&["add", "-A"]).run()
    }

    pub fn commit(&self, message: &str) -> Result<()> {
        self.cmd(&["commit", "-m", message]).run()
    }

    /// Create a branch at HEAD and check it out. Uncommitted changes carry
    /// over to the new branch.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        self.cmd(&["checkout", "-b", name]).run()
    }

    /// Create or reset a branch at `start` and check it out.
    pub fn force_create_branch(&self, name: &str, start: &str) -> Result<()> {
        self.cmd(&["checkout", "-B", name, start]).run()
    }

    pub fn checkout(&self, name: &str) -> Result<()> {
        self.cmd(&["checkout", name]).run()
    }

    /// Fetch a refspec, forcing non-fast-forward ref updates.
    pub fn fetch_force(&self, url: &str, refspec: &str) -> Result<()> {
        self.cmd(&["fetch", "--force", url, refspec]).run()
    }

    /// Probe-fetch a refspec; a failure means the remote ref is absent (or
    /// unreachable) and is reported as `false`, not as an error.
    pub fn fetch(&self, url: &str, refspec: &str) -> Result<bool> {
        self.cmd(&["fetch", url, refspec]).run_as_check()
    }

    /// Commits reachable from `to` but not `from`, oldest first, restricted
    /// to the current path.
    pub fn commits_in_range(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let range = format!("{from}..{to}");
        let stdout = self
            .cmd(&["rev-list", "--reverse", &range, "--", "."])
            .run_and_capture_stdout()?;
        Ok(stdout.lines().map(str::to_string).collect())
    }

    /// Cherry-pick a commit, letting the picked changes win on conflict.
    pub fn cherry_pick_theirs(&self, commit: &str) -> Result<()> {
        self.cmd(&[
            "cherry-pick",
            "--strategy",
            "recursive",
            "--strategy-option",
            "theirs",
            commit,
        ])
        .run()
    }

    /// Drop the in-progress pick and clear the sequencer state.
    pub fn cherry_pick_skip(&self) -> Result<()> {
        self.cmd(&["cherry-pick", "--skip"]).run()
    }

    /// Number of commits reachable from `branch` but not `base`.
    pub fn ahead_count(&self, base: &str, branch: &str) -> Result<u32> {
        self.rev_list_count("--right-only", base, branch)
    }

    /// Number of commits reachable from `base` but not `branch`.
    pub fn behind_count(&self, base: &str, branch: &str) -> Result<u32> {
        self.rev_list_count("--left-only", base, branch)
    }

    fn rev_list_count(&self, side: &str, base: &str, branch: &str) -> Result<u32> {
        let range = format!("{base}...{branch}");
        let count = self
            .cmd(&["rev-list", side, "--count", &range])
            .run_and_capture_stdout()?;
        count
            .parse()
            .map_err(|_| anyhow!("Unexpected rev-list count output '{count}'"))
    }

    /// Whether the trees of two revisions differ.
    pub fn has_diff(&self, a: &str, b: &str) -> Result<bool> {
        // Exit code 0 = no difference, 1 = differences found.
        let range = format!("{a}..{b}");
        let no_diff = self.cmd(&["diff", "--quiet", &range]).run_as_check()?;
        Ok(!no_diff)
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        self.cmd(&["branch", "--delete", "--force", name]).run()
    }

    pub fn push_force(&self, url: &str, refspec: &str) -> Result<()> {
        self.cmd(&["push", "--force", url, refspec]).run()
    }

    pub fn push_delete(&self, url: &str, refname: &str) -> Result<()> {
        self.cmd(&["push", "--delete", "--force", url, refname]).run()
    }
}
