//! Git workspace guard (C4): a single shared working tree, serialized across
//! worker processes by one advisory lock file (`.git/agentswarm.lock`),
//! grounded on the worker's `git_lock`/`init_git_repo`/`setup_branch`/
//! `commit_and_merge` methods. Git itself is shelled out via
//! `tokio::process::Command`, as the teacher's `McpProcessManager` shells
//! out to companion binaries — no `git2`/`gix` dependency is pulled in for
//! what amounts to five plumbing commands.
//!
//! The lock is taken only around the specific critical section that needs
//! exclusivity (branch setup, commit+merge) — never across a whole task's
//! lifetime, so slow LLM calls never block other workers from reaching git.

use crate::domain::ports::errors::WorkspaceError;
use fs4::FileExt;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

#[derive(Clone)]
pub struct GitWorkspace {
    root: PathBuf,
}

impl GitWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(".git").join("agentswarm.lock")
    }

    /// Run a guarded critical section with the workspace lock held for its
    /// duration. `spawn_blocking` keeps the blocking `flock(2)` call off the
    /// async executor, the same pattern the rate limiter uses.
    async fn with_lock<F, T>(&self, f: F) -> Result<T, WorkspaceError>
    where
        F: FnOnce() -> Result<T, WorkspaceError> + Send + 'static,
        T: Send + 'static,
    {
        let lock_path = self.lock_path();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let lockfile = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .open(&lock_path)?;
            lockfile
                .lock_exclusive()
                .map_err(WorkspaceError::Lock)?;
            let result = f();
            FileExt::unlock(&lockfile).ok();
            result
        })
        .await
        .expect("workspace lock task panicked")
    }

    /// `git init` + create `main` with an empty root commit, if no `.git`
    /// directory exists yet.
    pub async fn init_if_needed(&self) -> Result<(), WorkspaceError> {
        let root = self.root.clone();
        self.with_lock(move || {
            if root.join(".git").exists() {
                return Ok(());
            }
            run_git_sync(&root, &["init"])?;
            run_git_sync(&root, &["checkout", "-b", "main"])?;
            run_git_sync(&root, &["commit", "--allow-empty", "-m", "init"])?;
            Ok(())
        })
        .await
    }

    /// Switch to `main`, force-delete any stale branch of the same name
    /// (a retried task reuses its branch name), then create it fresh.
    pub async fn setup_branch(&self, branch_name: &str) -> Result<(), WorkspaceError> {
        let root = self.root.clone();
        let branch = branch_name.to_string();
        self.with_lock(move || {
            run_git(&root, &["checkout", "main"]);
            run_git(&root, &["branch", "-D", &branch]);
            run_git_sync(&root, &["checkout", "-b", &branch])?;
            Ok(())
        })
        .await
    }

    /// Stage, commit on the task branch, then fast-forward-free merge into
    /// `main`. On merge conflict, aborts and returns to the task branch
    /// (leaving `main` untouched) rather than erroring — the caller treats a
    /// `false` result as the signal to route the task to `fix_needed`.
    pub async fn commit_and_merge(
        &self,
        branch_name: &str,
        commit_message: &str,
    ) -> Result<bool, WorkspaceError> {
        let root = self.root.clone();
        let branch = branch_name.to_string();
        let message = commit_message.to_string();
        self.with_lock(move || {
            run_git(&root, &["add", "-A"]);
            run_git(&root, &["commit", "-m", &message]);
            run_git(&root, &["checkout", "main"]);

            let merge = run_git(&root, &["merge", "--no-ff", &branch]);
            if !merge.status.success() {
                run_git(&root, &["merge", "--abort"]);
                run_git(&root, &["checkout", &branch]);
                return Ok(false);
            }
            Ok(true)
        })
        .await
    }

    /// Read a file's content as committed on `main`, bypassing the working
    /// tree so concurrent branch checkouts by other workers can't race this
    /// read (spec.md §4.5).
    pub async fn read_from_main(&self, relative_path: &str) -> Result<Option<Vec<u8>>, WorkspaceError> {
        let output = Command::new("git")
            .arg("show")
            .arg(format!("main:{relative_path}"))
            .current_dir(&self.root)
            .output()
            .await?;
        if output.status.success() {
            Ok(Some(output.stdout))
        } else {
            Ok(None)
        }
    }
}

fn run_git_sync(root: &Path, args: &[&str]) -> Result<Output, WorkspaceError> {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(root)
        .output()?;
    if !output.status.success() {
        return Err(WorkspaceError::GitFailed {
            command: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(output)
}

/// Best-effort git invocation whose failure is a normal control-flow
/// outcome (branch doesn't exist yet, merge conflicts) rather than an error.
fn run_git(root: &Path, args: &[&str]) -> Output {
    std::process::Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn git {}: {e}", args.join(" ")))
}
