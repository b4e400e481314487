//! Git adapter for lane isolation.
//!
//! Shells out to the `git` binary. Branches and worktrees are created from the
//! main repository; merges run inside whichever working copy the caller names.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{VcsBackend, VcsError};

/// Git CLI backend
pub struct GitCli {
    /// Main repository (owner of all worktrees)
    repo: PathBuf,

    /// Path to the git binary (default: "git")
    binary_path: String,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            binary_path: "git".to_string(),
        }
    }

    /// Create a backend with a custom git binary
    pub fn with_binary_path(repo: impl Into<PathBuf>, binary_path: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            binary_path: binary_path.into(),
        }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Run git in `dir`, returning stdout on success
    async fn git(&self, dir: &Path, op: &str, args: &[&str]) -> Result<String, VcsError> {
        debug!(dir = %dir.display(), ?args, "Running git");

        let output = Command::new(&self.binary_path)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VcsError::Command {
                op: op.to_string(),
                detail: format!("failed to spawn {}: {}", self.binary_path, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let detail = if stderr.is_empty() { stdout } else { stderr };
            return Err(VcsError::Command {
                op: op.to_string(),
                detail,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl VcsBackend for GitCli {
    async fn branch_create(&self, branch: &str, from: &str) -> Result<(), VcsError> {
        self.git(&self.repo, "branch", &["branch", branch, from]).await?;
        Ok(())
    }

    async fn branch_merge(&self, workdir: &Path, into: &str, branch: &str) -> Result<(), VcsError> {
        self.git(workdir, "checkout", &["checkout", into]).await?;

        match self
            .git(workdir, "merge", &["merge", "--no-edit", branch])
            .await
        {
            Ok(_) => Ok(()),
            Err(VcsError::Command { detail, .. }) => {
                // Leave the working copy clean; abort fails harmlessly if no merge is in progress
                let _ = self.git(workdir, "merge --abort", &["merge", "--abort"]).await;
                Err(VcsError::Conflict {
                    into: into.to_string(),
                    branch: branch.to_string(),
                    detail,
                })
            }
            Err(other) => Err(other),
        }
    }

    async fn branch_delete(&self, branch: &str, force: bool) -> Result<(), VcsError> {
        let flag = if force { "-D" } else { "-d" };
        self.git(&self.repo, "branch delete", &["branch", flag, branch])
            .await?;
        Ok(())
    }

    async fn workspace_create(&self, path: &Path, branch: &str) -> Result<(), VcsError> {
        let path = path_arg(path);
        self.git(&self.repo, "worktree add", &["worktree", "add", &path, branch])
            .await?;
        Ok(())
    }

    async fn workspace_remove(&self, path: &Path, force: bool) -> Result<(), VcsError> {
        let path = path_arg(path);
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path);
        self.git(&self.repo, "worktree remove", &args).await?;
        Ok(())
    }

    async fn commit_all(&self, workspace: &Path, message: &str) -> Result<(), VcsError> {
        self.git(workspace, "add", &["add", "-A"]).await?;
        self.git(workspace, "commit", &["commit", "-m", message])
            .await?;
        Ok(())
    }
}
