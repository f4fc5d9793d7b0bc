//! Git witness: commits the anchor into a repository.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::anchor::{AnchorPayload, Witness};
use crate::error::{LedgerError, Result};

const KIND: &str = "git";

pub struct GitWitness {
    program: PathBuf,
    repo_path: PathBuf,
    file_name: String,
}

impl GitWitness {
    pub fn new(repo_path: PathBuf, file_name: String) -> Self {
        Self {
            program: PathBuf::from("git"),
            repo_path,
            file_name,
        }
    }

    /// Use a specific git binary instead of the one on `PATH`
    pub fn with_program(mut self, program: PathBuf) -> Self {
        self.program = program;
        self
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        git(&self.program, &self.repo_path, args).await
    }
}

#[async_trait]
impl Witness for GitWitness {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn publish(&self, payload: &AnchorPayload) -> Result<String> {
        let inside = self.git(&["rev-parse", "--is-inside-work-tree"])
            .await
            .map_err(|_| {
                LedgerError::witness(
                    KIND,
                    format!("{} is not a git repository", self.repo_path.display()),
                )
            })?;
        if inside != "true" {
            return Err(LedgerError::witness(
                KIND,
                format!("{} is not a git work tree", self.repo_path.display()),
            ));
        }

        let contents = serde_json::to_string_pretty(payload)?;
        tokio::fs::write(self.repo_path.join(&self.file_name), contents + "\n")
            .await
            .map_err(|e| LedgerError::witness(KIND, e))?;

        let short = &payload.head_fingerprint[..payload.head_fingerprint.len().min(12)];
        let message = format!("Anchor ledger head {} ({})", short, payload.timestamp);
        self.git(&["add", "--", self.file_name.as_str()]).await?;
        self.git(&["commit", "--quiet", "-m", message.as_str()]).await?;

        let commit = self.git(&["rev-parse", "HEAD"]).await?;
        debug!("Committed anchor {} in {}", commit, self.repo_path.display());
        Ok(commit)
    }
}

/// Run git and capture its output. A dropped future kills the child so a
/// timed-out anchor cannot keep holding the index lock.
async fn git(program: &Path, repo: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .current_dir(repo)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| LedgerError::witness(KIND, format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        return Err(LedgerError::witness(
            KIND,
            format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
