// Publishes a build directory to a branch of a git remote

mod tree;

use crate::{Deployer, DeploymentResult};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, info};
use sitekit_core::config::DeployConfig;
use std::path::Path;
use tempfile::TempDir;
use tokio::process::Command;

use tree::build_tree;

/// Config overrides applied when no commit identity is configured
const FALLBACK_IDENTITY: [&str; 2] = ["user.name=sitekit", "user.email=sitekit@localhost"];

/// Replaces the whole tree of `branch` on `repo` with the build output,
/// keeping the branch history.
///
/// The commit is built with gix in a scratch repository; only the network
/// operations (`ls-remote`, `fetch`, `push`) go through the `git` binary.
pub struct GitBranchDeployer {
    repo: String,
    branch: String,
    message: String,
}

impl GitBranchDeployer {
    pub fn new(repo: &str, branch: &str, message: &str) -> Self {
        Self {
            repo: repo.to_string(),
            branch: branch.to_string(),
            message: message.to_string(),
        }
    }

    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        let Some(repo) = config.repo.as_deref() else {
            bail!("deploy.repo is not configured");
        };
        Ok(Self::new(repo, &config.branch, &config.message))
    }

    fn head_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    async fn branch_exists(&self, cwd: &Path) -> Result<bool> {
        let heads = git(cwd, &["ls-remote", "--heads", &self.repo, &self.branch]).await?;
        Ok(!heads.trim().is_empty())
    }

    /// Fetch the current branch tip into the scratch repository, if any.
    async fn fetch_tip(&self, work: &Path) -> Result<()> {
        if !self.branch_exists(work).await? {
            info!("Branch {} does not exist yet, creating it", self.branch);
            return Ok(());
        }
        let refspec = format!("+{0}:{0}", self.head_ref());
        git(work, &["fetch", "--quiet", "--update-head-ok", &self.repo, &refspec]).await?;
        Ok(())
    }
}

#[async_trait]
impl Deployer for GitBranchDeployer {
    async fn deploy(&self, build_dir: &Path) -> Result<DeploymentResult> {
        if !build_dir.is_dir() {
            bail!("Build directory does not exist: {}", build_dir.display());
        }
        which::which("git").context("git is required to deploy")?;

        let tmp = TempDir::new()?;
        let work = tmp.path();
        gix::init(work).with_context(|| format!("Failed to init {}", work.display()))?;
        self.fetch_tip(work).await?;

        let Some(commit) = commit_build(work, build_dir, &self.head_ref(), &self.message)? else {
            info!("{} is already up to date", self.branch);
            return Ok(DeploymentResult {
                repo: self.repo.clone(),
                branch: self.branch.clone(),
                commit: None,
            });
        };

        let refspec = format!("{0}:{0}", self.head_ref());
        git(work, &["push", "--quiet", &self.repo, &refspec]).await?;

        info!("Pushed {} to {} ({})", self.branch, self.repo, commit);
        Ok(DeploymentResult {
            repo: self.repo.clone(),
            branch: self.branch.clone(),
            commit: Some(commit.to_string()),
        })
    }
}

/// Open the scratch repository, falling back to a fixed identity when the
/// user has none configured.
fn open_repo(work: &Path) -> Result<gix::Repository> {
    let repo = gix::open(work)?;
    if repo.committer().is_some() {
        return Ok(repo);
    }
    let options = gix::open::Options::default().config_overrides(FALLBACK_IDENTITY);
    Ok(gix::open_opts(work, options)?)
}

/// Commit `build_dir` as the whole tree of `head_ref`, on top of its
/// current tip. Returns `None` when the tip already has that tree.
pub fn commit_build(
    work: &Path,
    build_dir: &Path,
    head_ref: &str,
    message: &str,
) -> Result<Option<gix::ObjectId>> {
    let repo = open_repo(work)?;
    let tree = build_tree(&repo, build_dir)?;
    let tree_id = repo.write_object(&tree)?.detach();

    let parent = repo
        .find_reference(head_ref)
        .ok()
        .and_then(|r| r.try_id().map(|id| id.detach()));
    if let Some(parent) = parent {
        let current = repo.find_commit(parent)?.tree_id()?.detach();
        if current == tree_id {
            return Ok(None);
        }
    }

    let parents: Vec<gix::ObjectId> = parent.into_iter().collect();
    let commit = repo
        .commit(head_ref, message, tree_id, parents)
        .with_context(|| format!("Failed to commit to {}", head_ref))?;
    debug!("Committed tree {} as {}", tree_id, commit);
    Ok(Some(commit.detach()))
}

async fn git(cwd: &Path, args: &[&str]) -> Result<String> {
    debug!("git {}", args.join(" "));
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .context("Failed to run git")?;

    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
