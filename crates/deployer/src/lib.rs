// Deployment targets (git hosting branch)

pub mod git;

use async_trait::async_trait;
use std::path::Path;

pub use git::GitBranchDeployer;

#[derive(Debug, Clone)]
pub struct DeploymentResult {
    pub repo: String,
    pub branch: String,
    /// `None` when the branch already matched the build output
    pub commit: Option<String>,
}

#[async_trait]
pub trait Deployer {
    async fn deploy(&self, build_dir: &Path) -> anyhow::Result<DeploymentResult>;
}
