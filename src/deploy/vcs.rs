use super::errors::VcsError;
use std::path::Path;

pub type VcsResult<T> = std::result::Result<T, VcsError>;

/// Remote name the deploy repository is registered under in the staging repo.
pub const DEPLOY_REMOTE: &str = "deploy";

/// How the deploy branch was obtained in the staging repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    /// Checked out from the fetched remote branch
    Existing,
    /// Absent remotely; HEAD points at a new orphan branch
    Created,
}

/// The version-control operations a deploy needs. Every call names the
/// repository root it acts on.
pub trait VcsClient {
    /// True when no tracked file has staged or unstaged modifications.
    fn is_working_tree_clean(&self, root: &Path) -> VcsResult<bool>;
    /// Full hex id of the commit `HEAD` points to.
    fn head_sha(&self, root: &Path) -> VcsResult<String>;
    fn init(&self, root: &Path) -> VcsResult<()>;
    fn add_remote(&self, root: &Path, name: &str, url: &str) -> VcsResult<()>;
    fn fetch(&self, root: &Path, remote: &str) -> VcsResult<()>;
    fn checkout_or_create_branch(
        &self,
        root: &Path,
        remote: &str,
        branch: &str,
    ) -> VcsResult<BranchState>;
    /// Stages every file under `root` except the `exclude` paths (relative to `root`).
    fn stage_all(&self, root: &Path, exclude: &[&Path]) -> VcsResult<()>;
    /// Commits the index on the current branch and returns the new commit id.
    /// Fails with [`VcsError::NothingToCommit`] when the tree is unchanged.
    fn commit(&self, root: &Path, message: &str) -> VcsResult<String>;
    fn push(&self, root: &Path, remote: &str, branch: &str) -> VcsResult<()>;
}
