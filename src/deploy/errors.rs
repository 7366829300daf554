use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeployError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not find config file \"{path}\"")]
    NotFound { path: PathBuf },
    #[error("failed to open config file \"{path}\" - {source}")]
    Unreadable { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file \"{path}\" - {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid config - you must set the {field} value")]
    Invalid { field: &'static str },
    #[error("invalid config - bad commit-template: {0}")]
    InvalidTemplate(#[from] TemplateError),
    #[error("config file \"{path}\" already exists - delete it to continue")]
    Exists { path: PathBuf },
    #[error("failed to write config file \"{path}\" - {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}} (expected {{date}} or {{sha}})")]
    UnknownPlaceholder(String),
    #[error("unterminated '{{' at offset {0}")]
    Unterminated(usize),
    #[error("single '}}' at offset {0} (use '}}}}' for a literal brace)")]
    StrayClose(usize),
}

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("nothing to commit - the build output matches the current deploy branch")]
    NothingToCommit,
    #[error("remote rejected {refname}: {message}")]
    PushRejected { refname: String, message: String },
}

/// Broad category of a fatal deploy error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Config,
    Precondition,
    Build,
    Staging,
    Repo,
}

#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not determine the current directory: {0}")]
    WorkingDirUnavailable(#[source] std::io::Error),
    #[error("arazu cannot deploy with local changes - commit everything and try again")]
    DirtyWorkingTree,
    #[error("could not inspect working tree: {0}")]
    WorkingTreeCheckFailed(#[source] VcsError),
    #[error("could not resolve HEAD of the source repository: {0}")]
    SourceShaUnavailable(#[source] VcsError),
    #[error("build command \"{command}\" failed with {}", exit_description(.code))]
    BuildFailed { command: String, code: Option<i32> },
    #[error("could not run build command \"{command}\": {source}")]
    BuildSpawnFailed { command: String, source: std::io::Error },
    #[error("could not create staging directory: {0}")]
    StagingCreateFailed(#[source] std::io::Error),
    #[error("deploy repository setup failed while {step}: {source}")]
    DeployRepoInitFailed { step: &'static str, source: VcsError },
    #[error("could not check out deploy branch \"{branch}\": {source}")]
    CheckoutFailed { branch: String, source: VcsError },
    #[error("build folder \"{path}\" does not exist")]
    BuildFolderMissing { path: PathBuf },
    #[error("failed to copy \"{path}\" into the staging directory: {source}")]
    CopyFailed { path: PathBuf, source: std::io::Error },
    #[error("failed to write commit message file: {0}")]
    MarkerWriteFailed(#[source] std::io::Error),
    #[error("commit failed: {0}")]
    CommitFailed(#[source] VcsError),
    #[error("push to \"{branch}\" failed: {source}")]
    PushFailed { branch: String, source: VcsError },
}

impl DeployError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DeployError::Config(_) => ErrorClass::Config,
            DeployError::WorkingDirUnavailable(_)
            | DeployError::DirtyWorkingTree
            | DeployError::SourceShaUnavailable(_) => ErrorClass::Precondition,
            DeployError::BuildFailed { .. } | DeployError::BuildSpawnFailed { .. } => {
                ErrorClass::Build
            }
            DeployError::StagingCreateFailed(_)
            | DeployError::BuildFolderMissing { .. }
            | DeployError::CopyFailed { .. }
            | DeployError::MarkerWriteFailed(_) => ErrorClass::Staging,
            DeployError::WorkingTreeCheckFailed(_)
            | DeployError::DeployRepoInitFailed { .. }
            | DeployError::CheckoutFailed { .. }
            | DeployError::CommitFailed(_)
            | DeployError::PushFailed { .. } => ErrorClass::Repo,
        }
    }
}

fn exit_description(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
