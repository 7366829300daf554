pub mod build;
pub mod config;
pub mod errors;
pub mod git_ops;
pub mod message;
pub mod orchestrator;
pub mod staging;
pub mod vcs;

pub use build::{BuildRunner, BuildStatus, ShellRunner};
pub use config::{ConfigFormat, DeployConfig};
pub use errors::{ConfigError, DeployError, ErrorClass, VcsError};
pub use git_ops::Git2Client;
pub use orchestrator::{DeployOptions, DeployResult, Deployer};
pub use vcs::{BranchState, VcsClient};
