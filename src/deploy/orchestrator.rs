//! The deploy lifecycle: preflight, build, stage, commit, push, clean up.
//!
//! Every step receives the paths it works on explicitly; nothing here reads
//! or changes the process working directory.

use super::build::{BuildRunner, BuildStatus};
use super::config::DeployConfig;
use super::errors::{DeployError, Result, VcsError};
use super::staging::{copy_build_output, StagingArea, COMMIT_MESSAGE_FILE};
use super::vcs::{BranchState, VcsClient, DEPLOY_REMOTE};
use chrono::Local;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Skip the push and keep the staging directory for inspection
    pub dry_run: bool,
    /// Suppress human-readable output
    pub quiet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResult {
    pub source_sha: String,
    pub commit_sha: String,
    pub commit_message: String,
    pub branch: BranchState,
    /// Staging directory left on disk by a dry run
    pub staging_dir: Option<PathBuf>,
    pub pushed: bool,
    /// Staging directory that could not be deleted
    pub cleanup_warning: Option<PathBuf>,
}

/// What happened inside the staging directory.
struct Published {
    commit_sha: String,
    commit_message: String,
    branch: BranchState,
    pushed: bool,
}

pub struct Deployer<V, R> {
    vcs: V,
    runner: R,
    source_root: PathBuf,
}

impl<V: VcsClient, R: BuildRunner> Deployer<V, R> {
    /// `source_root` is the source repository checkout the build runs in.
    pub fn new(vcs: V, runner: R, source_root: impl Into<PathBuf>) -> Self {
        Self { vcs, runner, source_root: source_root.into() }
    }

    pub fn deploy(&self, config: &DeployConfig, options: DeployOptions) -> Result<DeployResult> {
        info!("Checking for local changes");
        let clean = self
            .vcs
            .is_working_tree_clean(&self.source_root)
            .map_err(DeployError::WorkingTreeCheckFailed)?;
        if !clean {
            return Err(DeployError::DirtyWorkingTree);
        }

        let source_sha = self
            .vcs
            .head_sha(&self.source_root)
            .map_err(DeployError::SourceShaUnavailable)?;
        debug!("Source commit is {source_sha}");

        self.run_build(&config.build_command)?;

        let staging = StagingArea::create().map_err(DeployError::StagingCreateFailed)?;
        info!("Assembling deploy in {}", staging.path().display());
        let outcome = self.publish(&staging, config, &source_sha, options);

        if options.dry_run {
            let staging_dir = staging.retain();
            let published = outcome.inspect_err(|_| {
                warn!("Dry run staging directory kept at {}", staging_dir.display());
            })?;
            return Ok(DeployResult {
                source_sha,
                commit_sha: published.commit_sha,
                commit_message: published.commit_message,
                branch: published.branch,
                staging_dir: Some(staging_dir),
                pushed: false,
                cleanup_warning: None,
            });
        }

        info!("Deleting temporary deploy folder {}", staging.path().display());
        let cleanup_warning = match staging.close() {
            Ok(()) => None,
            Err((path, err)) => {
                warn!("Failed to delete deploy folder ({err}). Please delete it by hand.");
                warn!("{}", path.display());
                Some(path)
            }
        };

        let published = outcome?;
        Ok(DeployResult {
            source_sha,
            commit_sha: published.commit_sha,
            commit_message: published.commit_message,
            branch: published.branch,
            staging_dir: None,
            pushed: published.pushed,
            cleanup_warning,
        })
    }

    fn run_build(&self, command: &str) -> Result<()> {
        if command.trim().is_empty() {
            info!("No build command configured, skipping build");
            return Ok(());
        }

        info!("Running build command \"{command}\"");
        let status = self
            .runner
            .run(command, &self.source_root)
            .map_err(|source| DeployError::BuildSpawnFailed { command: command.to_string(), source })?;
        match status {
            BuildStatus::Success => Ok(()),
            BuildStatus::Failed { code } => {
                Err(DeployError::BuildFailed { command: command.to_string(), code })
            }
        }
    }

    /// Steps that run inside the staging directory.
    fn publish(
        &self,
        staging: &StagingArea,
        config: &DeployConfig,
        source_sha: &str,
        options: DeployOptions,
    ) -> Result<Published> {
        let root = staging.path();

        info!("Setting up repository");
        self.vcs.init(root).map_err(init_failed("initializing"))?;
        let remote_url = resolve_remote(&self.source_root, &config.deploy_repo);
        info!("Adding deploy remote {remote_url}");
        self.vcs
            .add_remote(root, DEPLOY_REMOTE, &remote_url)
            .map_err(init_failed("adding the deploy remote"))?;
        self.vcs
            .fetch(root, DEPLOY_REMOTE)
            .map_err(init_failed("fetching the deploy remote"))?;

        let deploy_branch = &config.deploy_branch;
        info!("Setting branch \"{deploy_branch}\"");
        let branch = self
            .vcs
            .checkout_or_create_branch(root, DEPLOY_REMOTE, deploy_branch)
            .map_err(|source| DeployError::CheckoutFailed {
                branch: deploy_branch.clone(),
                source,
            })?;
        if branch == BranchState::Created {
            info!("Creating deploy branch \"{deploy_branch}\"");
        }

        let build_folder = self.source_root.join(&config.build_folder);
        info!("Copying build output {} to deploy folder", build_folder.display());
        let copied = copy_build_output(&build_folder, root)?;
        debug!("Copied {copied} files");

        let date = Local::now().format(DATE_FORMAT).to_string();
        let commit_message = config.commit_template.render(&date, source_sha);
        if options.dry_run && !options.quiet {
            println!("Dry Run - Commit Message: {commit_message}");
        }
        staging
            .write_marker(&commit_message)
            .map_err(DeployError::MarkerWriteFailed)?;

        info!("Adding changes to deploy repository");
        self.vcs
            .stage_all(root, &[Path::new(COMMIT_MESSAGE_FILE)])
            .map_err(DeployError::CommitFailed)?;
        info!("Creating new deploy commit");
        let commit_sha = self
            .vcs
            .commit(root, &commit_message)
            .map_err(DeployError::CommitFailed)?;

        if options.dry_run {
            return Ok(Published { commit_sha, commit_message, branch, pushed: false });
        }

        info!("Pushing latest build");
        self.vcs
            .push(root, DEPLOY_REMOTE, deploy_branch)
            .map_err(|source| DeployError::PushFailed { branch: deploy_branch.clone(), source })?;

        debug!("Deleting temp commit message file");
        if let Err(err) = staging.remove_marker() {
            warn!("Could not delete {}: {err}", staging.marker_path().display());
        }

        Ok(Published { commit_sha, commit_message, branch, pushed: true })
    }
}

fn init_failed(step: &'static str) -> impl FnOnce(VcsError) -> DeployError {
    move |source| DeployError::DeployRepoInitFailed { step, source }
}

/// Local deploy repositories may be given relative to the source root.
fn resolve_remote(source_root: &Path, deploy_repo: &str) -> String {
    let is_url = deploy_repo.contains("://") || is_scp_like(deploy_repo);
    if is_url || Path::new(deploy_repo).is_absolute() {
        return deploy_repo.to_string();
    }

    let local = source_root.join(deploy_repo);
    if local.exists() {
        local.to_string_lossy().into_owned()
    } else {
        deploy_repo.to_string()
    }
}

// `git@host:owner/repo.git`; a single letter before the colon is a drive.
fn is_scp_like(url: &str) -> bool {
    match url.split_once(':') {
        Some((host, _)) => host.len() > 1 && !host.contains('/') && !host.contains('\\'),
        None => false,
    }
}
