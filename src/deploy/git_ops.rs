use super::errors::VcsError;
use super::vcs::{BranchState, VcsClient, VcsResult};
use git2::{
    Commit, Cred, CredentialType, ErrorCode, IndexAddOption, PushOptions, RemoteCallbacks,
    Repository, Signature, Status, StatusOptions,
};
use log::{debug, info};
use std::path::Path;

const FALLBACK_NAME: &str = "arazu";
const FALLBACK_EMAIL: &str = "arazu@localhost";

/// [`VcsClient`] backed by libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Client;

fn remote_callbacks<'a>(config: Option<git2::Config>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = CredentialAttempts::default();
    callbacks.credentials(move |url, username_from_url, allowed| {
        attempts.next(config.as_ref(), url, username_from_url, allowed)
    });
    callbacks
}

/// Offers each kind of credential at most once. libgit2 asks again after a
/// rejected credential, so handing out the same one would loop forever.
#[derive(Debug, Default)]
struct CredentialAttempts {
    ssh_agent: bool,
    helper: bool,
    default: bool,
}

impl CredentialAttempts {
    fn next(
        &mut self,
        config: Option<&git2::Config>,
        url: &str,
        username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        if allowed.contains(CredentialType::SSH_KEY) && !self.ssh_agent {
            self.ssh_agent = true;
            // Use SSH agent for authentication
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) && !self.helper {
            self.helper = true;
            if let Some(config) = config {
                return Cred::credential_helper(config, url, username_from_url);
            }
        }
        if allowed.contains(CredentialType::DEFAULT) && !self.default {
            self.default = true;
            return Cred::default();
        }
        Err(git2::Error::from_str("authentication failed"))
    }
}

impl VcsClient for Git2Client {
    fn is_working_tree_clean(&self, root: &Path) -> VcsResult<bool> {
        let repository = Repository::discover(root)?;

        let mut options = StatusOptions::new();
        options
            .include_untracked(false)
            .include_ignored(false)
            .exclude_submodules(true);
        let statuses = repository.statuses(Some(&mut options))?;

        for entry in statuses.iter().filter(|entry| entry.status() != Status::CURRENT) {
            debug!("Modified: {} ({:?})", entry.path().unwrap_or("?"), entry.status());
        }
        let clean = statuses.iter().all(|entry| entry.status() == Status::CURRENT);
        Ok(clean)
    }

    fn head_sha(&self, root: &Path) -> VcsResult<String> {
        let repository = Repository::discover(root)?;
        let commit = repository.head()?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    fn init(&self, root: &Path) -> VcsResult<()> {
        Repository::init(root)?;
        Ok(())
    }

    fn add_remote(&self, root: &Path, name: &str, url: &str) -> VcsResult<()> {
        let repository = Repository::open(root)?;
        repository.remote(name, url)?;
        Ok(())
    }

    fn fetch(&self, root: &Path, remote: &str) -> VcsResult<()> {
        let repository = Repository::open(root)?;
        let mut remote = repository.find_remote(remote)?;

        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks(repository.config().ok()));

        info!("Fetching {}", remote.url().unwrap_or("deploy remote"));
        // An empty refspec list fetches with the remote's configured refspecs
        remote.fetch::<&str>(&[], Some(&mut fetch_options), None)?;
        Ok(())
    }

    fn checkout_or_create_branch(
        &self,
        root: &Path,
        remote: &str,
        branch: &str,
    ) -> VcsResult<BranchState> {
        let repository = Repository::open(root)?;
        let local_ref = format!("refs/heads/{branch}");

        let state = match repository.find_reference(&format!("refs/remotes/{remote}/{branch}")) {
            Ok(remote_ref) => {
                let commit = remote_ref.peel_to_commit()?;
                repository.reference(&local_ref, commit.id(), true, "arazu: track deploy branch")?;
                repository.set_head(&local_ref)?;
                repository.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
                debug!("Checked out {branch} at {}", commit.id());
                BranchState::Existing
            }
            Err(error) if error.code() == ErrorCode::NotFound => {
                // HEAD on a branch with no commits yet: the first commit has no parent
                repository.set_head(&local_ref)?;
                BranchState::Created
            }
            Err(error) => return Err(error.into()),
        };
        Ok(state)
    }

    fn stage_all(&self, root: &Path, exclude: &[&Path]) -> VcsResult<()> {
        let repository = Repository::open(root)?;
        let mut index = repository.index()?;

        let skip_excluded: &mut git2::IndexMatchedPath =
            &mut |path: &Path, _matched: &[u8]| {
                i32::from(exclude.iter().any(|excluded| *excluded == path))
            };
        index.add_all(["*"], IndexAddOption::DEFAULT, Some(skip_excluded))?;
        for path in exclude {
            if index.get_path(path, 0).is_some() {
                index.remove_path(path)?;
            }
        }
        index.write()?;
        Ok(())
    }

    fn commit(&self, root: &Path, message: &str) -> VcsResult<String> {
        let repository = Repository::open(root)?;
        let mut index = repository.index()?;
        let tree_id = index.write_tree()?;
        let tree = repository.find_tree(tree_id)?;

        let parent = match repository.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(error) if matches!(error.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                None
            }
            Err(error) => return Err(error.into()),
        };
        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_id,
            None => tree.is_empty(),
        };
        if unchanged {
            return Err(VcsError::NothingToCommit);
        }

        let signature = repository
            .signature()
            .or_else(|_| Signature::now(FALLBACK_NAME, FALLBACK_EMAIL))?;
        let parents: Vec<&Commit> = parent.iter().collect();
        let commit_id =
            repository.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        Ok(commit_id.to_string())
    }

    fn push(&self, root: &Path, remote: &str, branch: &str) -> VcsResult<()> {
        let repository = Repository::open(root)?;
        let mut remote = repository.find_remote(remote)?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");

        let mut rejection = None;
        {
            let mut callbacks = remote_callbacks(repository.config().ok());
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejection = Some((refname.to_string(), message.to_string()));
                }
                Ok(())
            });
            let mut push_options = PushOptions::new();
            push_options.remote_callbacks(callbacks);

            info!("Pushing {branch} to {}", remote.url().unwrap_or("deploy remote"));
            remote.push(&[refspec.as_str()], Some(&mut push_options))?;
        }

        match rejection {
            Some((refname, message)) => Err(VcsError::PushRejected { refname, message }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::vcs::DEPLOY_REMOTE;
    use std::fs;
    use tempfile::TempDir;

    fn repo_with_commit() -> (TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("README"), "hello\n").unwrap();
        let mut index = repository.index().unwrap();
        index.add_path(Path::new("README")).unwrap();
        index.write().unwrap();
        let tree = repository.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = Signature::now("test", "test@example.com").unwrap();
        repository
            .commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
            .unwrap();
        drop(tree);
        (dir, repository)
    }

    #[test]
    fn clean_tree_ignores_untracked_files() {
        let (dir, _repository) = repo_with_commit();
        fs::write(dir.path().join("untracked.txt"), "new").unwrap();
        assert!(Git2Client.is_working_tree_clean(dir.path()).unwrap());

        fs::write(dir.path().join("README"), "changed\n").unwrap();
        assert!(!Git2Client.is_working_tree_clean(dir.path()).unwrap());
    }

    #[test]
    fn head_sha_is_full_hex_id() {
        let (dir, repository) = repo_with_commit();
        let sha = Git2Client.head_sha(dir.path()).unwrap();
        assert_eq!(sha.len(), 40);
        assert_eq!(sha, repository.head().unwrap().target().unwrap().to_string());
    }

    #[test]
    fn head_sha_fails_without_commits() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        assert!(Git2Client.head_sha(dir.path()).is_err());
    }

    #[test]
    fn stage_all_skips_excluded_paths() {
        let dir = tempfile::tempdir().unwrap();
        Git2Client.init(dir.path()).unwrap();
        fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        fs::write(dir.path().join(".marker"), "message").unwrap();

        Git2Client.stage_all(dir.path(), &[Path::new(".marker")]).unwrap();

        let index = Repository::open(dir.path()).unwrap().index().unwrap();
        assert!(index.get_path(Path::new("index.html"), 0).is_some());
        assert!(index.get_path(Path::new(".marker"), 0).is_none());
    }

    #[test]
    fn commit_on_orphan_branch_has_no_parent() {
        let dir = tempfile::tempdir().unwrap();
        Git2Client.init(dir.path()).unwrap();
        Repository::open(dir.path()).unwrap().set_head("refs/heads/gh-pages").unwrap();
        fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        Git2Client.stage_all(dir.path(), &[]).unwrap();

        let sha = Git2Client.commit(dir.path(), "Deploy").unwrap();

        let repository = Repository::open(dir.path()).unwrap();
        let commit = repository.find_commit(git2::Oid::from_str(&sha).unwrap()).unwrap();
        assert_eq!(commit.parent_count(), 0);
        assert_eq!(commit.message(), Some("Deploy"));
        assert_eq!(repository.head().unwrap().shorthand(), Some("gh-pages"));
    }

    #[test]
    fn missing_remote_branch_becomes_an_orphan_head() {
        let dir = tempfile::tempdir().unwrap();
        Git2Client.init(dir.path()).unwrap();

        let state = Git2Client
            .checkout_or_create_branch(dir.path(), DEPLOY_REMOTE, "gh-pages")
            .unwrap();

        assert_eq!(state, BranchState::Created);
        let repository = Repository::open(dir.path()).unwrap();
        assert!(repository.head().is_err(), "branch must have no commits yet");
        assert_eq!(
            repository.find_reference("HEAD").unwrap().symbolic_target(),
            Some("refs/heads/gh-pages")
        );
    }

    #[test]
    fn existing_remote_branch_is_checked_out() {
        let (dir, repository) = repo_with_commit();
        let tip = repository.head().unwrap().target().unwrap();
        repository
            .reference("refs/remotes/deploy/gh-pages", tip, false, "fake fetch")
            .unwrap();
        fs::remove_file(dir.path().join("README")).unwrap();

        let state = Git2Client
            .checkout_or_create_branch(dir.path(), DEPLOY_REMOTE, "gh-pages")
            .unwrap();

        assert_eq!(state, BranchState::Existing);
        let repository = Repository::open(dir.path()).unwrap();
        assert_eq!(repository.head().unwrap().shorthand(), Some("gh-pages"));
        assert_eq!(repository.head().unwrap().target(), Some(tip));
        assert!(dir.path().join("README").is_file());
    }

    #[test]
    fn each_credential_kind_is_offered_once() {
        let mut attempts = CredentialAttempts::default();
        assert!(attempts.next(None, "file:///site.git", None, CredentialType::DEFAULT).is_ok());
        let err = attempts
            .next(None, "file:///site.git", None, CredentialType::DEFAULT)
            .err().unwrap();
        assert_eq!(err.message(), "authentication failed");

        let ssh = "ssh://git@example.com/site.git";
        // The first agent attempt may fail when libgit2 lacks ssh support
        let _ = attempts.next(None, ssh, Some("git"), CredentialType::SSH_KEY);
        assert!(attempts.next(None, ssh, Some("git"), CredentialType::SSH_KEY).is_err());
    }

    #[test]
    fn credential_helper_without_config_falls_through() {
        let mut attempts = CredentialAttempts::default();
        let err = attempts
            .next(None, "https://example.com/site.git", None, CredentialType::USER_PASS_PLAINTEXT)
            .err().unwrap();
        assert_eq!(err.message(), "authentication failed");
    }

    #[test]
    fn unchanged_tree_is_nothing_to_commit() {
        let (dir, _repository) = repo_with_commit();
        Git2Client.stage_all(dir.path(), &[]).unwrap();
        let err = Git2Client.commit(dir.path(), "again").unwrap_err();
        assert!(matches!(err, VcsError::NothingToCommit));

        let empty = tempfile::tempdir().unwrap();
        Git2Client.init(empty.path()).unwrap();
        let err = Git2Client.commit(empty.path(), "empty").unwrap_err();
        assert!(matches!(err, VcsError::NothingToCommit));
    }
}
