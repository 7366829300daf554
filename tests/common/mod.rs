//! Shared setup for integration tests: a source repository with a build
//! folder, and a bare repository standing in for the deploy remote.

#![allow(dead_code)]

use git2::{Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Project {
    pub source: TempDir,
    pub remote: TempDir,
}

impl Project {
    /// Committed source repo ignoring `dist/`, which holds `index.html`.
    pub fn new() -> Self {
        let source = tempfile::tempdir().unwrap();
        let repository = Repository::init(source.path()).unwrap();
        fs::write(source.path().join("README.md"), "# site\n").unwrap();
        fs::write(source.path().join(".gitignore"), "dist/\n").unwrap();
        commit_all(&repository, "initial");

        let project = Self { source, remote: tempfile::tempdir().unwrap() };
        Repository::init_bare(project.remote.path()).unwrap();
        project.write_build_file("index.html", "<h1>home</h1>");
        project
    }

    pub fn source_path(&self) -> &Path {
        self.source.path()
    }

    pub fn remote_url(&self) -> String {
        self.remote.path().to_string_lossy().into_owned()
    }

    pub fn write_build_file(&self, name: &str, contents: &str) {
        let path = self.source.path().join("dist").join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn source_head(&self) -> String {
        let repository = Repository::open(self.source.path()).unwrap();
        let head = repository.head().unwrap().target().unwrap();
        head.to_string()
    }

    /// YAML config pointing at the bare remote.
    pub fn config_yaml(&self, build_command: &str) -> String {
        format!(
            "source-repo: \"{source}\"\n\
             deploy-repo: \"{remote}\"\n\
             deploy-branch: gh-pages\n\
             build-command: \"{build_command}\"\n\
             build-folder: dist\n\
             commit-template: \"Deploy {{date}}\\n\\nSHA: {{sha}}\"\n",
            source = yaml_escape(&self.source.path().to_string_lossy()),
            remote = yaml_escape(&self.remote_url()),
        )
    }

    pub fn write_config(&self, build_command: &str) -> PathBuf {
        let path = self.source.path().join("arazu.yaml");
        fs::write(&path, self.config_yaml(build_command)).unwrap();
        path
    }

    pub fn remote_repository(&self) -> Repository {
        Repository::open_bare(self.remote.path()).unwrap()
    }

    /// Commit id at the tip of `branch` on the remote, if the branch exists.
    pub fn remote_tip(&self, branch: &str) -> Option<String> {
        let repository = self.remote_repository();
        let reference = repository.find_reference(&format!("refs/heads/{branch}")).ok()?;
        let id = reference.target()?;
        Some(id.to_string())
    }
}

fn yaml_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn commit_all(repository: &Repository, message: &str) {
    let mut index = repository.index().unwrap();
    index
        .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repository.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = Signature::now("test", "test@example.com").unwrap();
    let parent = repository.head().ok().map(|head| head.peel_to_commit().unwrap());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repository
        .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap();
}
