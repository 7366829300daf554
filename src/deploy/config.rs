use super::errors::ConfigError;
use super::message::CommitTemplate;
use log::debug;
use serde::{Deserialize, Deserializer};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "arazu.yaml";
pub const DEFAULT_TOML_CONFIG_PATH: &str = "arazu.toml";

const REPO_PLACEHOLDER: &str = "fill this in - no branch name";
const VALUE_PLACEHOLDER: &str = "fill this in";
const DEFAULT_SOURCE_BRANCH: &str = "master";
const DEFAULT_DEPLOY_BRANCH: &str = "gh-pages";
const DEFAULT_COMMIT_TEMPLATE: &str = "Deploy {date}\n\nSHA: {sha}\n";

/// Written by `arazu init`.
pub const YAML_TEMPLATE: &str = r#"# Arazu Config - check this in to source control

# where the source code lives
source-repo: "fill this in - no branch name"
source-branch: master

# where the deploy code lives
deploy-repo: "fill this in - no branch name"
# if github, use master for organization sites, gh-pages for project
deploy-branch: gh-pages

# build command - this gets called to make your build
build-command: "fill this in"

# folder with build output - this gets commited into the deploy repo
build-folder: "fill this in"

# format for commit message - can include {date} and {sha}
commit-template: |
  Deploy {date}

  SHA: {sha}
"#;

/// Same values as [`YAML_TEMPLATE`], for projects that keep TOML configs.
pub const TOML_TEMPLATE: &str = r#"# Arazu Config - check this in to source control

# where the source code lives
source-repo = "fill this in - no branch name"
source-branch = "master"

# where the deploy code lives
deploy-repo = "fill this in - no branch name"
# if github, use master for organization sites, gh-pages for project
deploy-branch = "gh-pages"

# build command - this gets called to make your build
build-command = "fill this in"

# folder with build output - this gets commited into the deploy repo
build-folder = "fill this in"

# format for commit message - can include {date} and {sha}
commit-template = """
Deploy {date}

SHA: {sha}
"""
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }

    pub fn default_path(self) -> &'static str {
        match self {
            ConfigFormat::Yaml => DEFAULT_CONFIG_PATH,
            ConfigFormat::Toml => DEFAULT_TOML_CONFIG_PATH,
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            ConfigFormat::Yaml => YAML_TEMPLATE,
            ConfigFormat::Toml => TOML_TEMPLATE,
        }
    }
}

/// Validated deploy settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    /// Where the source code lives (informational)
    pub source_repo: String,
    /// Source branch (informational, default master)
    pub source_branch: String,
    /// Remote URL or path that receives the build output
    pub deploy_repo: String,
    /// Branch in the deploy repo (default gh-pages)
    pub deploy_branch: String,
    /// Shell command producing the build; empty means no build step
    pub build_command: String,
    /// Build output folder, relative to the source root
    pub build_folder: PathBuf,
    pub commit_template: CommitTemplate,
}

/// The document as written; `None` means the key was absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    source_repo: Option<String>,
    source_branch: Option<String>,
    deploy_repo: Option<String>,
    deploy_branch: Option<String>,
    #[serde(default, deserialize_with = "present")]
    build_command: Option<Option<String>>,
    build_folder: Option<String>,
    commit_template: Option<String>,
}

// Distinguishes `build-command: ~` (no build) from a missing key.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl DeployConfig {
    pub fn load(path: &Path) -> Result<DeployConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound { path: path.to_path_buf() });
        }
        let file_text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&file_text, ConfigFormat::from_path(path)).map_err(
            |err| match err {
                ConfigError::Parse { message, .. } => ConfigError::Parse {
                    path: path.to_path_buf(),
                    message,
                },
                other => other,
            },
        )?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a config document. Parse errors carry an empty path.
    pub fn parse(text: &str, format: ConfigFormat) -> Result<DeployConfig, ConfigError> {
        let mut ignored: Vec<String> = Vec::new();
        let raw: RawConfig = match format {
            ConfigFormat::Yaml => {
                let deserializer = serde_yaml_ng::Deserializer::from_str(text);
                serde_ignored::deserialize(deserializer, |key| ignored.push(key.to_string()))
                    .map_err(|err| parse_error(err.to_string()))?
            }
            ConfigFormat::Toml => {
                let deserializer = toml::Deserializer::new(text);
                serde_ignored::deserialize(deserializer, |key| ignored.push(key.to_string()))
                    .map_err(|err| parse_error(err.to_string()))?
            }
        };
        for key in &ignored {
            debug!("Ignoring unknown config key '{key}'");
        }
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<DeployConfig, ConfigError> {
        let build_command = match raw.build_command {
            Some(command) => command.unwrap_or_default(),
            None => VALUE_PLACEHOLDER.to_string(),
        };
        let build_folder = raw.build_folder.unwrap_or_else(|| VALUE_PLACEHOLDER.to_string());
        let source_repo = raw.source_repo.unwrap_or_else(|| REPO_PLACEHOLDER.to_string());
        let deploy_repo = raw.deploy_repo.unwrap_or_else(|| REPO_PLACEHOLDER.to_string());

        let required = [
            ("build-command", &build_command, VALUE_PLACEHOLDER),
            ("build-folder", &build_folder, VALUE_PLACEHOLDER),
            ("source-repo", &source_repo, REPO_PLACEHOLDER),
            ("deploy-repo", &deploy_repo, REPO_PLACEHOLDER),
        ];
        for (field, value, placeholder) in required {
            if value == placeholder {
                return Err(ConfigError::Invalid { field });
            }
        }

        let deploy_branch = raw
            .deploy_branch
            .unwrap_or_else(|| DEFAULT_DEPLOY_BRANCH.to_string());
        if deploy_repo.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "deploy-repo" });
        }
        if deploy_branch.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "deploy-branch" });
        }

        let commit_template = CommitTemplate::parse(
            raw.commit_template.as_deref().unwrap_or(DEFAULT_COMMIT_TEMPLATE),
        )?;

        Ok(DeployConfig {
            source_repo,
            source_branch: raw
                .source_branch
                .unwrap_or_else(|| DEFAULT_SOURCE_BRANCH.to_string()),
            deploy_repo,
            deploy_branch,
            build_command,
            build_folder: PathBuf::from(build_folder),
            commit_template,
        })
    }
}

fn parse_error(message: String) -> ConfigError {
    ConfigError::Parse { path: PathBuf::new(), message }
}

/// Writes the config template to `path`, refusing to overwrite.
pub fn write_template(path: &Path, format: ConfigFormat) -> Result<(), ConfigError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::AlreadyExists => ConfigError::Exists { path: path.to_path_buf() },
            _ => ConfigError::Write { path: path.to_path_buf(), source },
        })?;
    file.write_all(format.template().as_bytes())
        .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;
    Ok(())
}
