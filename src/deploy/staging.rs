//! The staging directory: a scoped temporary directory holding the deploy
//! repository checkout plus the copied build output.
//!
//! The directory is removed when the [`StagingArea`] is dropped or closed,
//! unless it is explicitly retained with [`StagingArea::retain`].

use super::errors::{DeployError, Result};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Rendered commit message, kept out of the committed tree.
pub const COMMIT_MESSAGE_FILE: &str = ".arazu_commit_message";

const STAGING_PREFIX: &str = "arazu_deploy";

#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Creates a uniquely named directory under the system temp dir.
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir()?;
        debug!("Created staging directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn marker_path(&self) -> PathBuf {
        self.path().join(COMMIT_MESSAGE_FILE)
    }

    pub fn write_marker(&self, message: &str) -> io::Result<()> {
        fs::write(self.marker_path(), message)
    }

    pub fn remove_marker(&self) -> io::Result<()> {
        fs::remove_file(self.marker_path())
    }

    /// Keeps the directory on disk and returns its path.
    pub fn retain(self) -> PathBuf {
        self.dir.keep()
    }

    /// Deletes the directory. On failure the path is handed back so it can be
    /// reported for manual removal.
    pub fn close(self) -> std::result::Result<(), (PathBuf, io::Error)> {
        let path = self.path().to_path_buf();
        self.dir.close().map_err(|err| (path, err))
    }
}

/// Copies the contents of `build_folder` (not the folder itself) into
/// `destination`, returning the number of files copied.
pub fn copy_build_output(build_folder: &Path, destination: &Path) -> Result<usize> {
    if !build_folder.is_dir() {
        return Err(DeployError::BuildFolderMissing { path: build_folder.to_path_buf() });
    }

    let mut count = 0;
    for entry in fs::read_dir(build_folder).map_err(copy_failed(build_folder))? {
        let entry = entry.map_err(copy_failed(build_folder))?;
        // A nested repository would clobber the staging repository's own .git
        if entry.file_name() == ".git" {
            debug!("Skipping {}", entry.path().display());
            continue;
        }
        copy_entry(&entry.path(), &destination.join(entry.file_name()), &mut count)?;
    }
    Ok(count)
}

fn copy_entry(source: &Path, destination: &Path, count: &mut usize) -> Result<()> {
    let file_type = fs::symlink_metadata(source).map_err(copy_failed(source))?.file_type();
    if file_type.is_symlink() {
        // Links are recreated as links and never followed
        let target = fs::read_link(source).map_err(copy_failed(source))?;
        clear_stale(destination, |_| false).map_err(copy_failed(source))?;
        make_link(source, &target, destination).map_err(copy_failed(source))?;
        *count += 1;
    } else if file_type.is_dir() {
        clear_stale(destination, |existing| existing.is_dir()).map_err(copy_failed(source))?;
        fs::create_dir_all(destination).map_err(copy_failed(source))?;
        for entry in fs::read_dir(source).map_err(copy_failed(source))? {
            let entry = entry.map_err(copy_failed(source))?;
            copy_entry(&entry.path(), &destination.join(entry.file_name()), count)?;
        }
    } else {
        // fs::copy writes through a link left behind by the previous deploy
        clear_stale(destination, |existing| existing.is_file()).map_err(copy_failed(source))?;
        fs::copy(source, destination).map_err(copy_failed(source))?;
        *count += 1;
    }
    Ok(())
}

/// Removes what the checked-out deploy branch has at `path`, unless `reuse`
/// accepts its file type.
fn clear_stale(path: &Path, reuse: impl Fn(fs::FileType) -> bool) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(existing) if reuse(existing.file_type()) => Ok(()),
        Ok(existing) if existing.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
fn make_link(_source: &Path, target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_link(source: &Path, target: &Path, link: &Path) -> io::Result<()> {
    // Windows needs the link kind up front; relative targets resolve next to the source link
    let resolved = match source.parent() {
        Some(dir) => dir.join(target),
        None => target.to_path_buf(),
    };
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

fn copy_failed(path: &Path) -> impl FnOnce(io::Error) -> DeployError + '_ {
    move |source| DeployError::CopyFailed { path: path.to_path_buf(), source }
}
