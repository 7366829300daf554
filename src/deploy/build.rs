use log::debug;
use std::io;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    /// `code` is `None` when the process was killed by a signal
    Failed { code: Option<i32> },
}

/// Runs the configured build command.
pub trait BuildRunner {
    fn run(&self, command: &str, cwd: &Path) -> io::Result<BuildStatus>;
}

/// Runs commands through the platform shell with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl BuildRunner for ShellRunner {
    fn run(&self, command: &str, cwd: &Path) -> io::Result<BuildStatus> {
        debug!("Spawning shell for `{command}` in {}", cwd.display());
        let status = shell(command).current_dir(cwd).status()?;
        if status.success() {
            Ok(BuildStatus::Success)
        } else {
            Ok(BuildStatus::Failed { code: status.code() })
        }
    }
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut shell = Command::new("sh");
    shell.arg("-c").arg(command);
    shell
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut shell = Command::new("cmd");
    shell.arg("/C").arg(command);
    shell
}
