//! Build a project and publish its output folder to a git branch.

pub mod deploy;
