pub mod daemon;
pub mod locate;
pub mod logs;
pub mod print;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}
