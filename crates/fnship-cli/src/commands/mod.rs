pub mod deploy;
pub mod history;

use std::path::Path;

use fnship_core::FileConfig;

/// `--config` if given, else `./fnship.toml` when present.
fn load_file_config(explicit: Option<&Path>) -> anyhow::Result<Option<FileConfig>> {
    Ok(FileConfig::locate(explicit, Path::new("."))?)
}
