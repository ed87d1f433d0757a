use directories::ProjectDirs;
use std::path::PathBuf;

use crate::{Error, Result};

/// Switchboard directories following the XDG spec
#[derive(Debug, Clone)]
pub struct Directories {
    /// Config directory (~/.config/switchboard)
    pub config: PathBuf,

    /// Data directory (~/.local/share/switchboard)
    pub data: PathBuf,

    /// Config file path
    pub config_file: PathBuf,

    /// Persisted state snapshot
    pub state_file: PathBuf,
}

impl Directories {
    /// Resolve the standard per-user paths.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the system has no home directory to
    /// derive the project directories from.
    pub fn new() -> Result<Self> {
        let project = ProjectDirs::from("", "", "switchboard").ok_or_else(|| {
            Error::Config("failed to determine project directories".to_string())
        })?;

        let config = project.config_dir().to_path_buf();
        let data = project.data_dir().to_path_buf();

        Ok(Self {
            config_file: config.join("config.json"),
            state_file: data.join("state.json"),
            config,
            data,
        })
    }

    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            config_file: base.join("config.json"),
            state_file: base.join("state.json"),
            config: base.clone(),
            data: base,
        }
    }

    /// Ensure all directories exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.data)?;
        Ok(())
    }
}
