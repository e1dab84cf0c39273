use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::{errors::JournalError, utils::app_data_dir};

const CONFIG_FILE: &str = "config.json";
const TMP_SUFFIX: &str = "tmp";

/// Names accepted in [`JournalConfig::finalizers`].
pub const KNOWN_FINALIZERS: [&str; 3] = ["elided-amount", "minimum-postings", "payee-required"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalConfig {
    /// Escalate every diagnostic to an aborted read.
    #[serde(default)]
    pub strict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_commodity: Option<String>,
    #[serde(default = "JournalConfig::default_log_filter")]
    pub log_filter: String,
    /// Built-in finalizers installed on new journals, in order.
    #[serde(default = "JournalConfig::default_finalizers")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_file: Option<PathBuf>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            strict: false,
            default_commodity: None,
            log_filter: Self::default_log_filter(),
            finalizers: Self::default_finalizers(),
            snapshot_file: None,
        }
    }
}

impl JournalConfig {
    fn default_log_filter() -> String {
        "journal_core=info".into()
    }

    fn default_finalizers() -> Vec<String> {
        vec!["elided-amount".into(), "minimum-postings".into()]
    }

    pub fn validate(&self) -> Result<(), JournalError> {
        if let Some(unknown) = self
            .finalizers
            .iter()
            .find(|name| !KNOWN_FINALIZERS.contains(&name.as_str()))
        {
            return Err(JournalError::Config(format!(
                "unknown finalizer `{}`",
                unknown
            )));
        }
        if self
            .default_commodity
            .as_deref()
            .is_some_and(|code| code.trim().is_empty())
        {
            return Err(JournalError::Config(
                "default commodity must not be blank".into(),
            ));
        }
        Ok(())
    }
}

/// Loads and stores [`JournalConfig`] under the application data directory.
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, JournalError> {
        Self::with_base_dir(app_data_dir())
    }

    pub fn with_base_dir(base: PathBuf) -> Result<Self, JournalError> {
        fs::create_dir_all(&base)?;
        Ok(Self {
            path: base.join(CONFIG_FILE),
        })
    }

    /// Returns the stored configuration, or defaults when none was saved yet.
    pub fn load(&self) -> Result<JournalConfig, JournalError> {
        if !self.path.exists() {
            return Ok(JournalConfig::default());
        }
        let data = fs::read_to_string(&self.path)?;
        let config: JournalConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &JournalConfig) -> Result<(), JournalError> {
        config.validate()?;
        let json = serde_json::to_string_pretty(config)?;
        let tmp = tmp_path(&self.path);
        write_atomic(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

pub(crate) fn write_atomic(path: &Path, data: &str) -> Result<(), JournalError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    Ok(())
}
