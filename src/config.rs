use easy_error::{Error, ResultExt, bail};
use serde::{Deserialize, Serialize};

use crate::error::LoopbackError;
use crate::io::DEFAULT_QUOTA;

/// What a bounded channel does when a write takes the backlog over quota.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Park the writer until a reader drains the backlog.
    #[default]
    Block,
    /// Discard the excess bytes. Not implemented.
    Drop,
    /// Fail the write. Not implemented.
    Error,
}

impl OverflowPolicy {
    pub fn ensure_supported(self) -> Result<(), LoopbackError> {
        match self {
            Self::Block => Ok(()),
            other => Err(LoopbackError::NotImplemented(format!(
                "overflow policy {:?}",
                other
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoopbackConfig {
    #[serde(default = "default_quota")]
    pub quota: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

fn default_quota() -> usize {
    DEFAULT_QUOTA
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            quota: DEFAULT_QUOTA,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl LoopbackConfig {
    pub fn load(path: &str) -> Result<Self, Error> {
        let s = std::fs::read(path).context("read file")?;
        let s = String::from_utf8(s).context("parse utf8")?;
        Self::from_yaml(&s)
    }

    pub fn from_yaml(s: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml_ng::from_str(s).context("parse yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.quota == 0 {
            bail!("quota must be greater than zero");
        }
        Ok(())
    }

    /// Check that a channel can be built from this config. A zero quota
    /// would park every non-empty write with no way to release it.
    pub fn ensure_supported(&self) -> Result<(), LoopbackError> {
        if self.quota == 0 {
            return Err(LoopbackError::NotImplemented("quota 0".into()));
        }
        self.overflow.ensure_supported()
    }
}
