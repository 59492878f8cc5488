use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::EmulatorError;
use crate::protocol::packet::HEADER_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub hello_interval_ms: u64,
    /// How long a neighbor may stay silent before it is declared dead.
    pub hold_down_ms: u64,
    pub lsp_interval_ms: u64,
    /// Hop budget given to every link-state packet this node originates.
    pub lsp_ttl: u32,
    pub recv_buffer_size: usize,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            hello_interval_ms: 1000,
            hold_down_ms: 4000,
            lsp_interval_ms: 5000,
            lsp_ttl: 16,
            recv_buffer_size: 8192,
        }
    }
}

impl EmulatorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EmulatorError> {
        let content = fs::read_to_string(path)?;
        let config: EmulatorConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), EmulatorError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EmulatorError> {
        if self.hello_interval_ms == 0 || self.lsp_interval_ms == 0 {
            return Err(EmulatorError::Config("intervals must be non-zero".to_string()));
        }
        if self.hold_down_ms <= self.hello_interval_ms {
            return Err(EmulatorError::Config(format!(
                "hold-down ({} ms) must be longer than the hello interval ({} ms)",
                self.hold_down_ms, self.hello_interval_ms
            )));
        }
        if self.recv_buffer_size < HEADER_LEN {
            return Err(EmulatorError::Config(format!(
                "receive buffer must hold at least a {}-byte header",
                HEADER_LEN
            )));
        }
        Ok(())
    }

    pub fn hello_interval(&self) -> Duration {
        Duration::from_millis(self.hello_interval_ms)
    }

    pub fn hold_down(&self) -> Duration {
        Duration::from_millis(self.hold_down_ms)
    }

    pub fn lsp_interval(&self) -> Duration {
        Duration::from_millis(self.lsp_interval_ms)
    }
}
