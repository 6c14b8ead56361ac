//! Engine configuration via `conduit.toml`
//!
//! Process-wide settings that shape descriptor resolution and result
//! mapping. A config is built once at startup, handed to the engine, and
//! never mutated afterwards; in-flight calls only ever read it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::transform::EnumStorage;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "conduit.toml";

/// Engine configuration loaded from `conduit.toml`.
///
/// # Example
///
/// ```toml
/// procedure_prefix = "usp_"
/// view_prefix = "vw_"
/// default_schema = "dbo"
/// discriminator_column = "PersonType"
/// strict_columns = false
/// enum_storage = "value"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Prefix prepended to stored-call contract names.
    #[serde(default = "default_procedure_prefix")]
    pub procedure_prefix: String,
    /// Prefix prepended to view contract names.
    #[serde(default = "default_view_prefix")]
    pub view_prefix: String,
    /// Schema used when a contract does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,
    /// Row column holding the GenSpec discriminator.
    #[serde(default = "default_discriminator_column")]
    pub discriminator_column: String,
    /// Fail calls whose rows carry columns no entity member maps.
    #[serde(default)]
    pub strict_columns: bool,
    /// Enum datasource representation: `"value"` (default) or `"name"`.
    #[serde(default)]
    pub enum_storage: EnumStorage,
}

fn default_procedure_prefix() -> String {
    "usp_".to_string()
}

fn default_view_prefix() -> String {
    "vw_".to_string()
}

fn default_discriminator_column() -> String {
    "Discriminator".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            procedure_prefix: default_procedure_prefix(),
            view_prefix: default_view_prefix(),
            default_schema: None,
            discriminator_column: default_discriminator_column(),
            strict_columns: false,
            enum_storage: EnumStorage::default(),
        }
    }
}

impl EngineConfig {
    /// Check settings serde cannot reject on its own.
    pub fn validate(&self) -> Result<()> {
        if self.discriminator_column.trim().is_empty() {
            return Err(Error::configuration("discriminator_column must not be empty"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Conduit engine configuration
#
# Prefix for stored-call contract names (CreatePerson -> usp_CreatePerson)
procedure_prefix = "usp_"

# Prefix for view contract names (People -> vw_People)
view_prefix = "vw_"

# Schema used when a contract does not declare one
# default_schema = "dbo"

# Column carrying the GenSpec discriminator
discriminator_column = "Discriminator"

# Fail calls when rows carry columns no entity member maps (default: false)
strict_columns = false

# Enum datasource representation: "value" (underlying integer) or "name"
enum_storage = "value"
"#
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            Error::Configuration { reason } => {
                Error::configuration(format!("{}: {reason}", path.display()))
            }
            other => other,
        })?;
        tracing::info!(target: "conduit::config", path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::configuration(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
