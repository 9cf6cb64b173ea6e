//! Engine configuration loaded from TOML.
//!
//! ```toml
//! profile = "structure-content"
//! uids_salt = "v2"
//!
//! [debug]
//! uids = true
//!
//! [macros.CC]
//! params = ["SRC", "OUT", "FLAGS[]"]
//! keywords = ["OUT"]
//!
//! [modifiers]
//! rootrel = 0
//! ```
//!
//! Every field is optional. Declared modifiers extend the built-in set.

mod error;

pub use error::ConfigError;

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{CommandSchema, MacroSignature};
use crate::diagnostics::{DebugContext, DebugSink};
use crate::uid::Profile;

/// Provenance logging toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugToggles {
    /// Log UID updates and dependency folds.
    pub uids: bool,
    /// Log induced-property additions and clears.
    pub properties: bool,
}

impl DebugToggles {
    /// Whether any event family is on.
    #[must_use]
    pub const fn any(self) -> bool {
        self.uids || self.properties
    }
}

/// Declaration of one macro.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacroDecl {
    /// Parameters in order; `NAME[]` marks the trailing variadic one.
    pub params: Vec<String>,
    /// Parameters filled by keyword.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// UID accumulation scheme.
    pub profile: Profile,
    /// Mixed into the structure of every command.
    pub uids_salt: String,
    /// Provenance logging.
    pub debug: DebugToggles,
    /// Macros by name, in declaration order.
    pub macros: IndexMap<String, MacroDecl>,
    /// Extra modifiers with the number of values each takes.
    pub modifiers: IndexMap<String, usize>,
}

impl EngineConfig {
    /// Parse configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }

    /// Read and parse the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is malformed.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!(
            path = %path.display(),
            macros = config.macros.len(),
            modifiers = config.modifiers.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Build the command schema: the default modifiers, then the declared
    /// modifiers, then the declared macros.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] when a declaration is rejected.
    pub fn schema(&self) -> Result<CommandSchema, ConfigError> {
        let mut schema = CommandSchema::default();
        for (name, &values) in &self.modifiers {
            schema
                .add_modifier(name, values)
                .map_err(|source| ConfigError::Schema {
                    name: name.clone(),
                    source,
                })?;
        }
        for (name, decl) in &self.macros {
            MacroSignature::new(&decl.params, &decl.keywords)
                .and_then(|signature| schema.add_macro(name, signature))
                .map_err(|source| ConfigError::Schema {
                    name: name.clone(),
                    source,
                })?;
        }
        Ok(schema)
    }

    /// A debug context writing to `sink` with the configured toggles, or a
    /// disabled one when every toggle is off.
    #[must_use]
    pub fn debug_context(&self, sink: impl DebugSink + Send + Sync + 'static) -> DebugContext {
        if !self.debug.any() {
            return DebugContext::disabled();
        }
        DebugContext::new(sink).with_toggles(self.debug.uids, self.debug.properties)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "tests fail loudly on setup errors")]
    use super::*;
    use crate::command::SchemaError;
    use crate::diagnostics::MemorySink;
    use rstest::rstest;

    #[test]
    fn empty_text_yields_defaults() {
        let config = EngineConfig::from_toml_str("").expect("parse");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.profile, Profile::StructureContent);
        assert!(!config.debug_context(MemorySink::default()).uids_enabled());
    }

    #[test]
    fn full_configuration_builds_schema() {
        let config = EngineConfig::from_toml_str(
            r#"
            profile = "context-includes"
            uids_salt = "v2"

            [debug]
            properties = true

            [macros.CC]
            params = ["SRC", "OUT", "FLAGS[]"]
            keywords = ["OUT"]

            [modifiers]
            rootrel = 0
            "#,
        )
        .expect("parse");
        assert_eq!(config.profile, Profile::ContextIncludes);
        let schema = config.schema().expect("schema");
        let (cc, sig) = schema.macro_signature("CC").expect("declared");
        assert_eq!(cc.arity(), 3);
        assert_eq!(sig.keyword_slot("OUT"), Some(1));
        assert_eq!(schema.modifier("rootrel").map(|f| f.arity()), Some(1));
        let ctx = config.debug_context(MemorySink::default());
        assert!(ctx.properties_enabled());
        assert!(!ctx.uids_enabled());
    }

    #[rstest]
    #[case("profile = \"fastest\"")]
    #[case("unknown = 1")]
    #[case("[macros.CC]\nkeywords = []")]
    fn malformed_configuration_is_rejected(#[case] text: &str) {
        assert!(matches!(
            EngineConfig::from_toml_str(text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn clashing_modifier_is_a_schema_error() {
        let config = EngineConfig::from_toml_str("[modifiers]\npre = 1").expect("parse");
        let err = config.schema().expect_err("duplicate");
        assert!(matches!(
            err,
            ConfigError::Schema {
                source: SchemaError::DuplicateFunction { .. },
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::from_path(Path::new("/nonexistent/buildsig.toml"))
            .expect_err("missing");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
