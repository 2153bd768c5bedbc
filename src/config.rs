// src/config.rs

use crate::error::{AnalysisError, Result};
use crate::query::Query;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Selects the outermost function declarations.
pub const DEFAULT_SHOTNESS_XPATH_STRUCT: &str = "//*[@roleFunction and @roleDeclaration]";

/// Finds the name of a selected declaration among the node itself and its children.
pub const DEFAULT_SHOTNESS_XPATH_NAME: &str = "/*[@roleFunction and @roleIdentifier and @roleName] | /*/*[@roleFunction and @roleIdentifier and @roleName]";

/// Settings of the file/author coupling analysis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CouplesConfig {
    /// Number of resolved authors; one more slot is reserved for the unmatched author
    pub people_number: usize,
    /// Display name of each resolved author, by index
    pub reversed_people_dict: Vec<String>,
}

/// Settings of the structural hotness analysis
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShotnessConfig {
    /// Selects the entities to track
    pub xpath_struct: String,
    /// Resolves the display name of each selected entity
    pub xpath_name: String,
}

impl Default for ShotnessConfig {
    fn default() -> Self {
        Self {
            xpath_struct: DEFAULT_SHOTNESS_XPATH_STRUCT.to_string(),
            xpath_name: DEFAULT_SHOTNESS_XPATH_NAME.to_string(),
        }
    }
}

impl ShotnessConfig {
    /// Compiles both queries.
    pub fn compile(&self) -> Result<(Query, Query)> {
        let compile = |what: &str, source: &str| {
            Query::parse(source)
                .map_err(|e| AnalysisError::Config(format!("shotness {what} query {source:?}: {e}")))
        };
        Ok((
            compile("structure", &self.xpath_struct)?,
            compile("name", &self.xpath_name)?,
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    /// Path to the developers' signature associations
    pub people_dict: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// Follow only the first parent of merge commits
    pub first_parent: bool,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self { first_parent: true }
    }
}

/// Contents of the optional TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub shotness: ShotnessConfig,
    pub identity: IdentitySection,
    pub history: HistorySection,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| AnalysisError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Everything needed to construct the deployed analyses
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    pub couples: CouplesConfig,
    pub shotness: ShotnessConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_compile() {
        let (structure, name) = ShotnessConfig::default().compile().unwrap();
        assert_eq!(structure.as_str(), DEFAULT_SHOTNESS_XPATH_STRUCT);
        assert_eq!(name.as_str(), DEFAULT_SHOTNESS_XPATH_NAME);
    }

    #[test]
    fn test_invalid_query_is_a_config_error() {
        let config = ShotnessConfig { xpath_struct: "xpath!".to_string(), ..Default::default() };
        assert!(matches!(config.compile(), Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_file_config_partial() {
        let config = FileConfig::from_toml(
            r#"
            [shotness]
            xpath_name = "/*[@roleName]"

            [identity]
            people_dict = "people.txt"
            "#,
        )
        .unwrap();
        assert_eq!(config.shotness.xpath_struct, DEFAULT_SHOTNESS_XPATH_STRUCT);
        assert_eq!(config.shotness.xpath_name, "/*[@roleName]");
        assert_eq!(config.identity.people_dict, Some(PathBuf::from("people.txt")));
        assert!(config.history.first_parent);
    }

    #[test]
    fn test_file_config_empty() {
        assert_eq!(FileConfig::from_toml("").unwrap(), FileConfig::default());
    }
}
