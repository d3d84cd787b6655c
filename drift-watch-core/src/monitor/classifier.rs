//! File categorization and weighting based on extensions

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

/// Key in the weight table that sets the fallback weight
pub const DEFAULT_KEY: &str = "default";

/// Weight applied to unknown extensions when the table has no `default` entry
pub const FALLBACK_WEIGHT: f64 = 1.0;

/// Broad file categories, ordered from most to least important
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Documentation, // *.md, *.rst, *.adoc
    Code,          // *.rs, *.py, *.ts, ...
    Configuration, // *.toml, *.yaml, *.json, ...
    Other,         // Everything else
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Documentation => write!(f, "documentation"),
            Self::Code => write!(f, "code"),
            Self::Configuration => write!(f, "configuration"),
            Self::Other => write!(f, "other"),
        }
    }
}

const DOCUMENTATION_EXTENSIONS: &[&str] = &["md", "markdown", "rst", "adoc", "txt", "org"];

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "jsx", "tsx", "go", "java", "kt", "c", "h", "cpp", "hpp", "cs", "rb",
    "swift", "sh", "sql",
];

const CONFIGURATION_EXTENSIONS: &[&str] =
    &["toml", "yaml", "yml", "json", "ini", "cfg", "conf", "env", "xml"];

/// Default numeric importance per extension: documentation highest, then
/// code, then configuration. Anything unlisted falls back to `default`.
fn default_weights() -> BTreeMap<String, f64> {
    let mut weights = BTreeMap::new();
    for ext in DOCUMENTATION_EXTENSIONS {
        weights.insert(ext.to_string(), 20.0);
    }
    // Plain text is closer to notes than curated docs
    weights.insert("txt".to_string(), 10.0);
    for ext in CODE_EXTENSIONS {
        weights.insert(ext.to_string(), 10.0);
    }
    for ext in CONFIGURATION_EXTENSIONS {
        weights.insert(ext.to_string(), 5.0);
    }
    weights.insert(DEFAULT_KEY.to_string(), FALLBACK_WEIGHT);
    weights
}

/// Maps file extensions to a category and a positive weight
#[derive(Debug, Clone)]
pub struct WeightTable {
    weights: HashMap<String, f64>,
    categories: HashMap<&'static str, FileCategory>,
    default_weight: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        // The built-in table is valid by construction
        Self::build(&default_weights())
    }
}

impl WeightTable {
    /// The built-in extension weights, as they appear in configuration
    pub fn default_entries() -> BTreeMap<String, f64> {
        default_weights()
    }

    /// Build a table from configured `extension -> weight` entries.
    ///
    /// Extension keys are case-insensitive and may carry a leading dot.
    /// Every weight must be finite and strictly positive.
    pub fn from_entries(entries: &BTreeMap<String, f64>) -> Result<Self, ConfigError> {
        for (extension, weight) in entries {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(ConfigError::InvalidWeight {
                    extension: extension.clone(),
                    weight: *weight,
                });
            }
        }
        Ok(Self::build(entries))
    }

    fn build(entries: &BTreeMap<String, f64>) -> Self {
        let mut weights = HashMap::new();
        let mut default_weight = FALLBACK_WEIGHT;
        for (extension, weight) in entries {
            let key = extension.trim_start_matches('.').to_lowercase();
            if key == DEFAULT_KEY {
                default_weight = *weight;
            } else {
                weights.insert(key, *weight);
            }
        }

        let mut categories = HashMap::new();
        for (list, category) in [
            (CONFIGURATION_EXTENSIONS, FileCategory::Configuration),
            (CODE_EXTENSIONS, FileCategory::Code),
            (DOCUMENTATION_EXTENSIONS, FileCategory::Documentation),
        ] {
            for ext in list {
                categories.insert(*ext, category);
            }
        }

        Self { weights, categories, default_weight }
    }

    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }

    /// Classify a file by its extension, returning its category and weight
    pub fn classify(&self, path: &Path) -> (FileCategory, f64) {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();

        let category =
            self.categories.get(extension.as_str()).copied().unwrap_or(FileCategory::Other);
        let weight = self.weights.get(&extension).copied().unwrap_or(self.default_weight);

        (category, weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documentation_outweighs_code_and_config() {
        let table = WeightTable::default();

        let (doc_cat, doc_weight) = table.classify(Path::new("docs/guide.md"));
        let (code_cat, code_weight) = table.classify(Path::new("src/main.rs"));
        let (cfg_cat, cfg_weight) = table.classify(Path::new("Cargo.toml"));

        assert_eq!(doc_cat, FileCategory::Documentation);
        assert_eq!(code_cat, FileCategory::Code);
        assert_eq!(cfg_cat, FileCategory::Configuration);
        assert!(doc_weight > code_weight);
        assert!(code_weight > cfg_weight);
    }

    #[test]
    fn test_unknown_extension_uses_default() {
        let table = WeightTable::default();

        assert_eq!(table.classify(Path::new("image.png")), (FileCategory::Other, FALLBACK_WEIGHT));
        assert_eq!(table.classify(Path::new("Makefile")), (FileCategory::Other, FALLBACK_WEIGHT));
    }

    #[test]
    fn test_custom_entries_are_case_insensitive() {
        let mut entries = BTreeMap::new();
        entries.insert(".MD".to_string(), 42.0);
        entries.insert("default".to_string(), 0.5);
        let table = WeightTable::from_entries(&entries).unwrap();

        assert_eq!(table.classify(Path::new("README.md")).1, 42.0);
        assert_eq!(table.classify(Path::new("notes.Md")).1, 42.0);
        assert_eq!(table.classify(Path::new("main.rs")), (FileCategory::Code, 0.5));
    }

    #[test]
    fn test_rejects_non_positive_weight() {
        let mut entries = BTreeMap::new();
        entries.insert("rs".to_string(), 0.0);
        assert!(WeightTable::from_entries(&entries).is_err());

        entries.insert("rs".to_string(), f64::NAN);
        assert!(WeightTable::from_entries(&entries).is_err());
    }
}
