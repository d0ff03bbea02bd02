// Configuration management for codectx

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory under the project root that holds persisted index state
pub const STATE_DIR: &str = ".codectx";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub indexing: IndexingConfig,
    pub embedding: EmbeddingConfig,
    pub query: QueryConfig,
    pub watcher: WatcherConfig,
    /// Extension (with leading dot) to language tag
    pub extensions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Skip files larger than this many bytes
    pub max_file_size_bytes: u64,
    /// Extra exclusion globs on top of the default set
    pub exclude: Vec<String>,
    /// Toggle the built-in exclusion rule set
    pub default_exclusions: bool,
    /// Scan excluded directories for dependency manifests
    pub dependency_scan: bool,
    /// Language whitelist; empty means every supported language
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Identifier handed to the embedder factory
    pub model_id: String,
    /// Maximum characters per embedding chunk
    pub chunk_size_chars: usize,
    /// Chunks per embedder call
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Default similarity floor for semantic queries
    pub similarity_threshold: f32,
    pub default_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Quiet window before a buffered event flushes
    pub debounce_ms: u64,
    /// Maximum time an event may be held before a forced flush
    pub max_hold_ms: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-project".to_string(),
            root: ".".to_string(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 10 * 1024 * 1024,
            exclude: Vec::new(),
            default_exclusions: true,
            dependency_scan: true,
            languages: Vec::new(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: "local-hash-v1".to_string(),
            chunk_size_chars: 1000,
            batch_size: 32,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            default_limit: 10,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            max_hold_ms: 5000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            indexing: IndexingConfig::default(),
            embedding: EmbeddingConfig::default(),
            query: QueryConfig::default(),
            watcher: WatcherConfig::default(),
            extensions: default_extensions(),
        }
    }
}

fn default_extensions() -> BTreeMap<String, String> {
    let pairs = [
        (".py", "python"),
        (".js", "javascript"),
        (".jsx", "javascript"),
        (".ts", "typescript"),
        (".tsx", "typescript"),
        (".java", "java"),
        (".c", "c"),
        (".h", "c"),
        (".cpp", "cpp"),
        (".cc", "cpp"),
        (".hpp", "cpp"),
        (".cs", "csharp"),
        (".go", "go"),
        (".rs", "rust"),
        (".php", "php"),
        (".rb", "ruby"),
        (".swift", "swift"),
        (".kt", "kotlin"),
        (".scala", "scala"),
        (".sh", "bash"),
        (".sql", "sql"),
        (".html", "html"),
        (".css", "css"),
        (".json", "json"),
        (".yaml", "yaml"),
        (".yml", "yaml"),
        (".toml", "toml"),
        (".xml", "xml"),
        (".md", "markdown"),
        (".markdown", "markdown"),
        (".rst", "rst"),
        (".txt", "text"),
    ];
    pairs
        .iter()
        .map(|(ext, lang)| (ext.to_string(), lang.to_string()))
        .collect()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory.
    /// Looks for .codectx.toml in the project root, falling back to defaults.
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(".codectx.toml");

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::debug!("Could not load config from {}: {}", config_path.display(), e);
                Self::default()
            }
        }
    }

    /// Root directory for persisted index state of a project
    pub fn state_dir(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR)
    }

    /// Path of the structured (SQLite) store for a project
    pub fn structured_db_path(project_root: &Path) -> PathBuf {
        Self::state_dir(project_root).join("structured.db")
    }

    /// Directory of the vector store for a project
    pub fn vector_dir(project_root: &Path) -> PathBuf {
        Self::state_dir(project_root).join("vectors")
    }

    /// Look up the language tag for a file by extension
    pub fn language_for(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        self.extensions
            .get(&format!(".{}", ext.to_lowercase()))
            .map(String::as_str)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.name.is_empty() {
            anyhow::bail!("Project name cannot be empty");
        }
        if self.indexing.max_file_size_bytes == 0 {
            anyhow::bail!("max_file_size_bytes must be greater than 0");
        }
        if self.embedding.chunk_size_chars == 0 {
            anyhow::bail!("chunk_size_chars must be greater than 0");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }
        if self.embedding.model_id.is_empty() {
            anyhow::bail!("embedding model_id cannot be empty");
        }
        if !(0.0..=1.0).contains(&self.query.similarity_threshold) {
            anyhow::bail!(
                "similarity_threshold must be within [0, 1], got {}",
                self.query.similarity_threshold
            );
        }
        if self.query.default_limit == 0 {
            anyhow::bail!("default_limit must be greater than 0");
        }
        if self.watcher.debounce_ms == 0 {
            anyhow::bail!("debounce_ms must be greater than 0");
        }
        if self.watcher.max_hold_ms < self.watcher.debounce_ms {
            anyhow::bail!("max_hold_ms must be at least debounce_ms");
        }
        for ext in self.extensions.keys() {
            if !ext.starts_with('.') {
                anyhow::bail!("Extension '{}' must start with a dot", ext);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.name, "unnamed-project");
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.watcher.debounce_ms, 500);
        assert_eq!(config.extensions.get(".py").unwrap(), "python");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_language_lookup() {
        let config = Config::default();
        assert_eq!(config.language_for(Path::new("src/a.py")), Some("python"));
        assert_eq!(config.language_for(Path::new("README.MD")), Some("markdown"));
        assert_eq!(config.language_for(Path::new("a.xyz")), None);
        assert_eq!(config.language_for(Path::new("Makefile")), None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());
        config.embedding.batch_size = 32;

        config.query.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
        config.query.similarity_threshold = 0.3;

        config.watcher.max_hold_ms = 100;
        assert!(config.validate().is_err());
        config.watcher.max_hold_ms = 5000;

        config.extensions.insert("py".to_string(), "python".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
            [project]
            name = "demo"

            [embedding]
            chunk_size_chars = 512
            batch_size = 8

            [indexing]
            exclude = ["generated/**"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.embedding.chunk_size_chars, 512);
        assert_eq!(config.indexing.exclude, vec!["generated/**".to_string()]);
        // Unset sections fall back to defaults
        assert_eq!(config.watcher.debounce_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_state_paths() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            Config::structured_db_path(root),
            PathBuf::from("/tmp/proj/.codectx/structured.db")
        );
        assert_eq!(Config::vector_dir(root), PathBuf::from("/tmp/proj/.codectx/vectors"));
    }
}
