// Path exclusion rules and dependency-manifest scanning

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Built-in exclusion rules: virtual environments, dependency caches, VCS
/// directories, build outputs, editor metadata and compiled artefacts.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "**/.git/**",
    "**/.svn/**",
    "**/.hg/**",
    "**/node_modules/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/venv/**",
    "**/.tox/**",
    "**/target/**",
    "**/build/**",
    "**/dist/**",
    "**/out/**",
    "**/.idea/**",
    "**/.vscode/**",
    "**/.pytest_cache/**",
    "**/.mypy_cache/**",
    "**/*.egg-info/**",
    "**/coverage/**",
    "**/*.pyc",
    "**/*.pyo",
    "**/*.class",
    "**/*.o",
    "**/*.so",
    "**/*.dylib",
    "**/*.min.js",
    "**/*.log",
    "**/*.tmp",
    "**/*.swp",
    "**/.codectx/**",
];

/// File names recognised as dependency manifests by the dependency scan
pub const DEPENDENCY_MANIFESTS: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.toml",
    "Cargo.lock",
    "requirements.txt",
    "pyproject.toml",
    "poetry.lock",
    "Pipfile",
    "Pipfile.lock",
    "setup.py",
    "go.mod",
    "go.sum",
    "Gemfile",
    "Gemfile.lock",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "composer.json",
    "composer.lock",
];

/// Pattern-based path filter deciding which files enter the pipeline.
///
/// Matching is glob-style with `**` wildcards, anchored at the project root.
/// A path is excluded iff any rule (default or user-supplied) matches.
pub struct ExclusionFilter {
    rules: GlobSet,
}

impl ExclusionFilter {
    /// Build a filter from the default rule set (if enabled) plus user patterns.
    pub fn new(use_defaults: bool, user_patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut pattern_count = 0;

        if use_defaults {
            for pattern in DEFAULT_EXCLUSIONS {
                builder.add(Glob::new(pattern).with_context(|| format!("bad default pattern: {pattern}"))?);
                pattern_count += 1;
            }
        }

        for pattern in user_patterns {
            // Bare directory names are treated as "anywhere in the tree"
            let expanded = expand_user_pattern(pattern);
            match Glob::new(&expanded) {
                Ok(glob) => {
                    builder.add(glob);
                    pattern_count += 1;
                }
                Err(e) => warn!("Ignoring invalid exclusion pattern '{}': {}", pattern, e),
            }
        }

        let rules = builder.build().context("failed to compile exclusion rules")?;
        debug!("Compiled {} exclusion patterns", pattern_count);

        Ok(Self { rules })
    }

    /// Whether a project-relative path is excluded. Pure and deterministic.
    pub fn should_exclude(&self, relative_path: &str) -> bool {
        let normalized = crate::model::normalize_path(relative_path);
        self.rules.is_match(normalized.as_str())
    }
}

/// Make a bare pattern like "generated" or "generated/" match anywhere under
/// the root, while leaving explicit globs untouched.
fn expand_user_pattern(pattern: &str) -> String {
    if pattern.contains('*') || pattern.contains('/') {
        return pattern.trim_end_matches('/').to_string();
    }
    format!("**/{pattern}/**")
}

/// Walk the whole tree, exclusion rules notwithstanding, and yield every
/// recognised dependency-manifest file.
pub fn scan_dependency_files(root: &Path) -> Vec<PathBuf> {
    let mut manifests = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if DEPENDENCY_MANIFESTS.contains(&name.as_ref()) {
            manifests.push(entry.path().to_path_buf());
        }
    }

    manifests.sort();
    manifests
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(user: &[&str]) -> ExclusionFilter {
        let user: Vec<String> = user.iter().map(|s| s.to_string()).collect();
        ExclusionFilter::new(true, &user).unwrap()
    }

    #[test]
    fn test_default_exclusions() {
        let f = filter(&[]);
        assert!(f.should_exclude("node_modules/pkg/index.js"));
        assert!(f.should_exclude("src/node_modules/pkg/index.js"));
        assert!(f.should_exclude(".git/HEAD"));
        assert!(f.should_exclude("app/__pycache__/mod.pyc"));
        assert!(f.should_exclude("target/debug/binary.o"));
        assert!(f.should_exclude(".codectx/structured.db"));

        assert!(!f.should_exclude("src/main.rs"));
        assert!(!f.should_exclude("lib/utils.py"));
        assert!(!f.should_exclude("docs/README.md"));
    }

    #[test]
    fn test_user_patterns() {
        let f = filter(&["generated", "*.snap", "fixtures/**"]);
        assert!(f.should_exclude("generated/api.ts"));
        assert!(f.should_exclude("src/generated/api.ts"));
        assert!(f.should_exclude("tests/output.snap"));
        assert!(f.should_exclude("fixtures/big/blob.bin"));
        assert!(!f.should_exclude("src/generator.ts"));
    }

    #[test]
    fn test_defaults_can_be_disabled() {
        let f = ExclusionFilter::new(false, &[]).unwrap();
        assert!(!f.should_exclude("node_modules/pkg/index.js"));
        assert!(!f.should_exclude(".git/HEAD"));
    }

    #[test]
    fn test_should_exclude_is_stable() {
        let f = filter(&[]);
        for _ in 0..3 {
            assert!(f.should_exclude("node_modules/pkg/index.js"));
            assert!(!f.should_exclude("src/main.rs"));
        }
    }

    #[test]
    fn test_backslash_paths_normalized() {
        let f = filter(&[]);
        assert!(f.should_exclude("node_modules\\pkg\\index.js"));
    }

    #[test]
    fn test_scan_dependency_files_ignores_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("node_modules/pkg/package.json"), "{}").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        std::fs::write(root.join("requirements.txt"), "requests\n").unwrap();
        std::fs::write(root.join("main.py"), "pass\n").unwrap();

        let manifests = scan_dependency_files(root);
        let names: Vec<String> = manifests
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert!(names.contains(&"package.json".to_string()));
        assert!(names.contains(&"requirements.txt".to_string()));
        assert!(!names.contains(&"index.js".to_string()));
        assert!(!names.contains(&"main.py".to_string()));
    }
}
