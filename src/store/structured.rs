// Structured index: relational element store on SQLite

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row, ToSql};
use tracing::{debug, info};

use super::schema::init_schema;
use crate::error::{IndexError, Result};
use crate::model::{Element, ElementKind, ProjectManifest};

/// Type alias for the connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Filters applied to a structural search
#[derive(Debug, Clone, Default)]
pub struct StructuralFilters {
    pub kind: Option<ElementKind>,
    pub language: Option<String>,
    pub file: Option<String>,
}

/// Aggregate statistics over the structured store
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStatistics {
    pub total_elements: u64,
    pub file_count: u64,
    pub by_kind: HashMap<String, u64>,
    pub by_language: HashMap<String, u64>,
}

/// Relational store of element metadata, keyed by element id and indexed by
/// file path, kind, name and language.
#[derive(Clone)]
pub struct StructuredIndex {
    pool: ConnectionPool,
    db_path: PathBuf,
}

impl StructuredIndex {
    /// Create or open a database at the given path
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening structured index at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
        }

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| IndexError::Store(e.to_string()))?;

        {
            let conn = pool.get()?;
            init_schema(&conn)?;
        }

        Ok(Self { pool, db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Replace every element of one file atomically: old rows with that
    /// file_path are removed and the fresh set inserted within a single
    /// transaction. Readers see either the old or the new set.
    pub fn replace_file(&self, file_path: &str, elements: &[Element]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM elements WHERE file_path = ?1", [file_path])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO elements (
                    id, kind, name, file_path, start_line, end_line, content, language,
                    parent_id, children_ids, signature, docstring, dependencies, metadata
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            for element in elements {
                stmt.execute(params![
                    element.id,
                    element.kind.as_str(),
                    element.name,
                    element.file_path,
                    element.start_line as i64,
                    element.end_line as i64,
                    element.content,
                    element.language,
                    element.parent_id,
                    serde_json::to_string(&element.children_ids)?,
                    element.signature,
                    element.docstring,
                    serde_json::to_string(&element.dependencies)?,
                    element.metadata.to_string(),
                ])?;
            }
        }

        tx.commit()?;
        debug!("Replaced {} with {} elements", file_path, elements.len());
        Ok(())
    }

    /// Remove all elements of a file atomically
    pub fn delete_by_file(&self, file_path: &str) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM elements WHERE file_path = ?1", [file_path])?;
        Ok(removed)
    }

    /// Get an element by id
    pub fn get_by_id(&self, id: &str) -> Result<Option<Element>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
        let element = stmt.query_row([id], row_to_element).optional()?;
        Ok(element)
    }

    /// All elements of a file, ordered by start line
    pub fn get_by_file(&self, file_path: &str) -> Result<Vec<Element>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("{SELECT_COLUMNS} WHERE file_path = ?1 ORDER BY start_line"))?;
        let elements = stmt
            .query_map([file_path], row_to_element)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(elements)
    }

    /// Direct children of an element, ordered by start line
    pub fn get_children(&self, id: &str) -> Result<Vec<Element>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("{SELECT_COLUMNS} WHERE parent_id = ?1 ORDER BY start_line"))?;
        let elements = stmt
            .query_map([id], row_to_element)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(elements)
    }

    /// Search element names. Patterns containing `*` or `?` match glob-style
    /// (case-sensitive), anything else matches as a substring. Results are
    /// ordered by `(file_path, start_line)`.
    pub fn search_structural(
        &self,
        pattern: &str,
        filters: &StructuralFilters,
        limit: usize,
    ) -> Result<Vec<Element>> {
        let conn = self.conn()?;

        let mut sql = String::from(SELECT_COLUMNS);
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if pattern.contains('*') || pattern.contains('?') {
            clauses.push(format!("name GLOB ?{}", args.len() + 1));
            args.push(Box::new(pattern.to_string()));
        } else if !pattern.is_empty() {
            clauses.push(format!("name LIKE ?{}", args.len() + 1));
            args.push(Box::new(format!("%{pattern}%")));
        }

        if let Some(kind) = filters.kind {
            clauses.push(format!("kind = ?{}", args.len() + 1));
            args.push(Box::new(kind.as_str().to_string()));
        }
        if let Some(language) = &filters.language {
            clauses.push(format!("language = ?{}", args.len() + 1));
            args.push(Box::new(language.clone()));
        }
        if let Some(file) = &filters.file {
            clauses.push(format!("file_path LIKE ?{}", args.len() + 1));
            args.push(Box::new(format!("{file}%")));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY file_path, start_line LIMIT ?{}", args.len() + 1));
        args.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let elements = stmt
            .query_map(params.as_slice(), row_to_element)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(elements)
    }

    /// Elements of a given kind across the project
    pub fn get_by_kind(&self, kind: ElementKind) -> Result<Vec<Element>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE kind = ?1 ORDER BY file_path, start_line"
        ))?;
        let elements = stmt
            .query_map([kind.as_str()], row_to_element)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(elements)
    }

    /// Import/export elements whose dependency set mentions any of the given
    /// symbols, excluding matches inside `exclude_file`.
    pub fn find_elements_depending_on(
        &self,
        symbols: &[String],
        exclude_file: &str,
    ) -> Result<Vec<Element>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE kind IN ('import', 'export')
             AND file_path != ?1 AND dependencies LIKE ?2
             ORDER BY file_path, start_line"
        ))?;

        let mut results: Vec<Element> = Vec::new();
        for symbol in symbols {
            // dependencies is a JSON array; match the quoted entry
            let needle = format!("%\"{symbol}\"%");
            let elements = stmt
                .query_map(params![exclude_file, needle], row_to_element)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for element in elements {
                if !results.iter().any(|e| e.id == element.id) {
                    results.push(element);
                }
            }
        }
        Ok(results)
    }

    /// Per-file element counts grouped by kind
    pub fn file_kind_counts(&self) -> Result<Vec<(String, String, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_path, kind, COUNT(*) FROM elements
             GROUP BY file_path, kind ORDER BY file_path",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? as u64,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Aggregate statistics: element count plus histograms by kind and language
    pub fn statistics(&self) -> Result<IndexStatistics> {
        let conn = self.conn()?;

        let total_elements: i64 =
            conn.query_row("SELECT COUNT(*) FROM elements", [], |row| row.get(0))?;
        let file_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT file_path) FROM elements",
            [],
            |row| row.get(0),
        )?;

        let mut by_kind = HashMap::new();
        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM elements GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (kind, count) = row?;
            by_kind.insert(kind, count);
        }

        let mut by_language = HashMap::new();
        let mut stmt = conn.prepare("SELECT language, COUNT(*) FROM elements GROUP BY language")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (language, count) = row?;
            by_language.insert(language, count);
        }

        Ok(IndexStatistics {
            total_elements: total_elements as u64,
            file_count: file_count as u64,
            by_kind,
            by_language,
        })
    }

    /// Persist the project manifest (single row, replaced in place)
    pub fn save_manifest(&self, manifest: &ProjectManifest) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO manifest (
                id, root_path, created_at, last_updated, total_elements, file_count, languages
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                manifest.root_path,
                manifest.created_at.to_rfc3339(),
                manifest.last_updated.to_rfc3339(),
                manifest.total_elements as i64,
                manifest.file_count as i64,
                serde_json::to_string(&manifest.languages)?,
            ],
        )?;
        Ok(())
    }

    pub fn load_manifest(&self) -> Result<Option<ProjectManifest>> {
        let conn = self.conn()?;
        let manifest = conn
            .query_row(
                "SELECT root_path, created_at, last_updated, total_elements, file_count, languages
                 FROM manifest WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((root_path, created_at, last_updated, total_elements, file_count, languages)) =
            manifest
        else {
            return Ok(None);
        };

        let parse_time = |s: &str| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&chrono::Utc))
                .map_err(|e| IndexError::Store(format!("bad manifest timestamp: {e}")))
        };

        Ok(Some(ProjectManifest {
            root_path,
            created_at: parse_time(&created_at)?,
            last_updated: parse_time(&last_updated)?,
            total_elements: total_elements as u64,
            file_count: file_count as u64,
            languages: serde_json::from_str(&languages)?,
        }))
    }

    /// Remove every element and the manifest
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM elements", [])?;
        conn.execute("DELETE FROM manifest", [])?;
        Ok(())
    }
}

const SELECT_COLUMNS: &str = "SELECT id, kind, name, file_path, start_line, end_line, content,
    language, parent_id, children_ids, signature, docstring, dependencies, metadata FROM elements";

fn row_to_element(row: &Row) -> rusqlite::Result<Element> {
    let kind_str: String = row.get(1)?;
    let children_json: String = row.get(9)?;
    let dependencies_json: String = row.get(12)?;
    let metadata_json: String = row.get(13)?;

    Ok(Element {
        id: row.get(0)?,
        kind: ElementKind::from_str(&kind_str)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(e.into()))?,
        name: row.get(2)?,
        file_path: row.get(3)?,
        start_line: row.get::<_, i64>(4)? as u32,
        end_line: row.get::<_, i64>(5)? as u32,
        content: row.get(6)?,
        language: row.get(7)?,
        parent_id: row.get(8)?,
        children_ids: serde_json::from_str(&children_json).unwrap_or_default(),
        signature: row.get(10)?,
        docstring: row.get(11)?,
        dependencies: serde_json::from_str(&dependencies_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json)
            .unwrap_or_else(|_| serde_json::json!({})),
    })
}
