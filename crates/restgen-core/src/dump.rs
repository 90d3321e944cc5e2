//! Interaction dump to JSONL files
//!
//! Writes every executed interaction, nominal and mutated, to one JSONL
//! file per operation.
//!
//! ```text
//! .restgen/dumps/
//! ├── GET__items__id_.jsonl
//! ├── POST__items.jsonl
//! └── index.json
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::report::InteractionRecord;
use crate::sequence::TestInteraction;

/// Summary of a dump operation, written as `index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpIndex {
    /// Total interactions dumped
    pub total: u64,
    /// Per-operation file listing
    pub operations: Vec<DumpOperationEntry>,
    /// Directory where files were written
    pub dump_dir: PathBuf,
}

/// An entry in the dump index for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpOperationEntry {
    /// Operation label, e.g. "POST /api/users"
    pub operation: String,
    /// Filename within dump directory
    pub file: String,
    /// Number of interactions in this file
    pub count: u64,
}

/// Write all interactions to per-operation JSONL files.
///
/// Sensitive headers and cookies are masked when `mask_headers` is set.
///
/// # Errors
///
/// Returns error if dump directory cannot be created or files cannot be written.
pub fn write_dump(
    interactions: &[TestInteraction],
    dump_dir: &Path,
    mask_headers: bool,
) -> Result<DumpIndex, DumpError> {
    std::fs::create_dir_all(dump_dir)
        .map_err(|e| DumpError::Io(format!("create {}: {e}", dump_dir.display())))?;

    // BTreeMap keeps the index sorted by operation
    let mut groups: BTreeMap<&str, Vec<&TestInteraction>> = BTreeMap::new();
    for interaction in interactions {
        groups.entry(interaction.label()).or_default().push(interaction);
    }

    let mut entries = Vec::new();
    let mut total: u64 = 0;

    for (operation, interactions) in groups {
        let filename = sanitize_filename(operation);
        let filepath = dump_dir.join(&filename);

        let file = std::fs::File::create(&filepath)
            .map_err(|e| DumpError::Io(format!("create {}: {e}", filepath.display())))?;
        let mut writer = std::io::BufWriter::new(file);

        let count = interactions.len() as u64;
        total += count;

        for interaction in interactions {
            let record = InteractionRecord::capture(interaction, mask_headers);
            let line =
                serde_json::to_string(&record).map_err(|e| DumpError::Serialize(e.to_string()))?;
            writeln!(writer, "{line}")
                .map_err(|e| DumpError::Io(format!("write {}: {e}", filepath.display())))?;
        }

        writer
            .flush()
            .map_err(|e| DumpError::Io(format!("flush {}: {e}", filepath.display())))?;

        entries.push(DumpOperationEntry {
            operation: operation.to_string(),
            file: filename,
            count,
        });
    }

    let index = DumpIndex {
        total,
        operations: entries,
        dump_dir: dump_dir.to_path_buf(),
    };

    let index_path = dump_dir.join("index.json");
    let index_json =
        serde_json::to_string_pretty(&index).map_err(|e| DumpError::Serialize(e.to_string()))?;
    std::fs::write(&index_path, index_json)
        .map_err(|e| DumpError::Io(format!("write {}: {e}", index_path.display())))?;

    Ok(index)
}

/// Maximum characters kept from the operation label in the filename.
/// Prevents PATH_MAX issues on macOS (1024) and Linux (4096).
const MAX_FILENAME_LEN: usize = 200;

/// Convert an operation label to a safe filename.
///
/// "POST /api/v2/users/{id}" → "POST_api_v2_users_id.jsonl"
fn sanitize_filename(operation: &str) -> String {
    let sanitized: String = operation
        .chars()
        .take(MAX_FILENAME_LEN)
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' => c,
            _ => '_',
        })
        .collect();
    format!("{sanitized}.jsonl")
}

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Location;
    use crate::operation::{HttpMethod, Operation, OperationSpec, ParameterSpec};
    use serde_json::json;
    use std::sync::Arc;

    fn interaction(method: HttpMethod, path: &str) -> TestInteraction {
        let mut spec = OperationSpec::new(method, path);
        spec.parameters.push(ParameterSpec {
            name: "Authorization".into(),
            location: Location::Header,
            style: None,
            explode: None,
            required: true,
            schema: json!({"type": "string"}),
        });
        spec.parameters.push(ParameterSpec {
            name: "X-Request-Id".into(),
            location: Location::Header,
            style: None,
            explode: None,
            required: true,
            schema: json!({"type": "string"}),
        });
        let op = Arc::new(Operation::from_spec(spec));
        let mut instance = op.instantiate();
        let params = instance.parameters().to_vec();
        instance.arena_mut().set_value(params[0], json!("Bearer secret-token")).unwrap();
        instance.arena_mut().set_value(params[1], json!("r-1")).unwrap();
        TestInteraction::new(instance)
    }

    fn header<'a>(record: &'a InteractionRecord, name: &str) -> &'a str {
        record
            .request
            .headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn sanitize_simple() {
        assert_eq!(sanitize_filename("GET /health"), "GET__health.jsonl");
    }

    #[test]
    fn sanitize_complex_path() {
        assert_eq!(
            sanitize_filename("POST /api/v2/users/{id}"),
            "POST__api_v2_users__id_.jsonl"
        );
    }

    #[test]
    fn write_dump_groups_by_operation() {
        let dir = tempfile::tempdir().unwrap();
        let interactions = vec![
            interaction(HttpMethod::Post, "/users"),
            interaction(HttpMethod::Post, "/users").mutant(),
            interaction(HttpMethod::Get, "/health"),
        ];

        let index = write_dump(&interactions, dir.path(), true).unwrap();

        assert_eq!(index.total, 3);
        assert_eq!(index.operations.len(), 2);
        assert_eq!(index.operations[0].operation, "GET /health");
        assert_eq!(index.operations[0].count, 1);
        assert_eq!(index.operations[1].operation, "POST /users");
        assert_eq!(index.operations[1].count, 2);

        for entry in &index.operations {
            let content = std::fs::read_to_string(dir.path().join(&entry.file)).unwrap();
            let lines: Vec<_> = content.lines().collect();
            assert_eq!(lines.len() as u64, entry.count, "{}", entry.file);
            for line in lines {
                let _: InteractionRecord = serde_json::from_str(line).unwrap();
            }
        }

        let parsed: DumpIndex =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("index.json")).unwrap())
                .unwrap();
        assert_eq!(parsed.total, 3);
    }

    #[test]
    fn write_dump_masks_authorization() {
        let dir = tempfile::tempdir().unwrap();
        write_dump(&[interaction(HttpMethod::Post, "/test")], dir.path(), true).unwrap();

        let content = std::fs::read_to_string(dir.path().join("POST__test.jsonl")).unwrap();
        let record: InteractionRecord = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(header(&record, "Authorization"), "***");
        assert_eq!(header(&record, "X-Request-Id"), "r-1");
    }

    #[test]
    fn no_mask_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let index = write_dump(&[interaction(HttpMethod::Post, "/test")], dir.path(), false).unwrap();
        let content = std::fs::read_to_string(dir.path().join(&index.operations[0].file)).unwrap();
        let record: InteractionRecord = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(header(&record, "Authorization"), "Bearer secret-token");
    }

    #[test]
    fn write_dump_empty_interactions() {
        let dir = tempfile::tempdir().unwrap();
        let index = write_dump(&[], dir.path(), true).unwrap();
        assert_eq!(index.total, 0);
        assert!(index.operations.is_empty());
        assert!(dir.path().join("index.json").exists());
    }
}
