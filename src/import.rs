//! Reading script definitions from JSON files for the `add` and `update`
//! commands.
//!
//! Each input may be a file, a directory (walked recursively for `*.json`),
//! or a glob pattern.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Errors locating or reading definition files.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("No definition files match '{0}'")]
    NoMatch(String),
}

/// Expand `inputs` into a sorted, de-duplicated list of JSON files.
pub fn collect_files(inputs: &[String]) -> Result<Vec<PathBuf>, ImportError> {
    let mut files = Vec::new();

    for input in inputs {
        let path = Path::new(input);
        let before = files.len();

        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() && is_json(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.to_path_buf());
        } else {
            let matches = glob::glob(input).map_err(|source| ImportError::Pattern {
                pattern: input.clone(),
                source,
            })?;
            // Unreadable entries are skipped, like a shell glob would.
            files.extend(matches.filter_map(Result::ok).filter(|p| p.is_file()));
        }

        if files.len() == before {
            return Err(ImportError::NoMatch(input.clone()));
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Parse one JSON file into `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ImportError> {
    let data = fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ImportError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NewScript, ScriptUpdate};

    const DEFINITION: &str = r#"{
  "name": "say_hello",
  "script": "say {{text}}",
  "description": "Speak text",
  "args": [
    {"name": "text", "type": "string", "description": "What to say", "required": true}
  ],
  "usage": "say_hello(text=\"hi\")",
  "category": "audio"
}"#;

    #[test]
    fn test_collect_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.json");
        fs::write(&file, DEFINITION).unwrap();

        let files = collect_files(&[file.display().to_string()]).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_collect_directory_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.json"), DEFINITION).unwrap();
        fs::write(dir.path().join("nested/b.json"), DEFINITION).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let files = collect_files(&[dir.path().display().to_string()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_json(f)));
    }

    #[test]
    fn test_collect_glob_pattern() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.json"), DEFINITION).unwrap();
        fs::write(dir.path().join("two.json"), DEFINITION).unwrap();

        let pattern = format!("{}/*.json", dir.path().display());
        let files = collect_files(&[pattern.clone(), pattern]).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_collect_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.json", dir.path().display());
        assert!(matches!(
            collect_files(&[pattern]),
            Err(ImportError::NoMatch(_))
        ));
    }

    #[test]
    fn test_read_new_script() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.json");
        fs::write(&file, DEFINITION).unwrap();

        let script: NewScript = read_json(&file).unwrap();
        assert_eq!(script.name, "say_hello");
        assert_eq!(script.args.len(), 1);
        assert_eq!(script.category.as_deref(), Some("audio"));
    }

    #[test]
    fn test_read_partial_update() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("patch.json");
        fs::write(&file, r#"{"description": "New text"}"#).unwrap();

        let update: ScriptUpdate = read_json(&file).unwrap();
        assert_eq!(update.description.as_deref(), Some("New text"));
        assert!(update.script.is_none());
    }

    #[test]
    fn test_read_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.json");
        fs::write(&file, "{").unwrap();
        let err = read_json::<NewScript>(&file).unwrap_err();
        assert!(err.to_string().starts_with("Invalid JSON in"));
    }
}
