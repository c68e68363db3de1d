//! Configuration file discovery and loading.
//!
//! Search paths may reference environment variables (`$HOME/.config`). A
//! search directory ending in `//` is walked recursively.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::record::Record;

static VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_0-9]+)").expect("valid variable regex"));

/// Replace `$NAME` with the value of environment variable `NAME`. Unset
/// variables expand to the empty string.
pub fn expand(value: &str) -> String {
    expand_with(value, |name| std::env::var(name).ok())
}

/// [`expand`] with an explicit variable lookup.
pub fn expand_with<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    VARIABLE_RE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Split an OS search path (`PATH`-style) into directories.
pub fn split_search_path(paths: &str) -> Vec<String> {
    std::env::split_paths(paths)
        .map(|path| path.to_string_lossy().into_owned())
        .collect()
}

/// What [`find`] looks for inside each search directory.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Every regular file.
    Any,
    /// One exact file name, checked directly without listing.
    Name(String),
    /// File names matching the regex.
    Regex(Regex),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOptions {
    /// Stop after this many results; 0 means unlimited.
    pub max: usize,
    /// Apply [`expand`] to each search directory.
    pub expand: bool,
    /// Include entries whose name starts with `.`.
    pub dotfiles: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            max: 0,
            expand: true,
            dotfiles: false,
        }
    }
}

/// Look for files in `paths`, in order.
///
/// Directories that do not exist are skipped. Listings are sorted by file
/// name. Unreadable directories are logged and skipped.
pub fn find(paths: &[String], pattern: &Pattern, options: &FindOptions) -> Vec<PathBuf> {
    let mut results = Vec::new();
    for raw in paths {
        let dir = if options.expand {
            expand(raw)
        } else {
            raw.clone()
        };
        if !Path::new(&dir).is_dir() {
            debug!(path = %dir, "skipping missing search directory");
            continue;
        }
        match pattern {
            Pattern::Name(name) => {
                let candidate = Path::new(&dir).join(name);
                if candidate.exists() {
                    results.push(candidate);
                }
            }
            Pattern::Any | Pattern::Regex(_) => {
                let recursive = dir.ends_with("//");
                let root = PathBuf::from(dir.trim_end_matches('/'));
                if let Err(err) = list_files(&root, recursive, pattern, options, &mut results) {
                    warn!(path = %root.display(), error = %err, "cannot list search directory");
                }
            }
        }
        if limit_reached(&results, options) {
            results.truncate(options.max);
            break;
        }
    }
    results
}

fn limit_reached(results: &[PathBuf], options: &FindOptions) -> bool {
    options.max > 0 && results.len() >= options.max
}

fn list_files(
    dir: &Path,
    recursive: bool,
    pattern: &Pattern,
    options: &FindOptions,
    results: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("read directory {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("read entry in {}", dir.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !options.dotfiles && name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_file() {
            let matched = match pattern {
                Pattern::Regex(re) => re.is_match(&name),
                Pattern::Any | Pattern::Name(_) => true,
            };
            if matched {
                results.push(path);
            }
        } else if recursive && path.is_dir() {
            list_files(&path, recursive, pattern, options, results)?;
        }
        if limit_reached(results, options) {
            break;
        }
    }
    Ok(())
}

pub fn load_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

pub fn load_json(path: &Path) -> Result<Value> {
    let contents = load_text(path)?;
    serde_json::from_str(&contents).with_context(|| format!("parse json {}", path.display()))
}

pub fn load_toml(path: &Path) -> Result<Value> {
    let contents = load_text(path)?;
    toml::from_str(&contents).with_context(|| format!("parse toml {}", path.display()))
}

/// Load a JSON or TOML file (by extension) whose top level is an object.
pub fn load_record(path: &Path) -> Result<Record> {
    let value = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => load_toml(path)?,
        _ => load_json(path)?,
    };
    match value {
        Value::Object(record) => Ok(record),
        other => Err(anyhow!(
            "{}: expected an object at the top level, got {}",
            path.display(),
            kind(&other)
        )),
    }
}

/// First of `paths` that loads as a record. Failures are logged and skipped.
pub fn load_first_record(paths: &[PathBuf]) -> Option<(PathBuf, Record)> {
    paths.iter().find_map(|path| match load_record(path) {
        Ok(record) => Some((path.clone(), record)),
        Err(err) => {
            warn!(path = %path.display(), error = %format!("{err:#}"), "cannot load record");
            None
        }
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::fixture_dir;

    fn dir_string(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn expand_substitutes_and_blanks_unknown_variables() {
        let lookup = |name: &str| (name == "HOME").then(|| "/home/me".to_string());
        assert_eq!(expand_with("$HOME/.config", lookup), "/home/me/.config");
        assert_eq!(expand_with("$NOPE/x", lookup), "/x");
        assert_eq!(expand_with("plain", lookup), "plain");
    }

    #[test]
    fn find_by_name_checks_each_directory_in_order() {
        let first = fixture_dir(&[("flowkit.toml", "")]);
        let second = fixture_dir(&[("flowkit.toml", ""), ("other.toml", "")]);
        let paths = vec![
            dir_string(first.path()),
            "/definitely/not/here".to_string(),
            dir_string(second.path()),
        ];
        let pattern = Pattern::Name("flowkit.toml".to_string());

        let found = find(&paths, &pattern, &FindOptions::default());
        assert_eq!(
            found,
            vec![first.path().join("flowkit.toml"), second.path().join("flowkit.toml")]
        );

        let options = FindOptions {
            max: 1,
            ..FindOptions::default()
        };
        assert_eq!(find(&paths, &pattern, &options).len(), 1);
    }

    #[test]
    fn find_by_regex_sorts_and_skips_dotfiles() {
        let dir = fixture_dir(&[
            ("b.json", "{}"),
            ("a.json", "{}"),
            (".hidden.json", "{}"),
            ("notes.txt", ""),
            ("sub/c.json", "{}"),
        ]);
        let paths = vec![dir_string(dir.path())];
        let pattern = Pattern::Regex(Regex::new(r"\.json$").expect("regex"));

        let found = find(&paths, &pattern, &FindOptions::default());
        assert_eq!(found, vec![dir.path().join("a.json"), dir.path().join("b.json")]);

        let options = FindOptions {
            dotfiles: true,
            ..FindOptions::default()
        };
        assert_eq!(find(&paths, &pattern, &options).len(), 3);
    }

    #[test]
    fn double_slash_suffix_walks_subdirectories() {
        let dir = fixture_dir(&[("a.json", "{}"), ("sub/c.json", "{}"), ("sub/deeper/d.json", "{}")]);
        let paths = vec![format!("{}//", dir_string(dir.path()))];
        let found = find(&paths, &Pattern::Any, &FindOptions::default());
        assert_eq!(
            found,
            vec![
                dir.path().join("a.json"),
                dir.path().join("sub/c.json"),
                dir.path().join("sub/deeper/d.json"),
            ]
        );
    }

    #[test]
    fn load_record_reads_json_and_toml() {
        let dir = fixture_dir(&[
            ("a.json", r#"{"name": "a", "n": 1}"#),
            ("b.toml", "name = \"b\"\n[inner]\nflag = true\n"),
            ("list.json", "[1, 2]"),
            ("broken.json", "{"),
        ]);
        let a = load_record(&dir.path().join("a.json")).expect("json");
        assert_eq!(Value::Object(a), json!({"name": "a", "n": 1}));
        let b = load_record(&dir.path().join("b.toml")).expect("toml");
        assert_eq!(Value::Object(b), json!({"name": "b", "inner": {"flag": true}}));

        let err = load_record(&dir.path().join("list.json")).expect_err("array");
        assert!(err.to_string().contains("expected an object"));
        assert!(load_record(&dir.path().join("broken.json")).is_err());
        assert!(load_text(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn load_first_record_skips_failures() {
        let dir = fixture_dir(&[("broken.json", "{"), ("good.json", r#"{"ok": true}"#)]);
        let paths = vec![
            dir.path().join("missing.json"),
            dir.path().join("broken.json"),
            dir.path().join("good.json"),
        ];
        let (path, record) = load_first_record(&paths).expect("one loads");
        assert_eq!(path, dir.path().join("good.json"));
        assert_eq!(record.get("ok"), Some(&json!(true)));
    }
}
