use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::types::Scenario;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed scenario {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported scenario format: {0}")]
    Unsupported(PathBuf),
    #[error("scenario name escapes the scenarios directory: {0}")]
    OutsideRoot(String),
    #[error("bad scenario pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Summary shown in scenario listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioMeta {
    pub id: String,
    pub title: String,
    pub objective: String,
    pub file: String,
}

/// Where `run <file>` gets scenarios from.
pub trait ScenarioSource {
    fn fetch(&self, file: &str) -> Result<Scenario, LoadError>;

    fn catalogue(&self) -> Vec<ScenarioMeta>;
}

/// Scenarios stored as files under one directory.
#[derive(Debug, Clone)]
pub struct ScenarioDir {
    root: PathBuf,
}

impl ScenarioDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ScenarioDir { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ScenarioSource for ScenarioDir {
    fn fetch(&self, file: &str) -> Result<Scenario, LoadError> {
        let relative = Path::new(file);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(LoadError::OutsideRoot(file.to_string()));
        }
        load_scenario(&self.root.join(relative))
    }

    fn catalogue(&self) -> Vec<ScenarioMeta> {
        match list_scenarios(&self.root) {
            Ok(list) => list,
            Err(e) => {
                debug!("scenario listing failed: {}", e);
                Vec::new()
            }
        }
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let malformed = |source| LoadError::Malformed {
        path: path.to_path_buf(),
        source,
    };

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&content).map_err(malformed)
        }
        Some(ext) if ext.eq_ignore_ascii_case("txt") => {
            serde_json::from_value(parse_scenario_text(&content)).map_err(malformed)
        }
        _ => Err(LoadError::Unsupported(path.to_path_buf())),
    }
}

/// Every readable scenario in `dir`, ordered by file name.
pub fn list_scenarios(dir: &Path) -> Result<Vec<ScenarioMeta>, LoadError> {
    let mut paths = Vec::new();
    for ext in ["json", "txt"] {
        let pattern = dir.join(format!("*.{}", ext));
        paths.extend(glob::glob(&pattern.to_string_lossy())?.filter_map(|p| p.ok()));
    }
    paths.sort();

    let mut metas = Vec::new();
    for path in paths {
        let scenario = match load_scenario(&path) {
            Ok(s) => s,
            Err(e) => {
                debug!("skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        metas.push(ScenarioMeta {
            id: scenario.id,
            title: scenario.title,
            objective: scenario.objective,
            file,
        });
    }
    Ok(metas)
}

/// Parse the `dotted.key = value` scenario format into a JSON tree.
///
/// Blank lines and `#` comments are skipped. Hint lists are written with
/// index keys (`hints.global.0`, `hints.global.1`) and become arrays; every
/// other table keeps its keys, numeric or not.
pub fn parse_scenario_text(text: &str) -> Value {
    let mut root = Map::new();
    'lines: for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let parts: Vec<&str> = key.trim().split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            continue;
        };

        let mut slot = &mut root;
        for part in parents {
            let entry = slot
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Some(next) = entry.as_object_mut() else {
                continue 'lines;
            };
            slot = next;
        }
        slot.insert(last.to_string(), Value::String(value.trim().to_string()));
    }

    if let Some(hints) = root.get_mut("hints").and_then(Value::as_object_mut) {
        for list in hints.values_mut() {
            *list = indexed_list(list.take());
        }
    }
    Value::Object(root)
}

/// `{"1": b, "0": a}` → `[a, b]`. Anything else is returned unchanged.
fn indexed_list(value: Value) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    let mut indexed: Vec<(usize, Value)> = Vec::with_capacity(map.len());
    for (k, v) in &map {
        match k.parse::<usize>() {
            Ok(i) => indexed.push((i, v.clone())),
            Err(_) => return Value::Object(map),
        }
    }
    indexed.sort_by_key(|(i, _)| *i);
    Value::Array(indexed.into_iter().map(|(_, v)| v).collect())
}
