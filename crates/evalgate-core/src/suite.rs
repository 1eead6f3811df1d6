//! JSONL suite loading.
//!
//! Suite-level defaults come from an optional sidecar file
//! (`<suite file>.config.json`) and from `_suite_config` records inside the
//! stream; both merge top-level keys into the running defaults, in order.
//! Case records overlay `expected` per key, accept the flattened
//! `expected_route` / `expected_tools` / `should_refuse` shorthands, and
//! inherit a fixed set of suite-level fields they do not set themselves.

use crate::model::{Case, PerfGates, SchemaValidationMode};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Suite-level fields a case inherits when it does not set them.
const INHERITED_FIELDS: [&str; 6] = [
    "tools",
    "model",
    "temperature",
    "requires_structured_output",
    "response_schema",
    "perf_gates",
];

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to read suite {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: invalid JSON record: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}:{line}: suite record must be a JSON object")]
    NotAnObject { path: PathBuf, line: usize },
    #[error("{path}:{line}: case is missing a non-empty id")]
    MissingId { path: PathBuf, line: usize },
    #[error("{path}:{line}: duplicate case id `{id}`")]
    DuplicateId {
        path: PathBuf,
        line: usize,
        id: String,
    },
    #[error("invalid sidecar config {path}: {source}")]
    Sidecar {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}:{line}: invalid case: {source}")]
    InvalidCase {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A parsed suite: merged cases plus the suite-level knobs the runner needs.
#[derive(Debug, Clone)]
pub struct Suite {
    pub path: PathBuf,
    pub name: String,
    pub cases: Vec<Case>,
    pub perf_gates: Option<PerfGates>,
}

pub fn load_suite(path: &Path) -> Result<Suite, SuiteError> {
    let mut defaults = load_sidecar_defaults(path)?;
    let file = fs::File::open(path).map_err(|e| SuiteError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let reader = BufReader::new(file);

    let mut cases = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| SuiteError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(trimmed).map_err(|e| SuiteError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            source: e,
        })?;
        let record = match value {
            Value::Object(map) => map,
            _ => {
                return Err(SuiteError::NotAnObject {
                    path: path.to_path_buf(),
                    line: line_no,
                })
            }
        };

        if let Some(Value::Object(config)) = record.get("_suite_config") {
            for (key, val) in config {
                defaults.insert(key.clone(), val.clone());
            }
            debug!("suite defaults updated at {}:{line_no}", path.display());
            continue;
        }

        let merged = merge_case(record, &defaults);
        let id = merged
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            return Err(SuiteError::MissingId {
                path: path.to_path_buf(),
                line: line_no,
            });
        }
        if !seen_ids.insert(id.clone()) {
            return Err(SuiteError::DuplicateId {
                path: path.to_path_buf(),
                line: line_no,
                id,
            });
        }
        let case: Case =
            serde_json::from_value(Value::Object(merged)).map_err(|e| SuiteError::InvalidCase {
                path: path.to_path_buf(),
                line: line_no,
                source: e,
            })?;
        cases.push(case);
    }

    let perf_gates = match defaults.get("perf_gates") {
        Some(value) if !value.is_null() => {
            match serde_json::from_value::<PerfGates>(value.clone()) {
                Ok(gates) => Some(gates),
                Err(err) => {
                    warn!("ignoring malformed perf_gates in {}: {err}", path.display());
                    None
                }
            }
        }
        _ => None,
    };

    Ok(Suite {
        path: path.to_path_buf(),
        name: suite_name(path),
        cases,
        perf_gates,
    })
}

/// File stem, e.g. `suites/smoke.jsonl` -> `smoke`.
pub fn suite_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "suite".to_string())
}

fn load_sidecar_defaults(path: &Path) -> Result<Map<String, Value>, SuiteError> {
    let mut sidecar = path.as_os_str().to_owned();
    sidecar.push(".config.json");
    let sidecar = PathBuf::from(sidecar);
    if !sidecar.exists() {
        return Ok(Map::new());
    }
    let text = fs::read_to_string(&sidecar).map_err(|e| SuiteError::Io {
        path: sidecar.clone(),
        source: e,
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|e| SuiteError::Sidecar {
        path: sidecar.clone(),
        source: e,
    })?;
    match value {
        Value::Object(map) => {
            debug!("loaded suite defaults from {}", sidecar.display());
            Ok(map)
        }
        _ => Ok(Map::new()),
    }
}

fn merge_case(mut record: Map<String, Value>, defaults: &Map<String, Value>) -> Map<String, Value> {
    let mut expected = match defaults.get("expected") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    if let Some(Value::Object(case_expected)) = record.get("expected") {
        for (key, val) in case_expected {
            expected.insert(key.clone(), val.clone());
        }
    }
    for (shorthand, target) in [
        ("expected_route", "route"),
        ("expected_tools", "tools"),
        ("should_refuse", "should_refuse"),
    ] {
        if let Some(val) = record.get(shorthand) {
            if !val.is_null() {
                expected.insert(target.to_string(), val.clone());
            }
        }
    }
    record.insert("expected".to_string(), Value::Object(expected));

    for key in INHERITED_FIELDS {
        let unset = record.get(key).map_or(true, Value::is_null);
        if unset {
            if let Some(val) = defaults.get(key) {
                if !val.is_null() {
                    record.insert(key.to_string(), val.clone());
                }
            }
        }
    }

    let mode = record
        .get("schema_validation_mode")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            defaults
                .get("schema_validation_mode")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .map(SchemaValidationMode::parse)
        .unwrap_or_default();
    let canonical = match mode {
        SchemaValidationMode::Strict => "strict",
        SchemaValidationMode::Off => "off",
    };
    record.insert(
        "schema_validation_mode".to_string(),
        Value::String(canonical.to_string()),
    );
    record
}
