//! Option resolution - turns a sparse option map into validated worker options.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};
use crate::options::memory::parse_memory_limit;

pub const LIMIT: &str = "limit";
pub const FAILURE_LIMIT: &str = "failure-limit";
pub const MEMORY_LIMIT: &str = "memory-limit";
pub const TIME_LIMIT: &str = "time-limit";
pub const SLEEP: &str = "sleep";
pub const BUS: &str = "bus";
pub const QUEUES: &str = "queues";
pub const NO_RESET: &str = "no-reset";

/// A single raw option value as it appears in a config file or on the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// `~` or a key with no value
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl OptionValue {
    /// Empty values count as "not configured".
    pub fn is_empty(&self) -> bool {
        match self {
            OptionValue::Null => true,
            OptionValue::Bool(b) => !b,
            OptionValue::Text(s) => s.trim().is_empty(),
            OptionValue::List(items) => items.is_empty(),
            OptionValue::Integer(_) | OptionValue::Float(_) => false,
        }
    }

    /// Strictly positive integer, or `None`.
    fn as_positive_integer(&self) -> Option<u64> {
        match self {
            OptionValue::Integer(n) if *n > 0 => Some(*n as u64),
            OptionValue::Float(f) if f.is_finite() && *f >= 1.0 && f.fract() == 0.0 => {
                Some(*f as u64)
            }
            OptionValue::Text(s) => s.trim().parse::<u64>().ok().filter(|n| *n > 0),
            _ => None,
        }
    }

    /// Lenient integer coercion: leading digits of text, truncated floats.
    fn coerce_integer(&self) -> u64 {
        match self {
            OptionValue::Bool(b) => u64::from(*b),
            OptionValue::Integer(n) => (*n).max(0) as u64,
            OptionValue::Float(f) if f.is_finite() && *f > 0.0 => *f as u64,
            OptionValue::Float(_) => 0,
            OptionValue::Text(s) => s
                .trim()
                .chars()
                .map_while(|c| c.to_digit(10))
                .fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(u64::from(d))),
            OptionValue::Null | OptionValue::List(_) => 0,
        }
    }

    fn as_seconds(&self) -> f64 {
        match self {
            OptionValue::Integer(n) => *n as f64,
            OptionValue::Float(f) => *f,
            OptionValue::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            OptionValue::Null | OptionValue::Bool(_) | OptionValue::List(_) => 0.0,
        }
    }

    fn as_list(&self) -> Vec<String> {
        match self {
            OptionValue::List(items) => items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            other => other
                .to_string()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Null => Ok(()),
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Integer(n) => write!(f, "{}", n),
            OptionValue::Float(x) => write!(f, "{}", x),
            OptionValue::Text(s) => write!(f, "{}", s),
            OptionValue::List(items) => write!(f, "{}", items.join(",")),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Integer(i64::from(value))
    }
}

impl From<u64> for OptionValue {
    fn from(value: u64) -> Self {
        OptionValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        OptionValue::List(value)
    }
}

/// Sparse option map keyed by option name. Unknown keys are kept but ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawOptions(BTreeMap<String, OptionValue>);

impl RawOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a configured value. Empty values read as absent.
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key).filter(|v| !v.is_empty())
    }

    /// Overlay `other` on top of `self`, key by key.
    pub fn merge(&mut self, other: RawOptions) {
        self.0.extend(other.0);
    }
}

/// Memory ceiling as configured. The raw text is kept for the banner and the
/// byte count is computed when the stop condition is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLimit {
    raw: String,
}

impl MemoryLimit {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn bytes(&self) -> u64 {
        parse_memory_limit(&self.raw)
    }
}

/// Validated, concrete worker options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerOptions {
    pub limit: Option<u64>,
    pub failure_limit: Option<u64>,
    pub memory_limit: Option<MemoryLimit>,
    pub time_limit: Option<u64>,
    pub sleep: Duration,
    pub bus: Option<String>,
    pub queues: Option<Vec<String>>,
    pub no_reset: bool,
}

/// Resolve raw options into [`WorkerOptions`].
///
/// Only `limit` and `time-limit` are validated here; a present value that is
/// not a positive integer fails with [`WorkerError::InvalidOption`].
pub fn resolve(raw: &RawOptions) -> Result<WorkerOptions> {
    let limit = positive_integer(raw, LIMIT)?;
    let time_limit = positive_integer(raw, TIME_LIMIT)?;

    let failure_limit = raw
        .get(FAILURE_LIMIT)
        .map(OptionValue::coerce_integer)
        .filter(|n| *n > 0);

    let memory_limit = raw.get(MEMORY_LIMIT).map(|v| MemoryLimit::new(v.to_string()));

    let sleep = raw
        .get(SLEEP)
        .map(OptionValue::as_seconds)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(Duration::ZERO);

    let bus = raw.get(BUS).map(|v| v.to_string().trim().to_string());

    let queues = raw
        .get(QUEUES)
        .map(OptionValue::as_list)
        .filter(|q| !q.is_empty());

    let no_reset = raw.get(NO_RESET).is_some();

    Ok(WorkerOptions {
        limit,
        failure_limit,
        memory_limit,
        time_limit,
        sleep,
        bus,
        queues,
        no_reset,
    })
}

fn positive_integer(raw: &RawOptions, key: &str) -> Result<Option<u64>> {
    match raw.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_positive_integer()
            .map(Some)
            .ok_or_else(|| WorkerError::InvalidOption {
                option: key.to_string(),
                value: value.to_string(),
            }),
    }
}
