//! Field catalogue: which stats fields a recorder reads and how it stores them.
//!
//! A [`Field`] is declared once with its [`FieldKind`]; the store operation
//! follows from the kind, never from the runtime type of the value. A field
//! missing from a stats document is skipped, never defaulted.

use serde_json::{Map, Value};

use crate::error::Result;
use crate::sink::{MetaData, MetricsSink, Reading};

/// How a field is written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Count { unit: Option<&'static str> },
    Value { unit: Option<&'static str> },
}

impl FieldKind {
    pub fn unit(&self) -> Option<&'static str> {
        match *self {
            Self::Count { unit } | Self::Value { unit } => unit,
        }
    }

    /// Kind of a stats key judged by its suffix.
    ///
    /// `*_in_bytes` are byte values, `*_in_millis` millisecond values, every
    /// other numeric key a count.
    pub fn from_key(key: &str) -> Self {
        if key.ends_with("_in_bytes") {
            Self::Value { unit: Some("byte") }
        } else if key.ends_with("_in_millis") {
            Self::Value { unit: Some("ms") }
        } else {
            Self::Count { unit: None }
        }
    }

    /// Convert a JSON value into a reading of this kind.
    ///
    /// Non-numeric values (strings, booleans, objects) yield `None`.
    pub fn reading(&self, value: &Value) -> Option<Reading> {
        match self {
            Self::Count { .. } => as_count(value).map(Reading::Count),
            Self::Value { .. } => value.as_f64().map(Reading::Value),
        }
    }
}

fn as_count(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    if let Some(u) = value.as_u64() {
        return Some(i64::try_from(u).unwrap_or(i64::MAX));
    }
    value.as_f64().map(|f| f as i64)
}

/// A stats field at a dotted path inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub path: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn count(path: &'static str) -> Self {
        Self {
            path,
            kind: FieldKind::Count { unit: None },
        }
    }

    /// A count carrying a unit, e.g. a cumulative time in `ms`.
    pub const fn count_in(path: &'static str, unit: &'static str) -> Self {
        Self {
            path,
            kind: FieldKind::Count { unit: Some(unit) },
        }
    }

    pub const fn value(path: &'static str, unit: &'static str) -> Self {
        Self {
            path,
            kind: FieldKind::Value { unit: Some(unit) },
        }
    }

    /// Metric name: `prefix` followed by the path with dots as underscores.
    pub fn metric_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.path.replace('.', "_"))
    }

    /// Read this field from `doc`, or `None` when it is absent.
    pub fn read(&self, doc: &Value) -> Option<Reading> {
        lookup(doc, self.path).and_then(|v| self.kind.reading(v))
    }
}

/// Follow a dotted path through nested objects.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |current, segment| current.as_object()?.get(segment))
}

/// Where a metric is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Node(&'a str),
    Cluster,
}

/// Write one reading to `target`.
pub fn write_reading(
    sink: &dyn MetricsSink,
    target: Target<'_>,
    name: &str,
    reading: Reading,
    unit: Option<&str>,
    meta: MetaData,
) -> Result<()> {
    match target {
        Target::Node(node) => sink.put_node(node, name, reading, unit, meta),
        Target::Cluster => sink.put_cluster(name, reading, unit, meta),
    }
}

/// Write every present field of `doc`. Returns the number of writes.
pub fn write_fields(
    sink: &dyn MetricsSink,
    target: Target<'_>,
    prefix: &str,
    fields: &[Field],
    doc: &Value,
    meta: &MetaData,
) -> Result<usize> {
    let mut written = 0;
    for field in fields {
        if let Some(reading) = field.read(doc) {
            write_reading(
                sink,
                target,
                &field.metric_name(prefix),
                reading,
                field.kind.unit(),
                meta.clone(),
            )?;
            written += 1;
        }
    }
    Ok(written)
}

/// Write every numeric leaf of `object`, naming it by its key path joined
/// with underscores after `prefix`.
///
/// Kinds come from [`FieldKind::from_key`], except that fractional numbers
/// are always unitless values. Booleans and strings are skipped. With
/// `recursive` unset only the top level is written.
pub fn write_flattened(
    sink: &dyn MetricsSink,
    target: Target<'_>,
    prefix: &str,
    object: &Map<String, Value>,
    recursive: bool,
) -> Result<usize> {
    let mut written = 0;
    for (key, value) in object {
        let name = format!("{prefix}{key}");
        match value {
            Value::Object(nested) if recursive => {
                written += write_flattened(sink, target, &format!("{name}_"), nested, true)?;
            }
            Value::Number(n) => {
                let kind = if n.is_f64() {
                    FieldKind::Value { unit: None }
                } else {
                    FieldKind::from_key(key)
                };
                if let Some(reading) = kind.reading(value) {
                    write_reading(sink, target, &name, reading, kind.unit(), MetaData::new())?;
                    written += 1;
                }
            }
            _ => {}
        }
    }
    Ok(written)
}
