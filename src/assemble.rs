//! Result assembly: raw API records to uniform [`Record`] rows.
//!
//! Each endpoint has a [`Schema`] mapping dot-separated JSON paths to typed
//! columns. The [`Assembler`] applies it and de-duplicates by entity id,
//! keeping the first-seen instance and reporting any [`Conflict`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// One normalized column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Missing or null in the source.
    Null,
    /// Boolean.
    Bool(bool),
    /// Whole number.
    Integer(i64),
    /// Floating point number.
    Number(f64),
    /// Free text.
    Text(String),
    /// RFC 3339 timestamp.
    Timestamp(DateTime<Utc>),
    /// Flattened list of names or ids.
    List(Vec<String>),
}

impl FieldValue {
    /// Text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content, if this is a number or integer.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Timestamp content.
    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Whether the value is absent.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Self::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

/// A normalized result row with a stable identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Entity id, unique within one assembled set.
    pub id: String,
    /// Entity kind, e.g. `finding`.
    pub kind: String,
    /// Columns keyed by name.
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Create an empty record.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a column.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Look up a column.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Look up a text column.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    /// Look up a numeric column.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_f64)
    }
}

/// How to coerce a source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// String; scalars are stringified.
    Text,
    /// Float; numeric strings are parsed.
    Number,
    /// Integer; numeric strings are parsed.
    Integer,
    /// Boolean; `"true"`/`"false"` strings are accepted.
    Bool,
    /// RFC 3339 timestamp; unparseable strings are kept as text.
    Timestamp,
    /// List of strings.
    List,
}

/// One output column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Output name.
    pub name: String,
    /// Dot-separated source path. Arrays along the path are mapped over.
    pub path: String,
    /// Coercion.
    pub kind: ColumnKind,
}

impl Column {
    /// Create a column.
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
        }
    }
}

/// Field mapping for one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Kind stamped on every record.
    pub kind: String,
    /// Path of the entity id.
    pub id_path: String,
    /// Output columns.
    pub columns: Vec<Column>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new(kind: impl Into<String>, id_path: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id_path: id_path.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column.
    #[must_use]
    pub fn column(mut self, name: &str, path: &str, kind: ColumnKind) -> Self {
        self.columns.push(Column::new(name, path, kind));
        self
    }

    /// Findings from `allFindings`.
    pub fn findings() -> Self {
        Self::new("finding", "id")
            .column("title", "title", ColumnKind::Text)
            .column("severity", "severity", ColumnKind::Text)
            .column("risk_score", "riskScore", ColumnKind::Number)
            .column("category", "category", ColumnKind::Text)
            .column("subcategory", "subcategory", ColumnKind::Text)
            .column("status", "currentStatus.status", ColumnKind::Text)
            .column("vuln_id", "vulnIdFromTool", ColumnKind::Text)
            .column("cves", "cves.cveId", ColumnKind::List)
            .column("cwes", "cwes.cweId", ColumnKind::List)
            .column("affects", "affects.name", ColumnKind::List)
            .column("regression", "regression", ColumnKind::Bool)
            .column("origin", "origin", ColumnKind::Text)
            .column("created_at", "createdAt", ColumnKind::Timestamp)
    }

    /// Asset versions from `allAssetVersions`.
    pub fn asset_versions() -> Self {
        Self::new("asset_version", "id")
            .column("name", "name", ColumnKind::Text)
            .column("asset_id", "asset.id", ColumnKind::Text)
            .column("asset_name", "asset.name", ColumnKind::Text)
            .column("group", "asset.group.name", ColumnKind::Text)
            .column("risk_score", "relativeRiskScore", ColumnKind::Number)
            .column("created_by", "createdBy.email", ColumnKind::Text)
            .column("test_statuses", "testStatuses", ColumnKind::List)
            .column("created_at", "createdAt", ColumnKind::Timestamp)
    }

    /// Components from `allSoftwareComponentInstances`.
    pub fn software_components() -> Self {
        Self::new("software_component", "id")
            .column("name", "name", ColumnKind::Text)
            .column("version", "version", ColumnKind::Text)
            .column("type", "type", ColumnKind::Text)
            .column("risk_score", "absoluteRiskScore", ColumnKind::Number)
            .column("licenses", "licenses.name", ColumnKind::List)
            .column("purl", "softwareIdentifiers.purl", ColumnKind::Text)
            .column("status", "currentStatus.status", ColumnKind::Text)
    }

    /// Assets from `allAssets`.
    pub fn assets() -> Self {
        Self::new("asset", "id")
            .column("name", "name", ColumnKind::Text)
            .column("group", "group.name", ColumnKind::Text)
            .column("versions", "versions.name", ColumnKind::List)
            .column("created_by", "createdBy.email", ColumnKind::Text)
            .column("created_at", "createdAt", ColumnKind::Timestamp)
    }

    /// Business units from `allGroups`.
    pub fn business_units() -> Self {
        Self::new("business_unit", "id").column("name", "name", ColumnKind::Text)
    }

    /// Users from `allUsers`.
    pub fn users() -> Self {
        Self::new("user", "id").column("email", "email", ColumnKind::Text)
    }

    /// SBOM search hits from `allSoftwareComponentInstances`.
    pub fn sbom_matches() -> Self {
        Self::new("software_component", "id")
            .column("name", "name", ColumnKind::Text)
            .column("version", "version", ColumnKind::Text)
            .column("asset", "assetVersion.asset.name", ColumnKind::Text)
            .column("asset_version", "assetVersion.name", ColumnKind::Text)
            .column("asset_version_id", "assetVersion.id", ColumnKind::Text)
            .column("original_components", "originalComponents.name", ColumnKind::List)
    }

    /// Projects from the REST `projects` collection.
    pub fn projects() -> Self {
        Self::new("project", "id")
            .column("name", "name", ColumnKind::Text)
            .column("type", "type", ColumnKind::Text)
            .column("default_branch", "defaultBranch.name", ColumnKind::Text)
            .column("created_at", "created", ColumnKind::Timestamp)
    }

    /// Map one raw value, or `None` if it has no usable id.
    pub fn apply(&self, raw: &Value) -> Option<Record> {
        let id = match lookup(raw, &self.id_path) {
            Value::String(s) if !s.is_empty() => s,
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let fields = self
            .columns
            .iter()
            .map(|column| (column.name.clone(), coerce(lookup(raw, &column.path), column.kind)))
            .collect();

        Some(Record {
            id,
            kind: self.kind.clone(),
            fields,
        })
    }
}

/// Resolve a dot path, mapping over arrays found along the way.
fn lookup(value: &Value, path: &str) -> Value {
    let mut current = value.clone();
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(mut map) => map.remove(segment).unwrap_or(Value::Null),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| lookup(item, segment))
                    .filter(|v| !v.is_null())
                    .collect(),
            ),
            _ => Value::Null,
        };
    }
    current
}

fn coerce(value: Value, kind: ColumnKind) -> FieldValue {
    match (kind, value) {
        (_, Value::Null) => FieldValue::Null,
        (ColumnKind::List, Value::Array(items)) => {
            FieldValue::List(items.iter().filter_map(list_item).collect())
        }
        (ColumnKind::List, other) => FieldValue::List(list_item(&other).into_iter().collect()),
        (ColumnKind::Number, Value::Number(n)) => {
            n.as_f64().map_or(FieldValue::Null, FieldValue::Number)
        }
        (ColumnKind::Number, Value::String(s)) => {
            s.trim().parse().map_or(FieldValue::Null, FieldValue::Number)
        }
        (ColumnKind::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map_or(FieldValue::Null, FieldValue::Integer),
        (ColumnKind::Integer, Value::String(s)) => {
            s.trim().parse().map_or(FieldValue::Null, FieldValue::Integer)
        }
        (ColumnKind::Bool, Value::Bool(b)) => FieldValue::Bool(b),
        (ColumnKind::Bool, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            _ => FieldValue::Null,
        },
        (ColumnKind::Timestamp, Value::String(s)) => match DateTime::parse_from_rfc3339(&s) {
            Ok(t) => FieldValue::Timestamp(t.with_timezone(&Utc)),
            Err(_) => FieldValue::Text(s),
        },
        (ColumnKind::Text, Value::String(s)) => FieldValue::Text(s),
        (ColumnKind::Text, Value::Array(items)) => {
            let joined: Vec<String> = items.iter().filter_map(list_item).collect();
            if joined.is_empty() {
                FieldValue::Null
            } else {
                FieldValue::Text(joined.join(", "))
            }
        }
        (ColumnKind::Text | ColumnKind::Timestamp, other) => FieldValue::Text(match other {
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            v => v.to_string(),
        }),
        (_, _) => FieldValue::Null,
    }
}

fn list_item(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map
            .get("name")
            .or_else(|| map.get("id"))
            .and_then(list_item)
            .or_else(|| Some(value.to_string())),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().filter_map(list_item).collect();
            (!inner.is_empty()).then(|| inner.join(", "))
        }
    }
}

/// Column equality for de-duplication; numbers compare by bit pattern so
/// `NaN` equals itself.
fn same_value(a: Option<&FieldValue>, b: Option<&FieldValue>) -> bool {
    match (a, b) {
        (Some(FieldValue::Number(x)), Some(FieldValue::Number(y))) => x.to_bits() == y.to_bits(),
        (a, b) => a == b,
    }
}

/// Two instances of one entity that disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// Entity id.
    pub id: String,
    /// Entity kind.
    pub kind: String,
    /// Columns whose values differ from the first-seen instance.
    pub fields: Vec<String>,
}

/// De-duplicated records plus any integrity warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Assembled {
    /// Records in first-seen order.
    pub records: Vec<Record>,
    /// Conflicting duplicates that were dropped.
    pub conflicts: Vec<Conflict>,
}

/// Accumulates records, keeping the first instance of each id.
#[derive(Debug, Default)]
pub struct Assembler {
    index: HashMap<(String, String), usize>,
    assembled: Assembled,
    skipped: usize,
}

impl Assembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize raw pages with `schema` and de-duplicate.
    pub fn normalize<P, I>(schema: &Schema, raw_pages: P) -> Assembled
    where
        P: IntoIterator<Item = I>,
        I: IntoIterator<Item = Value>,
    {
        let mut assembler = Self::new();
        for page in raw_pages {
            for raw in page {
                assembler.push_raw(schema, &raw);
            }
        }
        assembler.finish()
    }

    /// De-duplicate already normalized records.
    pub fn dedupe<I: IntoIterator<Item = Record>>(records: I) -> Assembled {
        let mut assembler = Self::new();
        for record in records {
            assembler.push(record);
        }
        assembler.finish()
    }

    /// Normalize and add one raw value.
    pub fn push_raw(&mut self, schema: &Schema, raw: &Value) {
        match schema.apply(raw) {
            Some(record) => self.push(record),
            None => {
                self.skipped += 1;
                tracing::warn!(kind = %schema.kind, "record without id skipped");
            }
        }
    }

    /// Add one record; later duplicates are dropped.
    pub fn push(&mut self, record: Record) {
        let key = (record.kind.clone(), record.id.clone());
        match self.index.get(&key) {
            Some(&position) => {
                let first = &self.assembled.records[position];
                let fields: Vec<String> = first
                    .fields
                    .keys()
                    .chain(record.fields.keys())
                    .filter(|name| !same_value(first.fields.get(*name), record.fields.get(*name)))
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                if !fields.is_empty() {
                    tracing::warn!(
                        id = %record.id,
                        kind = %record.kind,
                        fields = ?fields,
                        "conflicting duplicate record, keeping first-seen instance"
                    );
                    self.assembled.conflicts.push(Conflict {
                        id: record.id,
                        kind: record.kind,
                        fields,
                    });
                }
            }
            None => {
                self.index.insert(key, self.assembled.records.len());
                self.assembled.records.push(record);
            }
        }
    }

    /// Records without an id seen so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Number of distinct records so far.
    pub fn len(&self) -> usize {
        self.assembled.records.len()
    }

    /// Whether no records were accepted.
    pub fn is_empty(&self) -> bool {
        self.assembled.records.is_empty()
    }

    /// Finish and return the assembled set.
    pub fn finish(self) -> Assembled {
        self.assembled
    }
}
