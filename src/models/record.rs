//! Records and the in-memory batch passed between stages

use rustc_hash::FxHashMap;

use super::value::{Value, ValueKind};

/// A column of a clinical batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Kind declared by the input schema or by the stage that added the column
    pub kind: ValueKind,
    /// Time zone of a zoned timestamp column; values are held as UTC instants
    pub timezone: Option<String>,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            timezone: None,
        }
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: Option<String>) -> Self {
        self.timezone = timezone;
        self
    }
}

/// One row: a mapping of field name to tagged value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: FxHashMap<String, Value>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful for fixtures
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    /// Get a field value; missing fields read as null
    #[must_use]
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(name).unwrap_or(&NULL)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.fields.get_mut(name) {
            *slot = value;
        } else {
            self.fields.insert(name.to_string(), value);
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

/// A batch of records with an ordered schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicalBatch {
    columns: Vec<Column>,
    pub records: Vec<Record>,
}

impl ClinicalBatch {
    #[must_use]
    pub fn new(columns: Vec<Column>, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Append a column unless one with that name exists; existing rows read it as null
    pub fn ensure_column(&mut self, name: &str, kind: ValueKind) {
        if !self.has_column(name) {
            self.columns.push(Column::new(name, kind));
        }
    }

    /// Change the declared kind of a column
    pub fn set_column_kind(&mut self, name: &str, kind: ValueKind) {
        if let Some(column) = self.columns.iter_mut().find(|c| c.name == name) {
            column.kind = kind;
        }
    }

    /// Kind to persist for a column: the declared kind widened by every value present
    #[must_use]
    pub fn effective_kind(&self, column: &Column) -> ValueKind {
        self.records
            .iter()
            .filter_map(|r| r.get(&column.name).kind())
            .fold(column.kind, ValueKind::unify)
    }
}
