//! Column definitions for the generic table.
//!
//! A [`ColumnDefinition`] describes how one field is pulled out of a row,
//! how it is labelled, rendered and filtered. It is generic over the row
//! type, so the same table serves students, staff, transactions or a raw
//! loaded file.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Value produced by an accessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    Empty,
}

impl CellValue {
    pub fn display(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Empty => String::new(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Empty cells and NaN numbers have no sort position and go last.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    fn sort_number(&self) -> Option<f64> {
        self.as_f64().filter(|n| !n.is_nan())
    }

    /// Ordering used for sorting: numbers before text, missing cells last.
    /// Total over all values, NaN included.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        match (self.sort_number(), other.sort_number()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) if !other.is_missing() => Ordering::Less,
            (None, Some(_)) if !self.is_missing() => Ordering::Greater,
            _ => match (self.is_missing(), other.is_missing()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.display().cmp(&other.display()),
            },
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Integer(i)
    }
}

impl From<i32> for CellValue {
    fn from(i: i32) -> Self {
        CellValue::Integer(i64::from(i))
    }
}

impl From<u32> for CellValue {
    fn from(i: u32) -> Self {
        CellValue::Integer(i64::from(i))
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl<V: Into<CellValue>> From<Option<V>> for CellValue {
    fn from(v: Option<V>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// Rows that can be addressed by key path, e.g. records loaded from a file.
pub trait RowFields {
    fn field(&self, key: &str) -> CellValue;
}

type AccessorFn<T> = Arc<dyn Fn(&T) -> CellValue + Send + Sync>;
type CellFn<T> = Arc<dyn Fn(&T, &CellValue) -> String + Send + Sync>;
type LabelFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

pub enum Accessor<T> {
    Function(AccessorFn<T>),
    Key(String, AccessorFn<T>),
}

impl<T> Accessor<T> {
    pub fn function(f: impl Fn(&T) -> CellValue + Send + Sync + 'static) -> Self {
        Accessor::Function(Arc::new(f))
    }

    pub fn value(&self, row: &T) -> CellValue {
        match self {
            Accessor::Function(f) | Accessor::Key(_, f) => f(row),
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Accessor::Function(_) => None,
            Accessor::Key(key, _) => Some(key),
        }
    }
}

impl<T: RowFields + 'static> Accessor<T> {
    pub fn key_path(key: impl Into<String>) -> Self {
        let key = key.into();
        let lookup = key.clone();
        Accessor::Key(key, Arc::new(move |row: &T| row.field(&lookup)))
    }
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        match self {
            Accessor::Function(f) => Accessor::Function(Arc::clone(f)),
            Accessor::Key(k, f) => Accessor::Key(k.clone(), Arc::clone(f)),
        }
    }
}

#[derive(Clone)]
pub enum Header {
    Label(String),
    Render(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Header {
    pub fn text(&self) -> String {
        match self {
            Header::Label(label) => label.clone(),
            Header::Render(render) => render(),
        }
    }
}

impl From<&str> for Header {
    fn from(s: &str) -> Self {
        Header::Label(s.to_string())
    }
}

impl From<String> for Header {
    fn from(s: String) -> Self {
        Header::Label(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterDescriptor {
    Text,
    Select(Vec<SelectOption>),
}

impl FilterDescriptor {
    pub fn select<V: Into<String>>(values: impl IntoIterator<Item = V>) -> Self {
        FilterDescriptor::Select(
            values
                .into_iter()
                .map(|v| {
                    let v = v.into();
                    SelectOption::new(v.clone(), v)
                })
                .collect(),
        )
    }

    pub fn options(&self) -> &[SelectOption] {
        match self {
            FilterDescriptor::Text => &[],
            FilterDescriptor::Select(options) => options,
        }
    }
}

/// An interactive control embedded in a cell, such as a button. Clicks on
/// it stop there and never reach the row.
pub struct CellControl<T> {
    label: LabelFn<T>,
}

impl<T> CellControl<T> {
    pub fn new(label: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        Self {
            label: Arc::new(label),
        }
    }

    pub fn label(&self, row: &T) -> String {
        (self.label)(row)
    }
}

impl<T> Clone for CellControl<T> {
    fn clone(&self) -> Self {
        Self {
            label: Arc::clone(&self.label),
        }
    }
}

pub struct ColumnDefinition<T> {
    pub id: String,
    pub header: Header,
    pub accessor: Accessor<T>,
    pub cell: Option<CellFn<T>>,
    pub filter: Option<FilterDescriptor>,
    pub control: Option<CellControl<T>>,
    pub sortable: bool,
}

impl<T> ColumnDefinition<T> {
    pub fn new(
        id: impl Into<String>,
        header: impl Into<Header>,
        accessor: impl Fn(&T) -> CellValue + Send + Sync + 'static,
    ) -> Self {
        Self::with_accessor(id, header, Accessor::function(accessor))
    }

    pub fn with_accessor(id: impl Into<String>, header: impl Into<Header>, accessor: Accessor<T>) -> Self {
        Self {
            id: id.into(),
            header: header.into(),
            accessor,
            cell: None,
            filter: None,
            control: None,
            sortable: false,
        }
    }

    pub fn cell(mut self, render: impl Fn(&T, &CellValue) -> String + Send + Sync + 'static) -> Self {
        self.cell = Some(Arc::new(render));
        self
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn control(mut self, control: CellControl<T>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn header_text(&self) -> String {
        self.header.text()
    }

    pub fn value(&self, row: &T) -> CellValue {
        self.accessor.value(row)
    }

    /// Display text of the cell: the custom renderer if there is one,
    /// otherwise the raw value.
    pub fn render(&self, row: &T) -> String {
        let value = self.value(row);
        match &self.cell {
            Some(render) => render(row, &value),
            None => value.display(),
        }
    }
}

impl<T: RowFields + 'static> ColumnDefinition<T> {
    pub fn keyed(key: impl Into<String>, header: impl Into<Header>) -> Self {
        let key = key.into();
        Self::with_accessor(key.clone(), header, Accessor::key_path(key))
    }
}

impl<T> Clone for ColumnDefinition<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            header: self.header.clone(),
            accessor: self.accessor.clone(),
            cell: self.cell.clone(),
            filter: self.filter.clone(),
            control: self.control.clone(),
            sortable: self.sortable,
        }
    }
}

impl<T> fmt::Debug for ColumnDefinition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDefinition")
            .field("id", &self.id)
            .field("header", &self.header.text())
            .field("key", &self.accessor.key())
            .field("filter", &self.filter)
            .field("control", &self.control.is_some())
            .field("sortable", &self.sortable)
            .finish()
    }
}

pub fn find_column<'a, T>(columns: &'a [ColumnDefinition<T>], id: &str) -> Option<(usize, &'a ColumnDefinition<T>)> {
    columns.iter().enumerate().find(|(_, c)| c.id == id)
}
