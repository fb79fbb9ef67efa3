//! Per column filtering.
//!
//! Text filters match a case insensitive substring of the rendered value,
//! select filters match an option value exactly. Active filters are
//! combined with AND.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::trace;

use crate::column::{CellValue, ColumnDefinition, FilterDescriptor, SelectOption, find_column};
use crate::domain::TableError;

/// Active filter value per column id. A missing entry means no filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    values: BTreeMap<String, String>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value for a column. An empty value removes the filter.
    pub fn set(&mut self, column_id: impl Into<String>, value: impl Into<String>) {
        let column_id = column_id.into();
        let value = value.into();
        if value.is_empty() {
            self.values.remove(&column_id);
        } else {
            self.values.insert(column_id, value);
        }
    }

    pub fn with(mut self, column_id: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column_id, value);
        self
    }

    pub fn remove(&mut self, column_id: &str) -> Option<String> {
        self.values.remove(column_id)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn get(&self, column_id: &str) -> Option<&str> {
        self.values.get(column_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Descriptors supplied by the caller for individual columns. They take
/// precedence over the column's own descriptor.
pub type FilterableColumns = HashMap<String, FilterDescriptor>;

pub fn descriptor_for<'a, T>(
    column: &'a ColumnDefinition<T>,
    filterable: Option<&'a FilterableColumns>,
) -> Option<&'a FilterDescriptor> {
    filterable
        .and_then(|f| f.get(&column.id))
        .or(column.filter.as_ref())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Matcher {
    Contains(String),
    Equals(String),
}

impl Matcher {
    fn new(descriptor: Option<&FilterDescriptor>, value: &str) -> Self {
        match descriptor {
            Some(FilterDescriptor::Select(_)) => Matcher::Equals(value.to_string()),
            Some(FilterDescriptor::Text) | None => Matcher::Contains(value.to_lowercase()),
        }
    }

    fn matches(&self, value: &CellValue) -> bool {
        match self {
            Matcher::Contains(needle) => value.display().to_lowercase().contains(needle.as_str()),
            Matcher::Equals(expected) => value.display() == *expected,
        }
    }
}

struct ActiveFilter<'a, T> {
    column: &'a ColumnDefinition<T>,
    matcher: Matcher,
}

fn active_filters<'a, T>(
    columns: &'a [ColumnDefinition<T>],
    filters: &FilterState,
    filterable: Option<&'a FilterableColumns>,
) -> Result<Vec<ActiveFilter<'a, T>>, TableError> {
    filters
        .iter()
        .map(|(id, value)| {
            let (_, column) =
                find_column(columns, id).ok_or_else(|| TableError::UnknownColumn(id.to_string()))?;
            Ok(ActiveFilter {
                column,
                matcher: Matcher::new(descriptor_for(column, filterable), value),
            })
        })
        .collect()
}

pub fn row_matches<T>(
    row: &T,
    columns: &[ColumnDefinition<T>],
    filters: &FilterState,
    filterable: Option<&FilterableColumns>,
) -> Result<bool, TableError> {
    let active = active_filters(columns, filters, filterable)?;
    Ok(active.iter().all(|f| f.matcher.matches(&f.column.value(row))))
}

/// Indices of the rows passing every active filter, in their original order.
pub fn filter_indices<T: Sync>(
    rows: &[T],
    columns: &[ColumnDefinition<T>],
    filters: &FilterState,
    filterable: Option<&FilterableColumns>,
) -> Result<Vec<usize>, TableError> {
    let active = active_filters(columns, filters, filterable)?;
    if active.is_empty() {
        return Ok((0..rows.len()).collect());
    }

    let matches: Vec<usize> = rows
        .par_iter()
        .enumerate()
        .filter(|(_, row)| active.iter().all(|f| f.matcher.matches(&f.column.value(row))))
        .map(|(idx, _)| idx)
        .collect();
    trace!("Filter {:?} kept {}/{} rows", filters, matches.len(), rows.len());
    Ok(matches)
}

pub fn filter_rows<'a, T: Sync>(
    rows: &'a [T],
    columns: &[ColumnDefinition<T>],
    filters: &FilterState,
    filterable: Option<&FilterableColumns>,
) -> Result<Vec<&'a T>, TableError> {
    Ok(filter_indices(rows, columns, filters, filterable)?
        .into_iter()
        .map(|idx| &rows[idx])
        .collect())
}

/// Builds select options from the distinct values of a column, most
/// frequent first. Returns `None` when there are more than `max_options`
/// distinct values.
pub fn select_options_from_values<'a>(
    values: impl IntoIterator<Item = &'a CellValue>,
    max_options: usize,
) -> Option<Vec<SelectOption>> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for v in values {
        if v.is_empty() {
            continue;
        }
        *counts.entry(v.display()).or_insert(0) += 1;
        if counts.len() > max_options {
            return None;
        }
    }
    if counts.is_empty() {
        return None;
    }
    let mut sorted: Vec<(usize, String)> = counts.into_iter().map(|(k, v)| (v, k)).collect();
    sorted.sort_unstable_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Some(
        sorted
            .into_iter()
            .map(|(count, value)| SelectOption::new(value.clone(), format!("{value} ({count})")))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Santri {
        name: &'static str,
        status: &'static str,
        room: i64,
    }

    fn rows() -> Vec<Santri> {
        vec![
            Santri { name: "Ali Hasan", status: "active", room: 1 },
            Santri { name: "Budi", status: "inactive", room: 2 },
            Santri { name: "Ratna Aliyah", status: "active", room: 1 },
        ]
    }

    fn columns() -> Vec<ColumnDefinition<Santri>> {
        vec![
            ColumnDefinition::new("name", "Name", |s: &Santri| s.name.into()).filter(FilterDescriptor::Text),
            ColumnDefinition::new("status", "Status", |s: &Santri| s.status.into())
                .filter(FilterDescriptor::select(["active", "inactive"])),
            ColumnDefinition::new("room", "Room", |s: &Santri| s.room.into()),
        ]
    }

    #[test]
    fn text_filter_is_case_insensitive_substring() {
        let filters = FilterState::new().with("name", "ali");
        let kept = filter_indices(&rows(), &columns(), &filters, None).unwrap();
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn select_filter_is_exact() {
        let filters = FilterState::new().with("status", "active");
        let kept = filter_indices(&rows(), &columns(), &filters, None).unwrap();
        assert_eq!(kept, vec![0, 2]);

        let filters = FilterState::new().with("status", "activ");
        assert!(filter_indices(&rows(), &columns(), &filters, None).unwrap().is_empty());
    }

    #[test]
    fn filters_combine_with_and() {
        let data = rows();
        let cols = columns();
        let by_name = filter_indices(&data, &cols, &FilterState::new().with("name", "i"), None).unwrap();
        let by_room = filter_indices(&data, &cols, &FilterState::new().with("room", "1"), None).unwrap();
        let both = filter_indices(
            &data,
            &cols,
            &FilterState::new().with("name", "i").with("room", "1"),
            None,
        )
        .unwrap();
        let intersection: Vec<usize> = by_name.iter().copied().filter(|i| by_room.contains(i)).collect();
        assert_eq!(both, intersection);
        assert_eq!(by_name, vec![0, 1, 2]);
        assert_eq!(both, vec![0, 2]);
    }

    #[test]
    fn caller_descriptors_override_column_descriptors() {
        let mut filterable = FilterableColumns::new();
        filterable.insert("status".to_string(), FilterDescriptor::Text);
        let filters = FilterState::new().with("status", "ACTIV");
        let kept = filter_indices(&rows(), &columns(), &filters, Some(&filterable)).unwrap();
        assert_eq!(kept, vec![0, 1, 2]);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let filters = FilterState::new().with("email", "x");
        let err = filter_indices(&rows(), &columns(), &filters, None).unwrap_err();
        assert!(matches!(err, TableError::UnknownColumn(id) if id == "email"));
    }

    #[test]
    fn empty_value_clears_filter() {
        let mut filters = FilterState::new().with("name", "ali");
        filters.set("name", "");
        assert!(filters.is_empty());
        assert_eq!(filter_rows(&rows(), &columns(), &filters, None).unwrap().len(), 3);
    }

    #[test]
    fn select_options_most_frequent_first() {
        let values = [
            CellValue::from("active"),
            CellValue::from("inactive"),
            CellValue::from("active"),
            CellValue::Empty,
        ];
        let options = select_options_from_values(values.iter(), 5).unwrap();
        assert_eq!(options[0], SelectOption::new("active", "active (2)"));
        assert_eq!(options[1], SelectOption::new("inactive", "inactive (1)"));
        assert!(select_options_from_values(values.iter(), 1).is_none());
    }
}
