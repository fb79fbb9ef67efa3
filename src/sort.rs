use crate::column::{ColumnDefinition, find_column};
use crate::domain::TableError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    pub column_id: String,
    pub direction: SortDirection,
}

impl SortState {
    pub fn new(column_id: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column_id: column_id.into(),
            direction,
        }
    }

    /// Next sort when a header is activated: ascending, then descending,
    /// then unsorted.
    pub fn toggle(current: Option<&SortState>, column_id: &str) -> Option<SortState> {
        match current {
            Some(s) if s.column_id == column_id => match s.direction {
                SortDirection::Ascending => Some(SortState::new(column_id, SortDirection::Descending)),
                SortDirection::Descending => None,
            },
            _ => Some(SortState::new(column_id, SortDirection::Ascending)),
        }
    }
}

/// Stable sort of `indices` (positions into `rows`) by the sorted column.
pub fn sort_indices<T>(
    rows: &[T],
    indices: &mut [usize],
    columns: &[ColumnDefinition<T>],
    sort: &SortState,
) -> Result<(), TableError> {
    let (_, column) = find_column(columns, &sort.column_id)
        .ok_or_else(|| TableError::UnknownColumn(sort.column_id.clone()))?;

    let mut keyed: Vec<(usize, _)> = indices.iter().map(|&i| (i, column.value(&rows[i]))).collect();
    keyed.sort_by(|(_, a), (_, b)| {
        let ord = a.compare(b);
        match sort.direction {
            SortDirection::Ascending => ord,
            // Missing cells stay at the end in both directions
            SortDirection::Descending if a.is_missing() || b.is_missing() => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
    for (slot, (idx, _)) in indices.iter_mut().zip(keyed) {
        *slot = idx;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::CellValue;

    struct Transaction {
        amount: Option<f64>,
        note: &'static str,
    }

    fn columns() -> Vec<ColumnDefinition<Transaction>> {
        vec![
            ColumnDefinition::new("amount", "Amount", |t: &Transaction| t.amount.into()).sortable(),
            ColumnDefinition::new("note", "Note", |t: &Transaction| CellValue::from(t.note)),
        ]
    }

    fn rows() -> Vec<Transaction> {
        vec![
            Transaction { amount: Some(50_000.0), note: "spp" },
            Transaction { amount: None, note: "pending" },
            Transaction { amount: Some(1_500.0), note: "laundry" },
            Transaction { amount: Some(50_000.0), note: "uniform" },
        ]
    }

    #[test]
    fn ascending_is_numeric_and_stable() {
        let rows = rows();
        let mut idx: Vec<usize> = (0..rows.len()).collect();
        sort_indices(&rows, &mut idx, &columns(), &SortState::new("amount", SortDirection::Ascending)).unwrap();
        assert_eq!(idx, vec![2, 0, 3, 1]);
    }

    #[test]
    fn descending_keeps_empty_last() {
        let rows = rows();
        let mut idx: Vec<usize> = (0..rows.len()).collect();
        sort_indices(&rows, &mut idx, &columns(), &SortState::new("amount", SortDirection::Descending)).unwrap();
        assert_eq!(idx, vec![0, 3, 2, 1]);
    }

    #[test]
    fn nan_amounts_sort_after_numbers() {
        let amounts = [Some(30.0), Some(f64::NAN), Some(10.0), Some(f64::NAN), Some(20.0), None];
        let rows: Vec<Transaction> = amounts.iter().map(|&amount| Transaction { amount, note: "" }).collect();
        let mut idx: Vec<usize> = (0..rows.len()).collect();
        sort_indices(&rows, &mut idx, &columns(), &SortState::new("amount", SortDirection::Ascending)).unwrap();
        assert_eq!(idx, vec![2, 4, 0, 1, 3, 5]);

        let mut idx: Vec<usize> = (0..rows.len()).collect();
        sort_indices(&rows, &mut idx, &columns(), &SortState::new("amount", SortDirection::Descending)).unwrap();
        assert_eq!(idx, vec![0, 4, 2, 1, 3, 5]);
    }

    #[test]
    fn toggle_cycles() {
        let asc = SortState::toggle(None, "note").unwrap();
        assert_eq!(asc.direction, SortDirection::Ascending);
        let desc = SortState::toggle(Some(&asc), "note").unwrap();
        assert_eq!(desc.direction, SortDirection::Descending);
        assert!(SortState::toggle(Some(&desc), "note").is_none());
        let other = SortState::toggle(Some(&desc), "amount").unwrap();
        assert_eq!(other, SortState::new("amount", SortDirection::Ascending));
    }

    #[test]
    fn unknown_sort_column() {
        let rows = rows();
        let mut idx = vec![0, 1];
        assert!(sort_indices(&rows, &mut idx, &columns(), &SortState::new("date", SortDirection::Ascending)).is_err());
    }
}
