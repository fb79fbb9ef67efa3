//! Local pagination.
//!
//! Slices an in-memory collection into fixed size pages. Every derived value
//! is a pure function of the data and the [`PaginationState`], so a page is
//! always a sub-slice of the data it was computed from.

use std::num::NonZeroUsize;
use std::ops::Range;

use tracing::trace;

use crate::domain::TableError;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Zero based page index plus the number of rows per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaginationState {
    pub page_index: usize,
    pub page_size: NonZeroUsize,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_PAGE_SIZE).unwrap_or(NonZeroUsize::MIN))
    }
}

impl PaginationState {
    pub fn new(page_size: NonZeroUsize) -> Self {
        Self {
            page_index: 0,
            page_size,
        }
    }

    pub fn try_with_page_size(page_size: usize) -> Result<Self, TableError> {
        NonZeroUsize::new(page_size)
            .map(Self::new)
            .ok_or(TableError::InvalidPageSize)
    }

    pub fn size(&self) -> usize {
        self.page_size.get()
    }

    /// Index of the first row of the current page in the full collection.
    pub fn offset(&self) -> usize {
        self.page_index.saturating_mul(self.size())
    }

    pub fn at_page(self, page_index: usize) -> Self {
        Self { page_index, ..self }
    }

    pub fn first(self) -> Self {
        self.at_page(0)
    }

    pub fn next(self, page_count: usize) -> Self {
        if self.page_index + 1 < page_count {
            self.at_page(self.page_index + 1)
        } else {
            self
        }
    }

    pub fn previous(self) -> Self {
        self.at_page(self.page_index.saturating_sub(1))
    }

    pub fn last(self, page_count: usize) -> Self {
        self.at_page(page_count.saturating_sub(1))
    }

    /// A new page size always starts over at the first page.
    pub fn with_page_size(self, page_size: NonZeroUsize) -> Self {
        Self::new(page_size)
    }

    /// Pulls an out of range index back onto the last existing page.
    pub fn clamped(self, page_count: usize) -> Self {
        if page_count == 0 {
            self.first()
        } else {
            self.at_page(self.page_index.min(page_count - 1))
        }
    }

    pub fn is_in_range(&self, page_count: usize) -> bool {
        self.page_index < page_count || (page_count == 0 && self.page_index == 0)
    }
}

pub fn page_count(total: usize, page_size: NonZeroUsize) -> usize {
    total.div_ceil(page_size.get())
}

/// Row range of the current page, empty when the index is past the data.
pub fn page_range(total: usize, state: PaginationState) -> Range<usize> {
    let begin = std::cmp::min(state.offset(), total);
    let end = std::cmp::min(begin.saturating_add(state.size()), total);
    begin..end
}

pub fn paginate<T>(data: &[T], state: PaginationState) -> &[T] {
    &data[page_range(data.len(), state)]
}

/// Summary of where the current page sits, for status lines and controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page_number: usize,
    pub page_count: usize,
    pub total: usize,
    pub first_row: usize,
    pub last_row: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PageInfo {
    pub fn new(total: usize, page_count: usize, state: PaginationState) -> Self {
        let range = page_range(total, state);
        let (first_row, last_row) = if range.is_empty() {
            (0, 0)
        } else {
            (range.start + 1, range.end)
        };
        Self {
            page_number: state.page_index + 1,
            page_count,
            total,
            first_row,
            last_row,
            has_previous: state.page_index > 0,
            has_next: state.page_index + 1 < page_count,
        }
    }

    pub fn as_string(&self) -> String {
        if self.total == 0 {
            return "no rows".to_string();
        }
        format!(
            "page {}/{} · rows {}-{} of {}",
            self.page_number, self.page_count, self.first_row, self.last_row, self.total
        )
    }
}

/// Paginates an owned snapshot of rows.
///
/// The page index is never corrected when the data shrinks; hosts that need
/// the index to stay valid reset or clamp it themselves.
#[derive(Debug)]
pub struct LocalPaginator<T> {
    data: Vec<T>,
    generation: u64,
    pagination: PaginationState,
    memo: Memo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Memo {
    generation: u64,
    pagination: PaginationState,
    range: Range<usize>,
    page_count: usize,
}

impl<T> LocalPaginator<T> {
    pub fn new(data: Vec<T>, page_size: NonZeroUsize) -> Self {
        let pagination = PaginationState::new(page_size);
        let memo = Memo::compute(0, data.len(), pagination);
        Self {
            data,
            generation: 0,
            pagination,
            memo,
        }
    }

    pub fn with_default_page_size(data: Vec<T>) -> Self {
        Self::new(data, PaginationState::default().page_size)
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn pagination(&self) -> PaginationState {
        self.pagination
    }

    pub fn set_pagination(&mut self, pagination: PaginationState) {
        self.pagination = pagination;
        self.recompute();
    }

    /// Replaces the whole snapshot. Deltas are not supported.
    pub fn set_data(&mut self, data: Vec<T>) {
        self.data = data;
        self.generation += 1;
        self.recompute();
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn paginated_data(&self) -> &[T] {
        &self.data[self.memo.range.clone()]
    }

    pub fn page_count(&self) -> usize {
        self.memo.page_count
    }

    pub fn page_info(&self) -> PageInfo {
        PageInfo::new(self.data.len(), self.page_count(), self.pagination)
    }

    fn recompute(&mut self) {
        if self.memo.generation == self.generation && self.memo.pagination == self.pagination {
            return;
        }
        self.memo = Memo::compute(self.generation, self.data.len(), self.pagination);
        trace!(
            "Paginator: gen {}, page {}/{}, range {:?}",
            self.generation, self.pagination.page_index, self.memo.page_count, self.memo.range
        );
    }
}

impl Memo {
    fn compute(generation: u64, total: usize, pagination: PaginationState) -> Self {
        Memo {
            generation,
            pagination,
            range: page_range(total, pagination),
            page_count: page_count(total, pagination.page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(0, size(10)), 0);
        assert_eq!(page_count(1, size(10)), 1);
        assert_eq!(page_count(10, size(10)), 1);
        assert_eq!(page_count(11, size(10)), 2);
        assert_eq!(page_count(25, size(10)), 3);
        assert_eq!(page_count(7, size(1)), 7);
    }

    #[test]
    fn page_count_matches_ceiling_for_small_inputs() {
        for total in 0..60 {
            for s in 1..13 {
                let expected = if total == 0 { 0 } else { (total + s - 1) / s };
                assert_eq!(page_count(total, size(s)), expected, "total {total}, size {s}");
            }
        }
    }

    #[test]
    fn pages_of_twenty_five_items() {
        let data: Vec<usize> = (0..25).collect();
        let mut paginator = LocalPaginator::new(data, size(10));
        assert_eq!(paginator.page_count(), 3);
        assert_eq!(paginator.paginated_data(), &(0..10).collect::<Vec<_>>()[..]);

        paginator.set_pagination(paginator.pagination().at_page(2));
        assert_eq!(paginator.paginated_data(), &[20, 21, 22, 23, 24]);
    }

    #[test]
    fn every_valid_page_is_the_expected_slice() {
        let data: Vec<usize> = (0..23).collect();
        for s in 1..9 {
            let count = page_count(data.len(), size(s));
            for page in 0..count {
                let state = PaginationState::new(size(s)).at_page(page);
                let got = paginate(&data, state);
                let end = std::cmp::min(data.len(), (page + 1) * s);
                assert_eq!(got, &data[page * s..end]);
                assert!(got.len() <= s);
                if page + 1 < count {
                    assert_eq!(got.len(), s);
                }
            }
        }
    }

    #[test]
    fn empty_data_has_no_pages() {
        let mut paginator: LocalPaginator<u8> = LocalPaginator::with_default_page_size(Vec::new());
        assert_eq!(paginator.page_count(), 0);
        assert!(paginator.paginated_data().is_empty());
        paginator.set_pagination(paginator.pagination().at_page(4));
        assert!(paginator.paginated_data().is_empty());
    }

    #[test]
    fn shrinking_data_is_not_clamped() {
        let mut paginator = LocalPaginator::new((0..30).collect::<Vec<u32>>(), size(10));
        paginator.set_pagination(paginator.pagination().at_page(2));
        assert_eq!(paginator.paginated_data().len(), 10);

        paginator.set_data((0..5).collect());
        assert_eq!(paginator.page_count(), 1);
        assert_eq!(paginator.pagination().page_index, 2);
        assert!(paginator.paginated_data().is_empty());
    }

    #[test]
    fn unchanged_inputs_return_the_same_slice() {
        let mut paginator = LocalPaginator::new((0..30).collect::<Vec<u32>>(), size(7));
        let first = paginator.paginated_data() as *const [u32];
        let second = paginator.paginated_data() as *const [u32];
        assert!(std::ptr::eq(first, second));

        let state = paginator.pagination();
        paginator.set_pagination(state);
        assert!(std::ptr::eq(first, paginator.paginated_data()));
        assert_eq!(paginator.page_count(), 5);
    }

    #[test]
    fn navigation_returns_new_states() {
        let state = PaginationState::new(size(10));
        assert_eq!(state.next(3).page_index, 1);
        assert_eq!(state.next(3).next(3).next(3).page_index, 2);
        assert_eq!(state.previous().page_index, 0);
        assert_eq!(state.last(3).page_index, 2);
        assert_eq!(state.last(0).page_index, 0);
        assert_eq!(state.at_page(2).with_page_size(size(5)), PaginationState::new(size(5)));
    }

    #[test]
    fn clamping_pulls_index_back() {
        let state = PaginationState::new(size(10)).at_page(4);
        assert_eq!(state.clamped(2).page_index, 1);
        assert_eq!(state.clamped(0).page_index, 0);
        assert!(!state.is_in_range(2));
        assert!(PaginationState::default().is_in_range(0));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(matches!(
            PaginationState::try_with_page_size(0),
            Err(TableError::InvalidPageSize)
        ));
        assert_eq!(PaginationState::try_with_page_size(25).unwrap().size(), 25);
    }

    #[test]
    fn page_info_labels() {
        let state = PaginationState::new(size(10)).at_page(2);
        let info = PageInfo::new(25, 3, state);
        assert_eq!(info.first_row, 21);
        assert_eq!(info.last_row, 25);
        assert!(info.has_previous);
        assert!(!info.has_next);
        assert_eq!(info.as_string(), "page 3/3 · rows 21-25 of 25");
        assert_eq!(PageInfo::new(0, 0, PaginationState::default()).as_string(), "no rows");
    }
}
