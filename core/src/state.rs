//! Observable state shapes produced by the controllers.
//!
//! These are plain values: controllers own them behind a `watch` channel and
//! hand out clones as snapshots. Field names serialize in camelCase so the
//! shapes can be handed to a UI layer unchanged.

use serde::{Deserialize, Serialize};

/// Lifecycle of one request slot.
///
/// At any time the state is either idle (all flags false), loading,
/// succeeded or failed. `is_success` and `is_error` are never both set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestState<T> {
    /// Data from the last committed success
    pub data: Option<T>,
    /// A call owned by the current generation is in flight
    pub is_loading: bool,
    /// Message of the last committed failure
    pub error: Option<String>,
    /// The last committed call succeeded
    pub is_success: bool,
    /// The last committed call failed
    pub is_error: bool,
}

impl<T> RequestState<T> {
    /// All-idle state with no data and no error.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
            is_success: false,
            is_error: false,
        }
    }

    /// Enter the loading phase. `data` is left as it was.
    pub fn begin(&mut self) {
        self.is_loading = true;
        self.error = None;
        self.is_success = false;
        self.is_error = false;
    }

    /// Commit a successful result.
    pub fn succeed(&mut self, data: T) {
        self.data = Some(data);
        self.is_loading = false;
        self.error = None;
        self.is_success = true;
        self.is_error = false;
    }

    /// Commit a final failure. Clears `data`.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.data = None;
        self.is_loading = false;
        self.error = Some(message.into());
        self.is_success = false;
        self.is_error = true;
    }

    /// True when no flag is set.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        !self.is_loading && !self.is_success && !self.is_error
    }
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

/// Accumulated offset/limit pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState<T> {
    /// All items received so far, in page order
    pub items: Vec<T>,
    /// Current page number (1-based)
    pub page: u32,
    /// Page size
    pub limit: u32,
    /// Total item count reported by the last response
    pub total: u64,
}

impl<T> PageState<T> {
    /// Empty state at page 1 with the given page size.
    #[must_use]
    pub const fn new(limit: u32) -> Self {
        Self {
            items: Vec::new(),
            page: 1,
            limit,
            total: 0,
        }
    }

    /// More items exist beyond what has been accumulated.
    #[must_use]
    pub fn has_more(&self) -> bool {
        (self.items.len() as u64) < self.total
    }

    /// Fold the results of the requested `page` into the accumulated list.
    ///
    /// Page 1 replaces the list; any later page appends to it. `total` is
    /// always taken from the latest response. `limit` is left alone: only the
    /// caller changes the page size.
    pub fn apply(&mut self, page: u32, total: u64, items: Vec<T>) {
        if page <= 1 {
            self.items = items;
        } else {
            self.items.extend(items);
        }
        self.page = page.max(1);
        self.total = total;
    }

    /// Drop accumulated items and return to page 1.
    pub fn restart(&mut self) {
        self.items.clear();
        self.page = 1;
    }
}

/// Accumulated cursor pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState<T> {
    /// All items received so far
    pub items: Vec<T>,
    /// Continuation token for the next page
    pub next_cursor: Option<String>,
    /// Another page can be requested
    pub has_more: bool,
}

impl<T> CursorState<T> {
    /// Empty state, optimistically assuming a first page exists.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: true,
        }
    }

    /// Append one page of results and record its continuation token.
    pub fn apply(&mut self, items: Vec<T>, next_cursor: Option<String>) {
        self.items.extend(items);
        self.has_more = next_cursor.is_some();
        self.next_cursor = next_cursor;
    }

    /// Clear everything and assume a fresh first page exists.
    pub fn restart(&mut self) {
        self.items.clear();
        self.next_cursor = None;
        self.has_more = true;
    }
}

impl<T> Default for CursorState<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn request_state_transitions() {
        let mut state = RequestState::<u32>::idle();
        assert!(state.is_idle());

        state.begin();
        assert!(state.is_loading);
        assert!(!state.is_success && !state.is_error);

        state.succeed(7);
        assert_eq!(state.data, Some(7));
        assert!(state.is_success && !state.is_error && !state.is_loading);

        state.begin();
        assert_eq!(state.data, Some(7), "begin leaves data untouched");

        state.fail("boom");
        assert_eq!(state.data, None);
        assert_eq!(state.error.as_deref(), Some("boom"));
        assert!(state.is_error && !state.is_success);
    }

    #[test]
    fn request_state_serializes_camel_case() {
        let mut state = RequestState::<String>::idle();
        state.begin();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": null,
                "isLoading": true,
                "error": null,
                "isSuccess": false,
                "isError": false,
            })
        );
    }

    #[test]
    fn page_one_replaces_later_pages_append() {
        let mut state = PageState::new(2);
        state.apply(1, 10, vec!['a', 'b']);
        state.apply(2, 10, vec!['c', 'd']);
        assert_eq!(state.items, vec!['a', 'b', 'c', 'd']);
        assert!(state.has_more());

        state.apply(1, 3, vec!['x']);
        assert_eq!(state.limit, 2, "limit is only changed by the caller");
        assert_eq!(state.items, vec!['x']);
        assert_eq!(state.total, 3);
    }

    #[test]
    fn cursor_state_tracks_next_cursor() {
        let mut state = CursorState::new();
        assert!(state.has_more);

        state.apply(vec![1, 2], Some("c1".to_string()));
        assert!(state.has_more);
        state.apply(vec![3], None);
        assert_eq!(state.items, vec![1, 2, 3]);
        assert!(!state.has_more);

        state.restart();
        assert!(state.items.is_empty());
        assert!(state.has_more);
        assert_eq!(state.next_cursor, None);
    }

    proptest! {
        #[test]
        fn has_more_matches_item_count(pages in prop::collection::vec(0usize..8, 1..6), total in 0u64..40) {
            let mut state = PageState::new(8);
            for (index, size) in pages.iter().enumerate() {
                let page = u32::try_from(index + 1).unwrap();
                state.apply(page, total, vec![0u8; *size]);
            }
            prop_assert_eq!(state.has_more(), (state.items.len() as u64) < total);
        }

        #[test]
        fn cursor_has_more_iff_cursor_present(cursor in proptest::option::of("[a-z]{1,6}")) {
            let mut state = CursorState::<u8>::new();
            state.apply(vec![1], cursor.clone());
            prop_assert_eq!(state.has_more, cursor.is_some());
        }
    }
}
