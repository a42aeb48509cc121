//! Response envelopes returned by injected request functions.

use serde::{Deserialize, Serialize};

/// Successful response from a request function.
///
/// The executor only looks at `data`; transport details stay with the
/// collaborator that produced the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response<T> {
    /// Payload committed to `RequestState::data`
    pub data: T,
}

impl<T> Response<T> {
    /// Wrap a payload.
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { data }
    }

    /// Unwrap the payload.
    #[must_use]
    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T> From<T> for Response<T> {
    fn from(data: T) -> Self {
        Self::new(data)
    }
}

/// One page of an offset/limit listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Total item count across all pages
    pub total: u64,
    /// Page number this response belongs to
    pub page: u32,
    /// Page size used by the server
    pub limit: u32,
}

/// One page of a cursor listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorResponse<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Token for the following page, `None` on the last page
    pub next_cursor: Option<String>,
}
