//! Cursor pagination for list endpoints.

use serde::{Deserialize, Serialize};

/// Default page size when `count` is not specified.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// One year of daily records.
pub const MAX_PAGE_SIZE: u32 = 366;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageParams {
    /// Opaque cursor from a previous response.
    pub cursor: Option<String>,
    pub count: Option<u32>,
}

impl PageParams {
    /// Page size clamped to `[1, MAX_PAGE_SIZE]`.
    pub fn effective_count(&self) -> u32 {
        self.count
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Offset encoded in the cursor; 0 when absent or unreadable.
    pub fn offset(&self) -> usize {
        self.cursor.as_deref().and_then(decode_cursor).unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

pub fn encode_cursor(offset: usize) -> String {
    hex::encode(offset.to_string())
}

pub fn decode_cursor(cursor: &str) -> Option<usize> {
    let bytes = hex::decode(cursor).ok()?;
    std::str::from_utf8(&bytes).ok()?.parse().ok()
}

/// Slice one page out of `items`.
pub fn paginate<T>(items: Vec<T>, params: &PageParams) -> Page<T> {
    let total = items.len();
    let offset = params.offset().min(total);
    let count = params.effective_count() as usize;
    let end = offset.saturating_add(count).min(total);
    let cursor = (end < total).then(|| encode_cursor(end));
    let items = items.into_iter().skip(offset).take(end - offset).collect();
    Page { items, cursor }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(cursor: Option<String>, count: Option<u32>) -> PageParams {
        PageParams { cursor, count }
    }

    #[test]
    fn count_is_clamped() {
        assert_eq!(params(None, None).effective_count(), DEFAULT_PAGE_SIZE);
        assert_eq!(params(None, Some(0)).effective_count(), 1);
        assert_eq!(params(None, Some(10_000)).effective_count(), MAX_PAGE_SIZE);
    }

    #[test]
    fn cursor_roundtrip_and_garbage() {
        assert_eq!(decode_cursor(&encode_cursor(42)), Some(42));
        assert_eq!(params(Some("zz".into()), None).offset(), 0);
    }

    #[test]
    fn walks_pages_until_exhausted() {
        let items: Vec<u32> = (0..7).collect();
        let first = paginate(items.clone(), &params(None, Some(3)));
        assert_eq!(first.items, vec![0, 1, 2]);
        let second = paginate(items.clone(), &params(first.cursor, Some(3)));
        assert_eq!(second.items, vec![3, 4, 5]);
        let last = paginate(items, &params(second.cursor, Some(3)));
        assert_eq!(last.items, vec![6]);
        assert!(last.cursor.is_none());
    }

    #[test]
    fn offset_past_end_is_empty() {
        let page = paginate(vec![1, 2], &params(Some(encode_cursor(9)), None));
        assert!(page.items.is_empty());
        assert!(page.cursor.is_none());
    }
}
