// ABOUTME: Offset-based pagination cursor over fully materialised listings
// ABOUTME: Produces one page of items plus an opaque continuation token, tolerating stale tokens

use serde::{Deserialize, Serialize};

/// Default page size used when callers do not specify one
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// One page of a sorted collection.
///
/// `next_page_id` is absent once the collection is exhausted. The token is
/// opaque to callers; today it is the stringified start offset of the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_id: Option<String>,
}

impl<T> Page<T> {
    /// An empty, exhausted page
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_page_id: None,
        }
    }

    /// Map the items of this page, keeping the continuation token
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_id: self.next_page_id,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parse an incoming page token into a start offset.
///
/// Missing, empty, negative or otherwise unparseable tokens restart at offset 0.
pub fn parse_page_id(page_id: Option<&str>) -> usize {
    page_id
        .and_then(|token| token.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

/// Slice `items` (already in their final sort order) into a page.
///
/// A `limit` of zero is treated as one so that following the token chain
/// always terminates.
pub fn paginate<T>(items: Vec<T>, page_id: Option<&str>, limit: usize) -> Page<T> {
    let limit = limit.max(1);
    let total = items.len();
    let start = parse_page_id(page_id);

    if start >= total {
        return Page::empty();
    }

    let end = start.saturating_add(limit).min(total);
    let next_page_id = if end < total {
        Some(end.to_string())
    } else {
        None
    };

    let items = items.into_iter().skip(start).take(end - start).collect();

    Page {
        items,
        next_page_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_first_page_has_token_when_more_remain() {
        let items: Vec<u32> = (0..250).collect();
        let page = paginate(items, None, 100);

        assert_eq!(page.items.len(), 100);
        assert_eq!(page.items[0], 0);
        assert_eq!(page.next_page_id.as_deref(), Some("100"));
    }

    #[test]
    fn test_token_chain_covers_everything_exactly_once() {
        let items: Vec<u32> = (0..250).collect();
        let mut seen = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = paginate(items.clone(), token.as_deref(), 100);
            pages += 1;
            seen.extend(page.items);
            match page.next_page_id {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(seen.len(), 250);
        let unique: HashSet<u32> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 250);
        assert_eq!(seen, items);
    }

    #[test]
    fn test_malformed_token_behaves_like_no_token() {
        let items: Vec<u32> = (0..30).collect();
        let fresh = paginate(items.clone(), None, 10);

        for token in ["abc", "", "-5", "1.5", "ten", "  "] {
            let page = paginate(items.clone(), Some(token), 10);
            assert_eq!(page, fresh, "token {:?} should restart at offset 0", token);
        }
    }

    #[test]
    fn test_offset_past_end_is_empty_and_exhausted() {
        let items: Vec<u32> = (0..5).collect();
        let page = paginate(items, Some("50"), 10);
        assert!(page.items.is_empty());
        assert!(page.next_page_id.is_none());
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_token() {
        let items: Vec<u32> = (0..200).collect();
        let second = paginate(items, Some("100"), 100);
        assert_eq!(second.items.len(), 100);
        assert!(second.next_page_id.is_none());
    }

    #[test]
    fn test_zero_limit_still_makes_progress() {
        let items: Vec<u32> = (0..3).collect();
        let page = paginate(items, None, 0);
        assert_eq!(page.items, vec![0]);
        assert_eq!(page.next_page_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_page_serializes_with_null_token() {
        let page: Page<u32> = paginate(vec![1, 2], None, 10);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json, serde_json::json!({"items": [1, 2], "next_page_id": null}));
    }
}
