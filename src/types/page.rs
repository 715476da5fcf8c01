//! Pagination envelope shared by every list endpoint.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// `{count, next, previous, results}` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Page<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// A single page holding every item
    pub fn from_items(results: Vec<T>) -> Self {
        Self {
            count: results.len() as u64,
            next: None,
            previous: None,
            results,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::from_items(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses() {
        let page: Page<u32> = serde_json::from_str(
            r#"{"count": 41, "next": "http://x/api/v1/campaigns/?page=2", "previous": null, "results": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(page.count, 41);
        assert!(page.has_next());
        assert_eq!(page.results, vec![1, 2]);
    }

    #[test]
    fn test_from_items() {
        let page = Page::from_items(vec!["a", "b"]);
        assert_eq!(page.count, 2);
        assert!(!page.has_next());
        assert!(Page::<u8>::default().is_empty());
    }
}
