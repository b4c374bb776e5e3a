//! Case-insensitive title search over the feature table

use crate::models::ItemRecord;

/// Lowercased titles in row order, built once per loaded artifact version
pub struct TitleIndex {
    titles: Vec<String>,
}

impl TitleIndex {
    pub fn new(items: &[ItemRecord]) -> Self {
        Self {
            titles: items.iter().map(|item| item.title.to_lowercase()).collect(),
        }
    }

    /// Row indices of titles containing `query`, at most `limit` of them
    ///
    /// Titles starting with the query come first, then the remaining
    /// substring matches; both groups keep catalog order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<usize> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let (prefix, inner): (Vec<usize>, Vec<usize>) = self
            .titles
            .iter()
            .enumerate()
            .filter(|(_, title)| title.contains(&needle))
            .map(|(row, _)| row)
            .partition(|&row| self.titles[row].starts_with(&needle));

        prefix.into_iter().chain(inner).take(limit).collect()
    }
}
