//! Batch windows and source column rendering.

use serde::{Deserialize, Serialize};

use crate::core::schema::Column;

/// Column names that collide with source SQL keywords and must be quoted.
pub const RESERVED_COLUMN_NAMES: &[&str] = &[
    "where", "from", "select", "comment", "order", "group", "table", "user", "date", "level",
    "size", "number",
];

/// Half-open window `[offset, offset + size)` over the row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWindow {
    pub offset: i64,
    pub size: i64,
}

impl BatchWindow {
    /// First window of a table.
    pub fn first(size: usize) -> Self {
        Self {
            offset: 0,
            size: size as i64,
        }
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> i64 {
        self.offset + self.size
    }

    /// The window right after this one, regardless of how many rows came back.
    pub fn next(&self) -> Self {
        Self {
            offset: self.end(),
            size: self.size,
        }
    }
}

/// Render one column for the source select list.
///
/// Reserved words become upper-case quoted identifiers (`"ORDER"`). Names
/// that are not all lower case keep their exact case inside quotes, because
/// the source folds unquoted names to upper case.
pub fn column_expr(name: &str) -> String {
    let lower = name.to_lowercase();
    if RESERVED_COLUMN_NAMES.contains(&lower.as_str()) {
        format!("\"{}\"", name.to_uppercase())
    } else if name != lower {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

/// Select list for a table's columns, in ordinal order.
pub fn column_list(columns: &[Column]) -> Vec<String> {
    columns.iter().map(|c| column_expr(&c.name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::SourceType;

    #[test]
    fn test_windows_cover_without_overlap() {
        let mut window = BatchWindow::first(100);
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push((window.offset, window.end()));
            window = window.next();
        }
        assert_eq!(seen, vec![(0, 100), (100, 200), (200, 300), (300, 400)]);
    }

    #[test]
    fn test_reserved_words_quoted_upper() {
        for word in ["where", "from", "select", "comment", "order"] {
            assert_eq!(column_expr(word), format!("\"{}\"", word.to_uppercase()));
        }
        assert_eq!(column_expr("Order"), "\"ORDER\"");
        assert_eq!(column_expr("level"), "\"LEVEL\"");
    }

    #[test]
    fn test_plain_names_unquoted() {
        assert_eq!(column_expr("customer_id"), "customer_id");
        assert_eq!(column_expr("orders"), "orders");
        assert_eq!(column_expr("MixedCase"), "\"MixedCase\"");
    }

    #[test]
    fn test_column_list_keeps_order() {
        let cols = vec![
            Column::new("id", SourceType::Text),
            Column::new("order", SourceType::Text),
            Column::new("customer_id", SourceType::Text),
        ];
        assert_eq!(column_list(&cols), vec!["id", "\"ORDER\"", "customer_id"]);
    }
}
