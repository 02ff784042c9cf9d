use crate::models::{ColumnRole, ColumnRoles};

const NUMERIC_KEYWORDS: &[&str] = &[
    "revenue", "sales", "amount", "total", "price", "value", "profit", "income", "cost",
];
const LABEL_KEYWORDS: &[&str] = &[
    "product", "category", "item", "name", "region", "type", "department",
];
const TEMPORAL_KEYWORDS: &[&str] = &["date", "month", "week", "day", "period", "time", "year"];

fn keywords(role: ColumnRole) -> &'static [&'static str] {
    match role {
        ColumnRole::Numeric => NUMERIC_KEYWORDS,
        ColumnRole::Label => LABEL_KEYWORDS,
        ColumnRole::Temporal => TEMPORAL_KEYWORDS,
        ColumnRole::Unclassified => &[],
    }
}

/// Index of the first header containing any keyword of `role`,
/// compared case-insensitively.
pub fn find_column<S: AsRef<str>>(headers: &[S], role: ColumnRole) -> Option<usize> {
    let words = keywords(role);
    headers.iter().position(|header| {
        let header = header.as_ref().to_lowercase();
        words.iter().any(|k| header.contains(k))
    })
}

pub fn classify_columns<S: AsRef<str>>(headers: &[S]) -> ColumnRoles {
    ColumnRoles {
        numeric: find_column(headers, ColumnRole::Numeric),
        label: find_column(headers, ColumnRole::Label),
        temporal: find_column(headers, ColumnRole::Temporal),
    }
}
