use std::collections::HashMap;

use super::classifier::classify_columns;
use super::utils::{coerce_number, round_half_up, truncate_chars};
use crate::models::{ChartKind, ChartPoint, ChartSeries, ChartSet, ColumnRoles, Table};

const BAR_LIMIT: usize = 8;
const BAR_KEY_CHARS: usize = 14;
const LINE_LIMIT: usize = 20;
const LINE_KEY_CHARS: usize = 10;
const PIE_LIMIT: usize = 6;
const UNKNOWN_KEY: &str = "Unknown";

/// Sums of the value column per group key, in first-seen key order.
pub fn group_sums(table: &Table, value_column: usize, group_column: usize) -> Vec<(String, f64)> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, f64)> = Vec::new();

    for row in &table.rows {
        let key = row
            .get(group_column)
            .map(String::as_str)
            .filter(|k| !k.is_empty())
            .unwrap_or(UNKNOWN_KEY);
        let value = row.get(value_column).map_or(0.0, |cell| coerce_number(cell));

        match positions.get(key).copied() {
            Some(idx) => groups[idx].1 += value,
            None => {
                positions.insert(key.to_string(), groups.len());
                groups.push((key.to_string(), value));
            }
        }
    }

    groups
}

/// Top groups by summed value, largest first.
pub fn bar_series(table: &Table, value_column: usize, label_column: usize) -> Option<ChartSeries> {
    if label_column == value_column {
        return None;
    }
    let mut groups = group_sums(table, value_column, label_column);
    // stable, so equal sums keep first-seen order
    groups.sort_by(|a, b| b.1.total_cmp(&a.1));

    let points = groups
        .into_iter()
        .take(BAR_LIMIT)
        .map(|(key, value)| ChartPoint {
            key: truncate_chars(&key, BAR_KEY_CHARS),
            value: round_half_up(value),
        })
        .collect();
    Some(ChartSeries { kind: ChartKind::BarTop8, points })
}

/// Per-period sums in the order periods first appear; no sorting.
pub fn line_series(table: &Table, value_column: usize, period_column: usize) -> Option<ChartSeries> {
    if period_column == value_column {
        return None;
    }
    let points = group_sums(table, value_column, period_column)
        .into_iter()
        .take(LINE_LIMIT)
        .map(|(key, value)| ChartPoint {
            key: truncate_chars(&key, LINE_KEY_CHARS),
            value: round_half_up(value),
        })
        .collect();
    Some(ChartSeries { kind: ChartKind::LineByPeriod, points })
}

/// Pie slices are the leading bar points, not a separate aggregation.
pub fn pie_series(bar: &ChartSeries) -> ChartSeries {
    ChartSeries {
        kind: ChartKind::PieTop6,
        points: bar.points.iter().take(PIE_LIMIT).cloned().collect(),
    }
}

pub fn build_charts(table: &Table, roles: &ColumnRoles) -> ChartSet {
    let Some(value_column) = roles.numeric else {
        tracing::debug!("No numeric column among {:?}; no charts", table.headers);
        return ChartSet::default();
    };
    if table.rows.is_empty() {
        return ChartSet::default();
    }

    let bar = roles.label.and_then(|label| bar_series(table, value_column, label));
    let line = roles.temporal.and_then(|period| line_series(table, value_column, period));
    let pie = bar.as_ref().map(pie_series);

    ChartSet {
        value_label: table.headers.get(value_column).cloned(),
        bar,
        line,
        pie,
    }
}

/// Classifies the headers and builds every chart the table supports.
pub fn charts_for_table(table: &Table) -> ChartSet {
    let start = std::time::Instant::now();
    let roles = classify_columns(&table.headers);
    let charts = build_charts(table, &roles);
    tracing::debug!(
        "Built charts (bar={}, line={}) in {:?}",
        charts.bar.is_some(),
        charts.line.is_some(),
        start.elapsed()
    );
    charts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn keys(series: &ChartSeries) -> Vec<&str> {
        series.points.iter().map(|p| p.key.as_str()).collect()
    }

    #[test]
    fn groups_keep_first_seen_order_and_default_unknown() {
        let t = table(&["Region", "Sales"], &[&["North", "1"], &["", "2"], &["South", "3"], &["North", "4"]]);
        let groups = group_sums(&t, 1, 0);
        assert_eq!(
            groups,
            vec![("North".to_string(), 5.0), ("Unknown".to_string(), 2.0), ("South".to_string(), 3.0)]
        );
    }

    #[test]
    fn bar_is_sorted_descending_and_capped() {
        let rows: Vec<Vec<String>> = (0..12)
            .map(|i| vec![format!("P{}", i), format!("{}", i * 10)])
            .collect();
        let t = Table::new(vec!["Product".into(), "Sales".into()], rows);
        let bar = bar_series(&t, 1, 0).unwrap();

        assert_eq!(bar.kind, ChartKind::BarTop8);
        assert_eq!(bar.points.len(), 8);
        assert!(bar.points.windows(2).all(|w| w[0].value >= w[1].value));
        assert_eq!(bar.points[0].key, "P11");
    }

    #[test]
    fn keys_are_truncated_for_display() {
        let t = table(
            &["Product", "Month", "Revenue"],
            &[&["Extra Large Widget Deluxe", "2024-01-15 extra", "10"]],
        );
        let charts = build_charts(&t, &classify_columns(&t.headers));
        assert_eq!(keys(charts.bar.as_ref().unwrap()), vec!["Extra Large Wi"]);
        assert_eq!(keys(charts.line.as_ref().unwrap()), vec!["2024-01-15"]);
    }

    #[test]
    fn line_is_unsorted_and_capped_at_twenty() {
        let rows: Vec<Vec<String>> = (0..25)
            .map(|i| vec![format!("D{:02}", 25 - i), "1".to_string()])
            .collect();
        let t = Table::new(vec!["Day".into(), "Amount".into()], rows);
        let line = line_series(&t, 1, 0).unwrap();
        assert_eq!(line.points.len(), 20);
        assert_eq!(line.points[0].key, "D25");
        assert_eq!(line.points[19].key, "D06");
    }

    #[test]
    fn sums_are_rounded() {
        let t = table(&["Item", "Price"], &[&["A", "$1.25"], &["A", "1.25"], &["B", "0.4"]]);
        let bar = bar_series(&t, 1, 0).unwrap();
        assert_eq!(bar.points[0].value, 3.0);
        assert_eq!(bar.points[1].value, 0.0);
    }

    #[test]
    fn pie_is_prefix_of_bar() {
        let rows: Vec<Vec<String>> = (0..10)
            .map(|i| vec![format!("R{}", i), format!("{}", 100 - i)])
            .collect();
        let t = Table::new(vec!["Region".into(), "Revenue".into()], rows);
        let charts = charts_for_table(&t);
        let bar = charts.bar.unwrap();
        let pie = charts.pie.unwrap();

        assert_eq!(pie.kind, ChartKind::PieTop6);
        assert_eq!(pie.points.len(), 6);
        assert_eq!(&bar.points[..6], &pie.points[..]);
    }

    #[test]
    fn no_numeric_column_means_no_charts() {
        let t = table(&["Date", "Product", "Notes"], &[&["2024-01", "Widget", "ok"]]);
        let charts = charts_for_table(&t);
        assert!(!charts.has_charts());
        assert!(charts.pie.is_none());
        assert!(charts.value_label.is_none());
    }

    #[test]
    fn grouping_by_the_value_column_is_skipped() {
        // "Sales Type" is both the numeric and the label column.
        let t = table(&["Sales Type", "Date"], &[&["10", "2024-01"]]);
        let charts = charts_for_table(&t);
        assert!(charts.bar.is_none());
        assert!(charts.pie.is_none());
        assert!(charts.line.is_some());
        assert!(charts.has_charts());
    }

    #[test]
    fn header_only_rows_give_no_charts() {
        let t = Table::new(vec!["Product".into(), "Sales".into()], vec![]);
        assert!(!charts_for_table(&t).has_charts());
    }
}
