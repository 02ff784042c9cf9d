use calamine::{Data, DataType};
use chrono::Timelike;
use once_cell::sync::Lazy;
use regex::Regex;

static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.\-]").unwrap());
static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?(\d+\.?\d*|\.\d+)").unwrap());

/// Coerces a free-form cell such as `"$1,204.50"` or `"-42 units"` to a number.
///
/// Every character except digits, `.` and `-` is dropped, then the longest
/// leading decimal number is parsed. Anything that yields no number is 0.
pub fn coerce_number(cell: &str) -> f64 {
    let stripped = NON_NUMERIC.replace_all(cell, "");
    LEADING_NUMBER
        .find(&stripped)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v != 0.0)
        .unwrap_or(0.0)
}

/// Rounds half up, so -2.5 becomes -2 and 2.5 becomes 3.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub fn format_bytes(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

pub fn is_blank_record<S: AsRef<str>>(cells: &[S]) -> bool {
    cells.iter().all(|c| c.as_ref().trim().is_empty())
}

/// Renders a spreadsheet cell the way it reads in the sheet.
pub fn cell_to_string(cell: &Data) -> String {
    let rendered = match cell {
        Data::Empty => String::new(),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 => {
                dt.format("%Y-%m-%d").to_string()
            }
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => cell.to_string(),
        },
        other => other.to_string(),
    };
    rendered.trim().to_string()
}
