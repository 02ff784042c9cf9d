use serde::{Deserialize, Serialize};

/// Normalized contents of one uploaded file.
///
/// Every row has exactly `headers.len()` cells; the parser pads short rows
/// with empty strings and truncates long ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table, normalizing every row to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Numeric,
    Label,
    Temporal,
    Unclassified,
}

/// First matching column per role. Roles are assigned independently, so the
/// same index may show up under more than one role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColumnRoles {
    pub numeric: Option<usize>,
    pub label: Option<usize>,
    pub temporal: Option<usize>,
}

impl ColumnRoles {
    pub fn get(&self, role: ColumnRole) -> Option<usize> {
        match role {
            ColumnRole::Numeric => self.numeric,
            ColumnRole::Label => self.label,
            ColumnRole::Temporal => self.temporal,
            ColumnRole::Unclassified => None,
        }
    }

    /// Roles claimed by `column`, or `[Unclassified]` when none match.
    pub fn roles_of(&self, column: usize) -> Vec<ColumnRole> {
        let roles: Vec<ColumnRole> = [ColumnRole::Numeric, ColumnRole::Label, ColumnRole::Temporal]
            .into_iter()
            .filter(|role| self.get(*role) == Some(column))
            .collect();
        if roles.is_empty() {
            vec![ColumnRole::Unclassified]
        } else {
            roles
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    BarTop8,
    LineByPeriod,
    PieTop6,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub key: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub kind: ChartKind,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartSet {
    /// Header of the summed column, used as the chart caption.
    pub value_label: Option<String>,
    pub bar: Option<ChartSeries>,
    pub line: Option<ChartSeries>,
    pub pie: Option<ChartSeries>,
}

impl ChartSet {
    pub fn has_charts(&self) -> bool {
        self.bar.is_some() || self.line.is_some()
    }
}

/// User-chosen context sent along with the data sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub industry: String,
    pub period: String,
    pub company_name: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            industry: "retail".to_string(),
            period: "last_year".to_string(),
            company_name: None,
        }
    }
}

impl AnalysisConfig {
    /// The company name with surrounding whitespace removed; blank counts as absent.
    pub fn company(&self) -> Option<&str> {
        self.company_name.as_deref().map(str::trim).filter(|name| !name.is_empty())
    }

    pub fn normalized(self) -> Self {
        Self {
            company_name: self.company().map(str::to_string),
            ..self
        }
    }
}

/// Everything the prompt needs, captured once per analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub csv_sample: String,
    pub total_rows: usize,
    pub headers: Vec<String>,
    pub industry: String,
    pub period: String,
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub label: String,
    pub value: String,
}

/// The four metric slots of the stats line, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyMetrics {
    pub revenue: Option<Metric>,
    pub top_product: Option<Metric>,
    pub growth: Option<Metric>,
    pub risk: Option<Metric>,
}

impl KeyMetrics {
    /// Present slots in display order.
    pub fn present(&self) -> Vec<&Metric> {
        [&self.revenue, &self.top_product, &self.growth, &self.risk]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Sections {
    pub executive_summary: Option<String>,
    pub key_findings: Option<String>,
    pub risk_factors: Option<String>,
    pub quick_wins: Option<String>,
}

impl Sections {
    pub fn is_empty(&self) -> bool {
        self.executive_summary.is_none()
            && self.key_findings.is_none()
            && self.risk_factors.is_none()
            && self.quick_wins.is_none()
    }
}

/// Structured outcome of one model call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub stats: Option<KeyMetrics>,
    pub recommendations: Vec<String>,
    pub sections: Sections,
    pub raw_text: String,
}
