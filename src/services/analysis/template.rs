//! The textual contract shared by the prompt and the response parser.
//!
//! The prompt asks the model to answer in exactly this layout and the parser
//! reads it back, so both sides take their markers from here.

use crate::models::Sections;

/// Prefix of the single line carrying the metrics JSON object.
pub const STATS_MARKER: &str = "STATS_JSON:";

pub const RECOMMENDATIONS_HEADING: &str = "TOP 5 RECOMMENDATIONS";
/// Word that identifies the recommendations heading even if the count drifts.
pub const RECOMMENDATIONS_KEYWORD: &str = "RECOMMENDATIONS";
pub const RECOMMENDATION_COUNT: usize = 5;

/// JSON keys of the four metric slots, in slot order.
pub const METRIC_KEYS: [(&str, &str); 4] = [
    ("metric1_label", "metric1_value"),
    ("metric2_label", "metric2_value"),
    ("metric3_label", "metric3_value"),
    ("metric4_label", "metric4_value"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionName {
    ExecutiveSummary,
    KeyFindings,
    RiskFactors,
    QuickWins,
}

impl SectionName {
    pub const ALL: [SectionName; 4] = [
        SectionName::ExecutiveSummary,
        SectionName::KeyFindings,
        SectionName::RiskFactors,
        SectionName::QuickWins,
    ];

    pub fn heading(self) -> &'static str {
        match self {
            SectionName::ExecutiveSummary => "EXECUTIVE SUMMARY",
            SectionName::KeyFindings => "KEY FINDINGS",
            SectionName::RiskFactors => "RISK FACTORS",
            SectionName::QuickWins => "QUICK WINS",
        }
    }

    pub fn from_title(title: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.heading().eq_ignore_ascii_case(title.trim()))
    }
}

pub fn is_recommendations_title(title: &str) -> bool {
    title.to_ascii_uppercase().contains(RECOMMENDATIONS_KEYWORD)
}

/// Heading line as the model is asked to write it.
pub fn emphasized(title: &str) -> String {
    format!("**{}**", title)
}

impl Sections {
    pub fn get(&self, name: SectionName) -> Option<&str> {
        match name {
            SectionName::ExecutiveSummary => self.executive_summary.as_deref(),
            SectionName::KeyFindings => self.key_findings.as_deref(),
            SectionName::RiskFactors => self.risk_factors.as_deref(),
            SectionName::QuickWins => self.quick_wins.as_deref(),
        }
    }

    pub fn set(&mut self, name: SectionName, body: String) {
        let slot = match name {
            SectionName::ExecutiveSummary => &mut self.executive_summary,
            SectionName::KeyFindings => &mut self.key_findings,
            SectionName::RiskFactors => &mut self.risk_factors,
            SectionName::QuickWins => &mut self.quick_wins,
        };
        *slot = Some(body);
    }
}
