//! Export hand-off for a completed analysis.
//!
//! The document carries the report's content in print order. Page layout
//! and rendering are left to the consumer; [`footer_text`] gives the footer
//! line for each page once the page count is known.

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;

use crate::models::{AnalysisResult, Metric};
use crate::services::analysis::template::{SectionName, RECOMMENDATIONS_HEADING};
use crate::services::session::CompletedAnalysis;

pub const REPORT_TITLE: &str = "SalesAI Analyzer";
pub const REPORT_SUBTITLE: &str = "AI-Powered Sales Insights Report";
pub const METRICS_HEADING: &str = "KEY METRICS";
/// Footer stamped on every page; the renderer fills in `{page}` and `{total}`.
pub const FOOTER_TEMPLATE: &str = "SalesAI Analyzer  ·  Page {page} of {total}  ·  Confidential";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberedItem {
    pub marker: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportBlock {
    Section { title: String, body: String },
    NumberedList { title: String, items: Vec<NumberedItem> },
}

impl ReportBlock {
    pub fn title(&self) -> &str {
        match self {
            ReportBlock::Section { title, .. } | ReportBlock::NumberedList { title, .. } => title,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub title: String,
    pub subtitle: String,
    pub generated_at: String,
    pub company_name: Option<String>,
    pub source_file: String,
    pub metrics_heading: Option<String>,
    pub metrics: Vec<Metric>,
    pub blocks: Vec<ReportBlock>,
    pub footer: String,
    pub download_name: String,
    pub result: AnalysisResult,
}

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format("%d %b %Y  |  %H:%M:%S").to_string()
}

pub fn footer_text(page: usize, total: usize) -> String {
    FOOTER_TEMPLATE
        .replace("{page}", &page.to_string())
        .replace("{total}", &total.to_string())
}

pub fn download_name(date: NaiveDate) -> String {
    format!("SalesAI_Report_{}.pdf", date.format("%Y-%m-%d"))
}

/// Ordered blocks: summary, recommendations, findings, risks, quick wins.
/// Absent sections and an empty recommendation list produce no block.
pub fn report_blocks(result: &AnalysisResult) -> Vec<ReportBlock> {
    let section = |name: SectionName| {
        result.sections.get(name).map(|body| ReportBlock::Section {
            title: name.heading().to_string(),
            body: body.to_string(),
        })
    };

    let recommendations = (!result.recommendations.is_empty()).then(|| ReportBlock::NumberedList {
        title: RECOMMENDATIONS_HEADING.to_string(),
        items: result
            .recommendations
            .iter()
            .enumerate()
            .map(|(i, text)| NumberedItem {
                marker: format!("{:02}", i + 1),
                text: text.clone(),
            })
            .collect(),
    });

    [
        section(SectionName::ExecutiveSummary),
        recommendations,
        section(SectionName::KeyFindings),
        section(SectionName::RiskFactors),
        section(SectionName::QuickWins),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn build_report(analysis: &CompletedAnalysis) -> ReportDocument {
    let metrics: Vec<Metric> = analysis
        .result
        .stats
        .as_ref()
        .map(|stats| stats.present().into_iter().cloned().collect())
        .unwrap_or_default();

    ReportDocument {
        title: REPORT_TITLE.to_string(),
        subtitle: REPORT_SUBTITLE.to_string(),
        generated_at: format_timestamp(&analysis.completed_at),
        company_name: analysis.config.company_name.clone(),
        source_file: analysis.file_name.clone(),
        metrics_heading: (!metrics.is_empty()).then(|| METRICS_HEADING.to_string()),
        metrics,
        blocks: report_blocks(&analysis.result),
        footer: FOOTER_TEMPLATE.to_string(),
        download_name: download_name(analysis.completed_at.date_naive()),
        result: analysis.result.clone(),
    }
}
