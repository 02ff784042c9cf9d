use serde_json::json;

use super::template::{
    emphasized, SectionName, METRIC_KEYS, RECOMMENDATIONS_HEADING, RECOMMENDATION_COUNT,
    STATS_MARKER,
};
use crate::error::AppError;
use crate::models::{AnalysisConfig, AnalysisRequest, Table};

/// Data rows included in the sample sent to the model.
pub const SAMPLE_ROWS: usize = 100;

pub fn industry_label(code: &str) -> &str {
    match code {
        "retail" => "Retail",
        "ecommerce" => "E-Commerce",
        "food" => "Food & Beverage",
        "tech" => "Technology / SaaS",
        "mfg" => "Manufacturing",
        other => other,
    }
}

pub fn period_label(code: &str) -> &str {
    match code {
        "last_week" => "last week",
        "last_month" => "last month",
        "last_quarter" => "last quarter",
        "last_year" => "last year",
        other => other,
    }
}

/// Header plus at most `max_rows` data rows as CSV, quoting fields that
/// need it.
pub fn csv_sample(table: &Table, max_rows: usize) -> Result<String, AppError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&table.headers)?;
    for row in table.rows.iter().take(max_rows) {
        writer.write_record(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV sample: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| AppError::Internal(format!("CSV sample is not UTF-8: {}", e)))?;
    Ok(text.trim_end_matches('\n').to_string())
}

pub fn build_request(table: &Table, config: &AnalysisConfig) -> Result<AnalysisRequest, AppError> {
    Ok(AnalysisRequest {
        csv_sample: csv_sample(table, SAMPLE_ROWS)?,
        total_rows: table.row_count(),
        headers: table.headers.clone(),
        industry: config.industry.clone(),
        period: config.period.clone(),
        company_name: config.company().map(str::to_string),
    })
}

fn example_stats_line() -> String {
    let examples = [
        ("Total Revenue", "$X,XXX"),
        ("Top Product", "Name"),
        ("Growth Opportunity", "X%"),
        ("Risk Alert", "Brief note"),
    ];
    let mut stats = serde_json::Map::new();
    for ((label_key, value_key), (label, value)) in METRIC_KEYS.iter().zip(examples) {
        stats.insert(label_key.to_string(), json!(label));
        stats.insert(value_key.to_string(), json!(value));
    }
    format!("{}{}", STATS_MARKER, serde_json::Value::Object(stats))
}

fn output_template() -> String {
    let numbered: Vec<String> = (1..=RECOMMENDATION_COUNT)
        .map(|n| format!("{}. Specific action, with the expected revenue or profit impact", n))
        .collect();

    [
        example_stats_line(),
        String::new(),
        emphasized(SectionName::ExecutiveSummary.heading()),
        "Write 2-3 sentences summarizing overall business performance based on the data.".to_string(),
        String::new(),
        emphasized(SectionName::KeyFindings.heading()),
        "- Finding 1 with specific numbers from data".to_string(),
        "- Finding 2 with specific numbers from data".to_string(),
        "- Finding 3 with specific numbers from data".to_string(),
        "- Finding 4 with specific numbers from data".to_string(),
        String::new(),
        emphasized(RECOMMENDATIONS_HEADING),
        numbered.join("\n"),
        String::new(),
        emphasized(SectionName::RiskFactors.heading()),
        "- Risk 1: description and how to mitigate".to_string(),
        "- Risk 2: description and how to mitigate".to_string(),
        "- Risk 3: description and how to mitigate".to_string(),
        String::new(),
        emphasized(SectionName::QuickWins.heading()),
        "- Action 1: something to do THIS WEEK for an immediate revenue boost".to_string(),
        "- Action 2: something to do THIS WEEK for an immediate revenue boost".to_string(),
        "- Action 3: something to do THIS WEEK for an immediate revenue boost".to_string(),
    ]
    .join("\n")
}

/// Renders the single user message sent to the model.
pub fn build_prompt(request: &AnalysisRequest) -> String {
    let company = request
        .company_name
        .as_deref()
        .map(|name| format!(" Company: {}.", name))
        .unwrap_or_default();

    format!(
        r#"You are an expert business analyst and sales strategist.{company} Industry: {industry}. Data period: {period}.

Here is their sales data CSV sample (up to {sample_rows} rows):
```
{csv}
```

Total rows in full dataset: {total_rows}
Columns: {columns}

Please analyze this data thoroughly and provide a structured response in EXACTLY this format.
The {marker} line must be a single line of valid JSON. Use the headings exactly as written and
give exactly {count} numbered recommendations.

{template}

Be specific, data-driven, and practical. Use actual numbers from the data wherever possible."#,
        company = company,
        industry = industry_label(&request.industry),
        period = period_label(&request.period),
        sample_rows = SAMPLE_ROWS,
        csv = request.csv_sample,
        total_rows = request.total_rows,
        columns = request.headers.join(", "),
        marker = STATS_MARKER,
        count = RECOMMENDATION_COUNT,
        template = output_template(),
    )
}
