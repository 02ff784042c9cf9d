pub mod prompt;
pub mod response_parser;
pub mod template;

pub use prompt::{build_prompt, build_request};
pub use response_parser::parse_response;

use crate::error::AppError;
use crate::models::{AnalysisRequest, AnalysisResult};
use crate::services::llm_agent::AnalysisTransport;

/// Sends one request through `transport` and parses whatever comes back.
///
/// Transport errors are returned as-is; a reply that does not follow the
/// template still produces a (possibly empty) result.
pub async fn run_analysis(
    transport: &dyn AnalysisTransport,
    request: &AnalysisRequest,
) -> Result<AnalysisResult, AppError> {
    let prompt = build_prompt(request);
    tracing::info!(
        "Sending analysis request: {} rows total, prompt {} chars",
        request.total_rows,
        prompt.len()
    );

    let llm_start = std::time::Instant::now();
    let text = transport.complete(&prompt).await?;
    tracing::info!("Model replied with {} chars in {:?}", text.len(), llm_start.elapsed());

    Ok(parse_response(&text))
}
