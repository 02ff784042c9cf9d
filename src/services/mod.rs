pub mod analysis;
pub mod llm_agent;
pub mod report;
pub mod session;
pub mod sheet;
