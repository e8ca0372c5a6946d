//! Concrete event processors and the analysis services they call
//!
//! The analysis services (MR triage, pipeline optimisation) live outside
//! this crate; processors only see them through the traits below.

pub mod merge_request;
pub mod pipeline;

pub use merge_request::MergeRequestProcessor;
pub use pipeline::PipelineProcessor;

use async_trait::async_trait;
use serde::Serialize;

/// Failure reported by an external analysis service
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("analysis service error: {0}")]
    Upstream(String),
}

/// Summary of an MR triage run
#[derive(Debug, Clone, Serialize)]
pub struct MergeRequestAnalysis {
    pub risk_level: String,
    pub mr_type: String,
    pub estimated_review_hours: f64,
}

/// Summary of a pipeline performance analysis
#[derive(Debug, Clone, Serialize)]
pub struct PipelineAnalysis {
    /// 0-100 optimisation score
    pub overall_score: f64,
    pub recommendations: Vec<String>,
}

#[async_trait]
pub trait MergeRequestAnalyzer: Send + Sync {
    async fn analyze_merge_request(
        &self,
        project_id: i64,
        mr_iid: i64,
    ) -> Result<MergeRequestAnalysis, AnalysisError>;
}

#[async_trait]
pub trait PipelineAnalyzer: Send + Sync {
    async fn analyze_pipeline_performance(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<PipelineAnalysis, AnalysisError>;
}

/// Analyzer used when no analysis backend is wired in
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalyzer;

#[async_trait]
impl MergeRequestAnalyzer for NoopAnalyzer {
    async fn analyze_merge_request(
        &self,
        _project_id: i64,
        _mr_iid: i64,
    ) -> Result<MergeRequestAnalysis, AnalysisError> {
        Ok(MergeRequestAnalysis {
            risk_level: "unknown".to_string(),
            mr_type: "unknown".to_string(),
            estimated_review_hours: 0.0,
        })
    }
}

#[async_trait]
impl PipelineAnalyzer for NoopAnalyzer {
    async fn analyze_pipeline_performance(
        &self,
        _project_id: i64,
        _pipeline_id: i64,
    ) -> Result<PipelineAnalysis, AnalysisError> {
        Ok(PipelineAnalysis {
            overall_score: 0.0,
            recommendations: Vec::new(),
        })
    }
}
