//! Pipeline processor
//!
//! Analyses pipeline performance once a pipeline has finished.

use crate::event::{Event, EventProcessor, EventType, ProcessorCounters, ProcessorError};
use crate::processors::PipelineAnalyzer;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const FINISHED_STATUSES: [&str; 2] = ["success", "failed"];

pub struct PipelineProcessor {
    analyzer: Arc<dyn PipelineAnalyzer>,
    counters: ProcessorCounters,
}

impl PipelineProcessor {
    pub fn new(analyzer: Arc<dyn PipelineAnalyzer>) -> Self {
        Self {
            analyzer,
            counters: ProcessorCounters::new(),
        }
    }
}

#[async_trait]
impl EventProcessor for PipelineProcessor {
    fn event_type(&self) -> EventType {
        EventType::Pipeline
    }

    fn counters(&self) -> &ProcessorCounters {
        &self.counters
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, project_id = event.project_id))]
    async fn process(&self, event: &Event) -> Result<bool, ProcessorError> {
        let Some(payload) = event.data.as_object() else {
            warn!("Pipeline payload is not a JSON object");
            return Ok(false);
        };

        let attributes = payload
            .get("object_attributes")
            .and_then(|v| v.as_object());
        let status = attributes
            .and_then(|a| a.get("status"))
            .and_then(|v| v.as_str());
        let pipeline_id = attributes
            .and_then(|a| a.get("id"))
            .and_then(|v| v.as_i64());

        info!(status = ?status, pipeline_id = ?pipeline_id, "Processing pipeline event");

        let finished = status.is_some_and(|s| FINISHED_STATUSES.contains(&s));
        let Some(pipeline_id) = pipeline_id.filter(|_| finished) else {
            return Ok(true);
        };

        match self
            .analyzer
            .analyze_pipeline_performance(event.project_id, pipeline_id)
            .await
        {
            Ok(analysis) => {
                info!(
                    pipeline_id,
                    optimization_score = analysis.overall_score,
                    recommendations_count = analysis.recommendations.len(),
                    "Pipeline optimization analysis completed"
                );
            }
            Err(e) => {
                warn!(pipeline_id, error = %e, "Pipeline optimization analysis failed");
            }
        }

        Ok(true)
    }
}
