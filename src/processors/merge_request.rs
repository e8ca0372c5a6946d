//! Merge request processor
//!
//! Runs MR triage for newly opened or reopened merge requests. Triage is
//! best-effort enrichment: its failures are logged and the event is still
//! acknowledged.

use crate::event::{Event, EventProcessor, EventType, ProcessorCounters, ProcessorError};
use crate::processors::MergeRequestAnalyzer;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Actions that trigger triage; other actions would only repeat it
const TRIAGE_ACTIONS: [&str; 2] = ["opened", "reopened"];

pub struct MergeRequestProcessor {
    analyzer: Arc<dyn MergeRequestAnalyzer>,
    counters: ProcessorCounters,
}

impl MergeRequestProcessor {
    pub fn new(analyzer: Arc<dyn MergeRequestAnalyzer>) -> Self {
        Self {
            analyzer,
            counters: ProcessorCounters::new(),
        }
    }
}

#[async_trait]
impl EventProcessor for MergeRequestProcessor {
    fn event_type(&self) -> EventType {
        EventType::MergeRequest
    }

    fn counters(&self) -> &ProcessorCounters {
        &self.counters
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, project_id = event.project_id))]
    async fn process(&self, event: &Event) -> Result<bool, ProcessorError> {
        let Some(payload) = event.data.as_object() else {
            warn!("Merge request payload is not a JSON object");
            return Ok(false);
        };

        let attributes = payload
            .get("object_attributes")
            .and_then(|v| v.as_object());
        let action = attributes
            .and_then(|a| a.get("action"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let mr_iid = attributes
            .and_then(|a| a.get("iid"))
            .and_then(|v| v.as_i64());
        let title: String = attributes
            .and_then(|a| a.get("title"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .chars()
            .take(50)
            .collect();

        info!(action = %action, mr_iid = ?mr_iid, title = %title, "Processing MR event");

        let Some(mr_iid) = mr_iid.filter(|_| TRIAGE_ACTIONS.contains(&action)) else {
            return Ok(true);
        };

        match self
            .analyzer
            .analyze_merge_request(event.project_id, mr_iid)
            .await
        {
            Ok(analysis) => {
                info!(
                    mr_iid,
                    risk_level = %analysis.risk_level,
                    mr_type = %analysis.mr_type,
                    estimated_hours = analysis.estimated_review_hours,
                    "MR triage analysis completed"
                );
            }
            Err(e) => {
                warn!(mr_iid, error = %e, "MR triage analysis failed");
            }
        }

        Ok(true)
    }
}
