//! Templates endpoint handler.
//!
//! Serves the config templates extracted from the current snapshot as JSON.

use axum::{extract::State, Json};
use bbs_discovery::ConfigTemplate;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct TemplateError {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    pub generation: u64,
    pub up_to_date: bool,
    pub templates: Vec<ConfigTemplate>,
    pub errors: Vec<TemplateError>,
}

/// Handler for the /templates endpoint.
#[instrument(skip(state))]
pub async fn templates_handler(State(state): State<SharedState>) -> Json<TemplatesResponse> {
    // sampled before collecting, so it tells whether this call saw anything new
    let up_to_date = state.collector.is_up_to_date();
    let collection = state.collector.collect_with_errors();
    debug!(
        "Serving {} template(s) from generation {}",
        collection.templates.len(),
        collection.generation
    );

    Json(TemplatesResponse {
        generation: collection.generation,
        up_to_date,
        templates: collection.templates,
        errors: collection
            .errors
            .iter()
            .map(|e| TemplateError {
                kind: e.kind(),
                message: e.to_string(),
            })
            .collect(),
    })
}
