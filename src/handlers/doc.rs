//! Documentation endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /doc endpoint.
#[instrument(skip(state))]
pub async fn doc_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /doc request");

    let version = env!("CARGO_PKG_VERSION");
    let port = state.config.port.unwrap_or(crate::config::DEFAULT_PORT);
    let doc = format!(
        r#"BBS DISCOVERY - DOCUMENTATION
=============================

VERSION: {version}
DESCRIPTION: Cloud Foundry BBS state cache and auto-discovery config provider

HTTP ENDPOINTS
--------------
GET /metrics     - Prometheus metrics endpoint
GET /health      - Cache freshness and refresh statistics (plain text)
GET /templates   - Extracted config templates (JSON)
GET /doc         - This documentation (plain text)

AUTO-DISCOVERY PAYLOAD
----------------------
Each desired LRP may carry an AD_DATADOGHQ_COM environment variable on one
of its run actions. The value is a JSON object keyed by template name:

  {{"web": {{"check_names": ["http_check"],
            "init_configs": [{{}}],
            "instances": [{{"url": "http://%%host%%:%%port%%"}}]}}}}

Each of the three fields may also be a JSON string holding the array.
The template id is <process_guid>/<key>.

AVAILABLE METRICS
-----------------
bbs_discovery_snapshot_generation              - Generation of the published snapshot
bbs_discovery_actual_lrps                      - Actual LRPs in the snapshot
bbs_discovery_desired_lrps                     - Desired LRPs in the snapshot
bbs_discovery_desired_lrps_with_ad             - Desired LRPs with an AD payload
bbs_discovery_config_templates                 - Extracted config templates
bbs_discovery_template_errors{{kind}}            - Extraction errors by kind
bbs_discovery_refresh_duration_seconds         - Duration of the last refresh
bbs_discovery_refresh_success                  - Last refresh succeeded (1) or failed (0)
bbs_discovery_refresh_failures                 - Failed refreshes since start
bbs_discovery_refresh_consecutive_failures     - Failed refreshes in a row
bbs_discovery_last_success_timestamp_seconds   - Unix time of the last good refresh
bbs_discovery_skipped_records                  - Records dropped for bad process GUIDs

CONFIGURATION
-------------
Config file locations (in order):
1. CLI specified: -c /path/to/config.yaml
2. /etc/bbs-discovery/bbs-discovery.{{yaml,yml,json}}
3. ./bbs-discovery.{{yaml,yml,json}}

Key configuration options:
- bbs_url: BBS API endpoint (default: https://bbs.service.cf.internal:8889)
- bbs_domain: only list LRPs of this domain
- poll_interval_secs: seconds between refreshes (default: 3)
- request_timeout_secs: per-request timeout (default: 5)
- retries: retries per request (default: 10)
- fixture_file: serve records from a JSON fixture instead of the BBS

CLI COMMANDS
------------
bbs-discovery                                  - Start the service
bbs-discovery collect                          - Refresh once and print templates
bbs-discovery config -o config.yaml            - Generate config file
bbs-discovery generate-fixture -o fixture.json - Generate a synthetic fixture
bbs-discovery --help                           - Show all CLI options

EXAMPLE USAGE
-------------
curl http://localhost:{port}/templates
curl http://localhost:{port}/metrics
curl http://localhost:{port}/health

{FOOTER_TEXT}
"#
    );

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        doc,
    )
}
