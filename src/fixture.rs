//! Fixture files standing in for a live BBS.
//!
//! A fixture is a JSON document with the two record lists the BBS would
//! return. [`FixtureClient`] re-reads it on every call so a running agent
//! picks up edits, which makes it handy for local testing.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::action::Action;
use crate::client::{ActualLrpFilter, ClientError, DesiredLrpFilter, RemoteStateClient};
use crate::lrp::{RawActualLrp, RawDesiredLrp};
use crate::{AD_ENV_VAR, VCAP_SERVICES_ENV_VAR};

/// Root structure of a fixture file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureData {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub actual_lrps: Vec<RawActualLrp>,
    #[serde(default)]
    pub desired_lrps: Vec<RawDesiredLrp>,
}

/// Load fixture data from a JSON file.
pub fn load_fixture_from_file(path: &Path) -> Result<FixtureData, ClientError> {
    debug!("Loading fixture from: {}", path.display());

    let content = std::fs::read_to_string(path).map_err(|e| ClientError::Fixture {
        message: format!("cannot read {}: {e}", path.display()),
    })?;
    serde_json::from_str(&content).map_err(|e| ClientError::Fixture {
        message: format!("cannot parse {}: {e}", path.display()),
    })
}

/// Serves BBS records from a fixture file.
#[derive(Debug, Clone)]
pub struct FixtureClient {
    path: PathBuf,
}

impl FixtureClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<FixtureData, ClientError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_fixture_from_file(&path))
            .await
            .map_err(|e| ClientError::Fixture {
                message: e.to_string(),
            })?
    }
}

fn domain_matches(filter: Option<&str>, domain: &str) -> bool {
    filter.map_or(true, |wanted| wanted == domain)
}

#[async_trait]
impl RemoteStateClient for FixtureClient {
    async fn list_actual_lrps(
        &self,
        filter: &ActualLrpFilter,
    ) -> Result<Vec<RawActualLrp>, ClientError> {
        let data = self.load().await?;
        Ok(data
            .actual_lrps
            .into_iter()
            .filter(|lrp| domain_matches(filter.domain.as_deref(), &lrp.domain))
            .filter(|lrp| filter.cell_id.as_ref().map_or(true, |c| *c == lrp.cell_id))
            .collect())
    }

    async fn list_desired_lrps(
        &self,
        filter: &DesiredLrpFilter,
    ) -> Result<Vec<RawDesiredLrp>, ClientError> {
        let data = self.load().await?;
        Ok(data
            .desired_lrps
            .into_iter()
            .filter(|lrp| domain_matches(filter.domain.as_deref(), &lrp.domain))
            .filter(|lrp| {
                filter.process_guids.is_empty() || filter.process_guids.contains(&lrp.process_guid)
            })
            .collect())
    }
}

fn random_guid<R: Rng>(rng: &mut R) -> String {
    let bytes: [u8; 16] = rng.gen();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Generates a synthetic foundation with `apps` desired LRPs.
///
/// Every other app carries an auto-discovery payload with an `http_check`;
/// each app gets `instances_per_app` actual LRPs spread over a few cells.
pub fn generate_fixture<R: Rng>(rng: &mut R, apps: usize, instances_per_app: usize) -> FixtureData {
    let mut data = FixtureData {
        generated_at: Some(chrono::Utc::now().to_rfc3339()),
        ..FixtureData::default()
    };

    for n in 0..apps {
        let app_guid = random_guid(rng);
        let process_guid = format!("{app_guid}-{}", random_guid(rng));
        let name = format!("app-{n}");

        let mut env = vec![(VCAP_SERVICES_ENV_VAR.to_string(), json!({}).to_string())];
        if n % 2 == 0 {
            let instances = json!([{"name": name, "url": "http://%%host%%:%%port%%/health"}]);
            let mut ad = serde_json::Map::new();
            ad.insert(
                name.clone(),
                json!({
                    "check_names": "[\"http_check\"]",
                    "init_configs": "[{}]",
                    "instances": instances.to_string(),
                }),
            );
            env.push((AD_ENV_VAR.to_string(), Value::Object(ad).to_string()));
        }

        let run = Action::run(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let action = Action::Codependent(vec![Action::Timeout(Some(Box::new(run)))]);

        data.desired_lrps.push(RawDesiredLrp {
            process_guid: process_guid.clone(),
            domain: "cf-apps".to_string(),
            instances: instances_per_app as i32,
            action: Some(Action::Serial(vec![Action::Other, action])),
        });

        for index in 0..instances_per_app {
            data.actual_lrps.push(RawActualLrp {
                process_guid: process_guid.clone(),
                cell_id: format!("cell-z{}-{}", rng.gen_range(1..=3), rng.gen_range(0..4)),
                domain: "cf-apps".to_string(),
                instance_guid: random_guid(rng),
                index: index as i32,
                state: "RUNNING".to_string(),
            });
        }
    }

    data
}
