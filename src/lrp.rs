//! Actual and desired LRP records.
//!
//! Raw records are what the BBS API returns. They are projected into the
//! flat [`ActualInstance`] / [`DesiredInstance`] values that the cache
//! publishes; projection never mutates a record in place.

use serde::{Deserialize, Serialize};

use crate::action::{extract_env, Action};
use crate::error::DiscoveryError;

/// Length of an app GUID, which prefixes every process GUID.
pub const APP_GUID_LEN: usize = 36;

/// Actual LRP as returned by `/v1/actual_lrps/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawActualLrp {
    pub process_guid: String,
    #[serde(default)]
    pub cell_id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub instance_guid: String,
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub state: String,
}

/// Desired LRP as returned by `/v1/desired_lrps/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDesiredLrp {
    pub process_guid: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub instances: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

/// One running instance of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActualInstance {
    pub app_guid: String,
    pub cell_id: String,
    pub process_guid: String,
}

/// Operator-declared state of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredInstance {
    pub app_guid: String,
    pub process_guid: String,
    /// Raw `AD_DATADOGHQ_COM` value, empty when unset.
    pub env_ad: String,
    /// Raw `VCAP_SERVICES` value, empty when unset.
    pub env_vcap_services: String,
}

/// Returns the app GUID a process GUID starts with.
///
/// This is a fixed slice of the first [`APP_GUID_LEN`] bytes, not a parse.
pub fn app_guid_from_process_guid(process_guid: &str) -> Result<&str, DiscoveryError> {
    process_guid
        .get(..APP_GUID_LEN)
        .ok_or_else(|| DiscoveryError::IdentifierFormat {
            process_guid: process_guid.to_string(),
            expected: APP_GUID_LEN,
        })
}

impl TryFrom<&RawActualLrp> for ActualInstance {
    type Error = DiscoveryError;

    fn try_from(lrp: &RawActualLrp) -> Result<Self, Self::Error> {
        Ok(ActualInstance {
            app_guid: app_guid_from_process_guid(&lrp.process_guid)?.to_string(),
            cell_id: lrp.cell_id.clone(),
            process_guid: lrp.process_guid.clone(),
        })
    }
}

impl TryFrom<&RawDesiredLrp> for DesiredInstance {
    type Error = DiscoveryError;

    fn try_from(lrp: &RawDesiredLrp) -> Result<Self, Self::Error> {
        let app_guid = app_guid_from_process_guid(&lrp.process_guid)?.to_string();
        let env = extract_env(lrp.action.as_ref());

        Ok(DesiredInstance {
            app_guid,
            process_guid: lrp.process_guid.clone(),
            env_ad: env.ad,
            env_vcap_services: env.vcap_services,
        })
    }
}
