//! In-memory BBS used by unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::action::Action;
use crate::client::{ActualLrpFilter, ClientError, DesiredLrpFilter, RemoteStateClient};
use crate::lrp::{RawActualLrp, RawDesiredLrp};
use crate::{AD_ENV_VAR, VCAP_SERVICES_ENV_VAR};

pub const APP_GUID: &str = "9b2a6c3e-1f4d-4e8a-b7c0-5d6e7f8a9b0c";

pub fn process_guid(n: usize) -> String {
    format!("{APP_GUID}-{n:08}")
}

/// Desired LRP whose run action carries the given auto-discovery payload.
pub fn desired_lrp(process_guid: &str, ad: &str, vcap: &str) -> RawDesiredLrp {
    RawDesiredLrp {
        process_guid: process_guid.to_string(),
        domain: "cf-apps".to_string(),
        instances: 1,
        action: Some(Action::Serial(vec![Action::run([
            (AD_ENV_VAR, ad),
            (VCAP_SERVICES_ENV_VAR, vcap),
        ])])),
    }
}

pub fn actual_lrp(process_guid: &str, cell_id: &str) -> RawActualLrp {
    RawActualLrp {
        process_guid: process_guid.to_string(),
        cell_id: cell_id.to_string(),
        domain: "cf-apps".to_string(),
        ..RawActualLrp::default()
    }
}

/// Serves whatever records the test puts in, optionally failing either call.
#[derive(Default)]
pub struct ScriptedClient {
    pub actual: Mutex<Vec<RawActualLrp>>,
    pub desired: Mutex<Vec<RawDesiredLrp>>,
    pub fail_actual: AtomicBool,
    pub fail_desired: AtomicBool,
    pub calls: AtomicUsize,
    /// When non-zero, every record is stamped with this cycle tag.
    pub tag: AtomicU64,
}

impl ScriptedClient {
    pub fn with_records(actual: Vec<RawActualLrp>, desired: Vec<RawDesiredLrp>) -> Self {
        Self {
            actual: Mutex::new(actual),
            desired: Mutex::new(desired),
            ..Self::default()
        }
    }

    pub fn set_records(&self, actual: Vec<RawActualLrp>, desired: Vec<RawDesiredLrp>) {
        *self.actual.lock().expect("lock") = actual;
        *self.desired.lock().expect("lock") = desired;
    }
}

fn unavailable() -> ClientError {
    ClientError::Request {
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl RemoteStateClient for ScriptedClient {
    async fn list_actual_lrps(
        &self,
        _filter: &ActualLrpFilter,
    ) -> Result<Vec<RawActualLrp>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_actual.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let tag = self.tag.load(Ordering::SeqCst);
        let mut records = self.actual.lock().expect("lock").clone();
        if tag > 0 {
            for record in &mut records {
                record.cell_id = format!("cell-{tag}");
            }
        }
        Ok(records)
    }

    async fn list_desired_lrps(
        &self,
        _filter: &DesiredLrpFilter,
    ) -> Result<Vec<RawDesiredLrp>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_desired.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let tag = self.tag.load(Ordering::SeqCst);
        let records = self.desired.lock().expect("lock").clone();
        if tag > 0 {
            return Ok(records
                .into_iter()
                .map(|r| desired_lrp(&r.process_guid, "", &format!("cell-{tag}")))
                .collect());
        }
        Ok(records)
    }
}
