//! Recording fakes for the rotation collaborators

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use cdm_common::{CertificateId, DomainSet, ListenerId};

use super::state::{RotationState, StateStore, StateStoreError};
use super::workflow::{ReleasePolicy, RotationWorkflow};
use crate::acme::{AcmeError, CertificateAuthority, CertificateMaterial};
use crate::cloud::{CertificateStore, CloudError, ListenerManager};
use crate::registry::{DomainRegistry, RegistryError};

pub const TEST_RELEASE: ReleasePolicy = ReleasePolicy {
    poll_interval: Duration::from_secs(1),
    timeout: Duration::from_secs(5),
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchDomains,
    Obtain(DomainSet),
    Import,
    Attach(String),
    Detach(String),
    InUseBy(String),
    Delete(String),
    Save(Option<String>),
}

#[derive(Default)]
struct Behaviour {
    domains: DomainSet,
    fail_domains: bool,
    fail_obtain: bool,
    obtain_delay: Option<Duration>,
    fail_import: bool,
    fail_attach: bool,
    fail_detach: bool,
    fail_delete: bool,
    fail_save: bool,
    /// Remaining busy polls per certificate; `usize::MAX` never releases
    busy_polls: HashMap<String, usize>,
    issued: usize,
    saved: Option<RotationState>,
}

/// One fake standing in for every collaborator, recording calls in order
#[derive(Clone)]
pub struct Harness {
    calls: Arc<Mutex<Vec<Call>>>,
    behaviour: Arc<Mutex<Behaviour>>,
    listener: ListenerId,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            calls: Arc::default(),
            behaviour: Arc::default(),
            listener: ListenerId::new("listener-1"),
        }
    }

    pub fn workflow(&self) -> RotationWorkflow {
        RotationWorkflow::new(
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            TEST_RELEASE,
        )
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn saved(&self) -> Option<RotationState> {
        self.behaviour.lock().unwrap().saved.clone()
    }

    pub fn set_domains(&self, names: &[&str]) {
        self.behaviour.lock().unwrap().domains = names.iter().copied().collect();
    }

    pub fn fail_domains(&self) {
        self.behaviour.lock().unwrap().fail_domains = true;
    }

    pub fn fail_obtain(&self) {
        self.behaviour.lock().unwrap().fail_obtain = true;
    }

    /// Make every obtain take `delay` before answering
    pub fn slow_obtain(&self, delay: Duration) {
        self.behaviour.lock().unwrap().obtain_delay = Some(delay);
    }

    pub fn fail_import(&self) {
        self.behaviour.lock().unwrap().fail_import = true;
    }

    pub fn fail_attach(&self) {
        self.behaviour.lock().unwrap().fail_attach = true;
    }

    pub fn fail_detach(&self) {
        self.behaviour.lock().unwrap().fail_detach = true;
    }

    pub fn fail_delete(&self) {
        self.behaviour.lock().unwrap().fail_delete = true;
    }

    pub fn fail_save(&self) {
        self.behaviour.lock().unwrap().fail_save = true;
    }

    pub fn keep_in_use(&self, id: &str) {
        self.release_after(id, usize::MAX);
    }

    pub fn release_after(&self, id: &str, polls: usize) {
        self.behaviour
            .lock()
            .unwrap()
            .busy_polls
            .insert(id.to_string(), polls);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn cloud_error(operation: &'static str) -> CloudError {
        CloudError::new(operation, "test-region", "injected failure")
    }
}

#[async_trait]
impl CertificateAuthority for Harness {
    async fn obtain(&self, domains: &DomainSet) -> Result<CertificateMaterial, AcmeError> {
        self.record(Call::Obtain(domains.clone()));
        let (fail, delay) = {
            let behaviour = self.behaviour.lock().unwrap();
            (behaviour.fail_obtain, behaviour.obtain_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(AcmeError::OrderCreation("injected failure".to_string()));
        }
        Ok(CertificateMaterial {
            certificate: "leaf".to_string(),
            chain: "chain".to_string(),
            private_key: "key".to_string(),
        })
    }
}

#[async_trait]
impl CertificateStore for Harness {
    async fn import(&self, _material: CertificateMaterial) -> Result<CertificateId, CloudError> {
        self.record(Call::Import);
        let mut behaviour = self.behaviour.lock().unwrap();
        if behaviour.fail_import {
            return Err(Self::cloud_error("import"));
        }
        behaviour.issued += 1;
        Ok(CertificateId::new(format!("cert-{}", behaviour.issued)).unwrap())
    }

    async fn in_use_by(&self, id: &CertificateId) -> Result<Vec<String>, CloudError> {
        self.record(Call::InUseBy(id.to_string()));
        let mut behaviour = self.behaviour.lock().unwrap();
        match behaviour.busy_polls.get_mut(id.as_str()) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                Ok(vec!["listener-1".to_string()])
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn delete(&self, id: &CertificateId) -> Result<(), CloudError> {
        self.record(Call::Delete(id.to_string()));
        if self.behaviour.lock().unwrap().fail_delete {
            return Err(Self::cloud_error("delete"));
        }
        Ok(())
    }
}

#[async_trait]
impl ListenerManager for Harness {
    fn listener(&self) -> &ListenerId {
        &self.listener
    }

    async fn attach(&self, id: &CertificateId) -> Result<(), CloudError> {
        self.record(Call::Attach(id.to_string()));
        if self.behaviour.lock().unwrap().fail_attach {
            return Err(Self::cloud_error("attach"));
        }
        Ok(())
    }

    async fn detach(&self, id: &CertificateId) -> Result<(), CloudError> {
        self.record(Call::Detach(id.to_string()));
        if self.behaviour.lock().unwrap().fail_detach {
            return Err(Self::cloud_error("detach"));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for Harness {
    async fn load(&self) -> Result<RotationState, StateStoreError> {
        self.behaviour
            .lock()
            .unwrap()
            .saved
            .clone()
            .ok_or_else(|| StateStoreError::NotFound {
                location: self.location(),
            })
    }

    async fn save(&self, state: &RotationState) -> Result<(), StateStoreError> {
        self.record(Call::Save(
            state.certificate_id().map(|id| id.to_string()),
        ));
        let mut behaviour = self.behaviour.lock().unwrap();
        if behaviour.fail_save {
            return Err(StateStoreError::Backend {
                location: self.location(),
                message: "injected failure".to_string(),
            });
        }
        behaviour.saved = Some(state.clone());
        Ok(())
    }

    async fn probe(&self) -> Result<(), StateStoreError> {
        Ok(())
    }

    fn location(&self) -> String {
        "memory://state.json".to_string()
    }
}

#[async_trait]
impl DomainRegistry for Harness {
    async fn domains(&self) -> Result<DomainSet, RegistryError> {
        self.record(Call::FetchDomains);
        let behaviour = self.behaviour.lock().unwrap();
        if behaviour.fail_domains {
            return Err(RegistryError::Query {
                environment: "test".to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(behaviour.domains.clone())
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}
