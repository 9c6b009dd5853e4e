//! ELBv2 listener certificate management

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_elasticloadbalancingv2::error::DisplayErrorContext;
use aws_sdk_elasticloadbalancingv2::types::Certificate;
use aws_sdk_elasticloadbalancingv2::Client;
use tracing::info;

use cdm_common::{CertificateId, ListenerId};

use super::{CloudError, ListenerManager};

/// Listener certificate list on an application load balancer
#[derive(Debug, Clone)]
pub struct ElbListenerManager {
    client: Client,
    listener: ListenerId,
    region: String,
}

impl ElbListenerManager {
    pub fn new(config: &SdkConfig, region: &str, listener: ListenerId) -> Self {
        Self {
            client: Client::new(config),
            listener,
            region: region.to_string(),
        }
    }

    fn certificate(id: &CertificateId) -> Certificate {
        Certificate::builder().certificate_arn(id.as_str()).build()
    }
}

#[async_trait]
impl ListenerManager for ElbListenerManager {
    fn listener(&self) -> &ListenerId {
        &self.listener
    }

    async fn attach(&self, id: &CertificateId) -> Result<(), CloudError> {
        self.client
            .add_listener_certificates()
            .listener_arn(self.listener.as_str())
            .certificates(Self::certificate(id))
            .send()
            .await
            .map_err(|e| {
                CloudError::new(
                    "elbv2:AddListenerCertificates",
                    &self.region,
                    DisplayErrorContext(e).to_string(),
                )
            })?;

        info!(listener_arn = %self.listener, arn = %id, "Certificate attached to listener");
        Ok(())
    }

    async fn detach(&self, id: &CertificateId) -> Result<(), CloudError> {
        self.client
            .remove_listener_certificates()
            .listener_arn(self.listener.as_str())
            .certificates(Self::certificate(id))
            .send()
            .await
            .map_err(|e| {
                CloudError::new(
                    "elbv2:RemoveListenerCertificates",
                    &self.region,
                    DisplayErrorContext(e).to_string(),
                )
            })?;

        info!(listener_arn = %self.listener, arn = %id, "Certificate detached from listener");
        Ok(())
    }
}
