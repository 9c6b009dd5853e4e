//! ACM-backed certificate store

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_acm::error::DisplayErrorContext;
use aws_sdk_acm::primitives::Blob;
use aws_sdk_acm::Client;
use tracing::{debug, info};

use cdm_common::CertificateId;

use super::{CertificateStore, CloudError};
use crate::acme::CertificateMaterial;

/// Certificate store on AWS Certificate Manager
#[derive(Debug, Clone)]
pub struct AcmCertificateStore {
    client: Client,
    region: String,
}

impl AcmCertificateStore {
    pub fn new(config: &SdkConfig, region: &str) -> Self {
        Self {
            client: Client::new(config),
            region: region.to_string(),
        }
    }

    fn error(&self, operation: &'static str, err: impl std::error::Error) -> CloudError {
        CloudError::new(operation, &self.region, DisplayErrorContext(err).to_string())
    }
}

#[async_trait]
impl CertificateStore for AcmCertificateStore {
    async fn import(&self, material: CertificateMaterial) -> Result<CertificateId, CloudError> {
        let CertificateMaterial {
            certificate,
            chain,
            private_key,
        } = material;

        let mut request = self
            .client
            .import_certificate()
            .certificate(Blob::new(certificate.into_bytes()))
            .private_key(Blob::new(private_key.into_bytes()));
        if !chain.is_empty() {
            request = request.certificate_chain(Blob::new(chain.into_bytes()));
        }

        let output = request
            .send()
            .await
            .map_err(|e| self.error("acm:ImportCertificate", e))?;

        let id = output
            .certificate_arn()
            .and_then(CertificateId::new)
            .ok_or_else(|| {
                CloudError::new(
                    "acm:ImportCertificate",
                    &self.region,
                    "response carried no certificate ARN",
                )
            })?;

        info!(arn = %id, region = %self.region, "Certificate imported into ACM");
        Ok(id)
    }

    async fn in_use_by(&self, id: &CertificateId) -> Result<Vec<String>, CloudError> {
        let output = self
            .client
            .describe_certificate()
            .certificate_arn(id.as_str())
            .send()
            .await
            .map_err(|e| self.error("acm:DescribeCertificate", e))?;

        let users = output
            .certificate()
            .map(|detail| detail.in_use_by().to_vec())
            .unwrap_or_default();

        debug!(arn = %id, in_use_by = users.len(), "Described certificate");
        Ok(users)
    }

    async fn delete(&self, id: &CertificateId) -> Result<(), CloudError> {
        self.client
            .delete_certificate()
            .certificate_arn(id.as_str())
            .send()
            .await
            .map_err(|e| self.error("acm:DeleteCertificate", e))?;

        info!(arn = %id, region = %self.region, "Certificate deleted from ACM");
        Ok(())
    }
}
