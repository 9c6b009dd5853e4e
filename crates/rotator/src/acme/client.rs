//! ACME client wrapper around `instant-acme`
//!
//! One [`AcmeClient::obtain`] call runs a complete order: account
//! registration, HTTP-01 validation for every domain, finalization with a
//! freshly generated key, and download of the issued chain.

use std::time::Duration;

use async_trait::async_trait;
use instant_acme::{
    Account, AuthorizationStatus, ChallengeType, Identifier, NewAccount, NewOrder, Order,
    OrderStatus,
};
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use cdm_common::DomainSet;

use super::bundle::CertificateMaterial;
use super::challenge::{ChallengeManager, ChallengeResponder};
use super::error::AcmeError;
use super::CertificateAuthority;

/// Delay between order/authorization status polls
const POLL_DELAY: Duration = Duration::from_secs(2);

/// Maximum number of status polls before giving up
const MAX_POLL_ATTEMPTS: u32 = 30;

/// Settings for [`AcmeClient`]
#[derive(Debug, Clone)]
pub struct AcmeSettings {
    /// ACME directory URL
    pub directory_url: String,
    /// Account contact email
    pub email: String,
    /// Port the challenge responder binds during validation
    pub challenge_port: u16,
}

/// Certificate authority client speaking ACME with HTTP-01 validation
#[derive(Debug)]
pub struct AcmeClient {
    settings: AcmeSettings,
    challenges: ChallengeManager,
}

impl AcmeClient {
    pub fn new(settings: AcmeSettings) -> Self {
        info!(
            directory = %settings.directory_url,
            challenge_port = settings.challenge_port,
            "Created ACME client"
        );
        Self {
            settings,
            challenges: ChallengeManager::new(),
        }
    }

    async fn register_account(&self) -> Result<Account, AcmeError> {
        let contact = format!("mailto:{}", self.settings.email);
        let (account, _credentials) = Account::create(
            &NewAccount {
                contact: &[&contact],
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            &self.settings.directory_url,
            None,
        )
        .await
        .map_err(|e| AcmeError::AccountCreation(e.to_string()))?;

        debug!(email = %self.settings.email, "ACME account registered");
        Ok(account)
    }

    /// Register every pending HTTP-01 challenge and mark it ready.
    ///
    /// Returns the tokens registered so they can be removed afterwards.
    async fn prepare_challenges(&self, order: &mut Order) -> Result<Vec<String>, AcmeError> {
        let authorizations = order.authorizations().await?;
        let mut tokens = Vec::new();

        for authz in &authorizations {
            let Identifier::Dns(domain) = &authz.identifier;

            match &authz.status {
                AuthorizationStatus::Valid => {
                    trace!(domain = %domain, "Authorization already valid");
                    continue;
                }
                AuthorizationStatus::Pending => {}
                status => {
                    return Err(AcmeError::ChallengeFailed {
                        identifier: domain.clone(),
                        message: format!("authorization is {:?}", status),
                    });
                }
            }

            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Http01)
                .ok_or_else(|| AcmeError::NoHttp01Challenge(domain.clone()))?;

            let key_authorization = order.key_authorization(challenge);
            self.challenges
                .add_challenge(&challenge.token, key_authorization.as_str());
            tokens.push(challenge.token.clone());

            order.set_challenge_ready(&challenge.url).await?;
            debug!(domain = %domain, "HTTP-01 challenge ready");
        }

        Ok(tokens)
    }

    /// Poll until the authority has validated every authorization
    async fn wait_for_ready(&self, order: &mut Order) -> Result<(), AcmeError> {
        for attempt in 1..=MAX_POLL_ATTEMPTS {
            let status = order.refresh().await?.status.clone();
            match status {
                OrderStatus::Ready | OrderStatus::Valid => return Ok(()),
                OrderStatus::Invalid => {
                    let authorizations = order.authorizations().await?;
                    let failed = authorizations
                        .iter()
                        .filter(|a| a.status == AuthorizationStatus::Invalid)
                        .map(|a| {
                            let Identifier::Dns(domain) = &a.identifier;
                            domain.clone()
                        })
                        .collect::<Vec<_>>()
                        .join(",");
                    return Err(AcmeError::ChallengeFailed {
                        identifier: failed,
                        message: "order became invalid during validation".to_string(),
                    });
                }
                _ => {
                    trace!(attempt, status = ?status, "Order not ready yet");
                    tokio::time::sleep(POLL_DELAY).await;
                }
            }
        }
        Err(AcmeError::Timeout("challenge validation"))
    }

    /// Finalize with a fresh key and download the issued chain
    async fn finalize(
        &self,
        order: &mut Order,
        domains: &DomainSet,
    ) -> Result<CertificateMaterial, AcmeError> {
        let mut params =
            CertificateParams::new(domains.to_vec()).map_err(|e| AcmeError::Csr(e.to_string()))?;
        params.distinguished_name = DistinguishedName::new();
        let key = KeyPair::generate().map_err(|e| AcmeError::Csr(e.to_string()))?;
        let csr = params
            .serialize_request(&key)
            .map_err(|e| AcmeError::Csr(e.to_string()))?;

        order
            .finalize(csr.der())
            .await
            .map_err(|e| AcmeError::Finalization(e.to_string()))?;

        for attempt in 1..=MAX_POLL_ATTEMPTS {
            if let Some(full_chain) = order.certificate().await? {
                return CertificateMaterial::from_full_chain(&full_chain, key.serialize_pem());
            }
            if order.state().status == OrderStatus::Invalid {
                return Err(AcmeError::Finalization(
                    "order became invalid after finalization".to_string(),
                ));
            }
            trace!(attempt, "Certificate not issued yet");
            tokio::time::sleep(POLL_DELAY).await;
            order.refresh().await?;
        }
        Err(AcmeError::Timeout("certificate issuance"))
    }

    async fn run_order(&self, domains: &DomainSet) -> Result<CertificateMaterial, AcmeError> {
        let account = self.register_account().await?;

        let identifiers: Vec<Identifier> = domains
            .iter()
            .map(|d| Identifier::Dns(d.to_string()))
            .collect();
        let mut order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await
            .map_err(|e| AcmeError::OrderCreation(e.to_string()))?;

        let tokens = self.prepare_challenges(&mut order).await?;
        let validated = self.wait_for_ready(&mut order).await;
        for token in &tokens {
            self.challenges.remove_challenge(token);
        }
        validated?;

        self.finalize(&mut order, domains).await
    }
}

#[async_trait]
impl CertificateAuthority for AcmeClient {
    async fn obtain(&self, domains: &DomainSet) -> Result<CertificateMaterial, AcmeError> {
        if domains.is_empty() {
            return Err(AcmeError::NoDomains);
        }

        let start = Instant::now();
        info!(domains = %domains, directory = %self.settings.directory_url, "Requesting certificate");

        let responder =
            ChallengeResponder::start(self.settings.challenge_port, self.challenges.clone())
                .await?;
        let result = self.run_order(domains).await;
        responder.shutdown().await;
        self.challenges.clear();

        match &result {
            Ok(_) => info!(
                domains = %domains,
                elapsed_secs = start.elapsed().as_secs(),
                "Certificate issued"
            ),
            Err(e) => warn!(
                domains = %domains,
                error = %e,
                "Certificate request failed"
            ),
        }
        result
    }
}
