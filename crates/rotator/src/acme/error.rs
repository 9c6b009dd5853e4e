//! ACME error types

use thiserror::Error;

/// Errors raised while obtaining a certificate from the authority
#[derive(Error, Debug)]
pub enum AcmeError {
    #[error("no domains requested")]
    NoDomains,

    #[error("account registration failed: {0}")]
    AccountCreation(String),

    #[error("order creation failed: {0}")]
    OrderCreation(String),

    #[error("challenge failed for {identifier}: {message}")]
    ChallengeFailed { identifier: String, message: String },

    #[error("no HTTP-01 challenge offered for {0}")]
    NoHttp01Challenge(String),

    #[error("order finalization failed: {0}")]
    Finalization(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("certificate signing request generation failed: {0}")]
    Csr(String),

    #[error("challenge responder failed to bind port {port}: {source}")]
    ResponderBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid certificate bundle: {0}")]
    Bundle(String),

    #[error("ACME protocol error: {0}")]
    Protocol(#[from] instant_acme::Error),
}
