//! Service-account credentials handed to the remote spreadsheet service.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while reading a credentials document.
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Invalid credentials document: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Credentials are missing '{field}'")]
    Incomplete { field: &'static str },
}

/// Service-account key material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub private_key: String,
}

impl Credentials {
    /// Parses the JSON credentials document stored by the host and checks that both
    /// key fields are present.
    pub fn from_json(document: &str) -> Result<Self, CredentialsError> {
        let credentials: Credentials = serde_json::from_str(document)?;
        credentials.validate()?;
        Ok(credentials)
    }

    pub fn validate(&self) -> Result<(), CredentialsError> {
        if self.client_email.trim().is_empty() {
            Err(CredentialsError::Incomplete { field: "client_email" })
        } else if self.private_key.trim().is_empty() {
            Err(CredentialsError::Incomplete { field: "private_key" })
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_email", &self.client_email)
            .field("private_key", &"<omitted>")
            .finish()
    }
}

/// Supplies credentials on demand.
///
/// Only called when sheet metadata has to be fetched, so hosts can keep credential
/// lookup lazy.
pub trait CredentialsProvider: Send + Sync {
    fn credentials(&self) -> anyhow::Result<Credentials>;
}

impl<F> CredentialsProvider for F
where
    F: Fn() -> anyhow::Result<Credentials> + Send + Sync,
{
    fn credentials(&self) -> anyhow::Result<Credentials> {
        self()
    }
}

impl CredentialsProvider for Credentials {
    fn credentials(&self) -> anyhow::Result<Credentials> {
        Ok(self.clone())
    }
}
