//! Service principal authentication

use std::fmt;
use std::sync::Arc;

use azure_core::auth::TokenCredential;
use azure_identity::ClientSecretCredential;
use tracing::{debug, info};
use url::Url;
use vmreaper_models::Credentials;

use super::AzureEndpoints;
use crate::provider::ProviderError;

/// OAuth2 scope covering every ARM call
pub fn token_scope(endpoints: &AzureEndpoints) -> String {
    format!("{}/.default", endpoints.resource_manager.trim_end_matches('/'))
}

/// Bearer tokens for management-plane calls.
///
/// The client-secret credential caches its token and refreshes it once it
/// nears expiry, so callers ask for a token per request.
#[derive(Clone)]
pub struct TokenSource {
    inner: Inner,
}

#[derive(Clone)]
enum Inner {
    ClientSecret {
        credential: Arc<ClientSecretCredential>,
        scope: String,
    },
    #[cfg(test)]
    Fixed(String),
}

impl TokenSource {
    /// Service principal login against the endpoints' authority host
    pub fn client_secret(endpoints: &AzureEndpoints, credentials: &Credentials) -> Result<Self, ProviderError> {
        let authority = Url::parse(&endpoints.authority).map_err(|e| {
            ProviderError::Decode(format!("invalid authority host '{}': {}", endpoints.authority, e))
        })?;
        let credential = ClientSecretCredential::new(
            azure_core::new_http_client(),
            authority,
            credentials.tenant_id.clone(),
            credentials.client_id.clone(),
            credentials.client_secret.clone(),
        );
        Ok(Self {
            inner: Inner::ClientSecret {
                credential: Arc::new(credential),
                scope: token_scope(endpoints),
            },
        })
    }

    #[cfg(test)]
    pub(crate) fn fixed(secret: impl Into<String>) -> Self {
        Self {
            inner: Inner::Fixed(secret.into()),
        }
    }

    /// Current bearer token
    pub async fn bearer(&self) -> Result<String, ProviderError> {
        match &self.inner {
            Inner::ClientSecret { credential, scope } => {
                debug!(%scope, "Requesting access token");
                let token = credential.get_token(&[scope.as_str()]).await?;
                Ok(token.token.secret().to_string())
            }
            #[cfg(test)]
            Inner::Fixed(secret) => Ok(secret.clone()),
        }
    }

    /// Fetch a token once so bad credentials fail before any other call
    pub async fn verify(&self, credentials: &Credentials) -> Result<(), ProviderError> {
        self.bearer().await?;
        info!(tenant = %credentials.tenant_id, client_id = %credentials.client_id, "Authenticated service principal");
        Ok(())
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenSource(<redacted>)")
    }
}
