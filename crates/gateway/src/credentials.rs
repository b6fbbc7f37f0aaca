use crate::config::{CredentialEntry, GatewayConfig};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tradegate_core::{CredentialError, CredentialResolver, Credentials};

/// User id known to the built-in stub store.
pub const STUB_USER_ID: &str = "testuser";

/// In-memory credential store.
pub struct StaticCredentialResolver {
    users: HashMap<String, Credentials>,
}

impl StaticCredentialResolver {
    pub fn new(users: HashMap<String, Credentials>) -> Self {
        Self { users }
    }

    /// Placeholder store: exactly one user with a fixed key pair.
    // TODO: replace with a database-backed resolver storing encrypted per-user keys.
    pub fn stub() -> Self {
        let mut users = HashMap::new();
        users.insert(STUB_USER_ID.to_string(), Credentials::new("---", "---"));
        Self::new(users)
    }

    pub fn from_entries(entries: &BTreeMap<String, CredentialEntry>) -> Self {
        let users = entries
            .iter()
            .map(|(user, entry)| {
                (
                    user.clone(),
                    Credentials::new(entry.api_key.clone(), entry.api_secret.clone()),
                )
            })
            .collect();
        Self::new(users)
    }

    /// Config-backed store, or the stub when no users are configured.
    pub fn from_config(config: &GatewayConfig) -> Arc<dyn CredentialResolver> {
        if config.credentials.is_empty() {
            tracing::warn!("No credentials configured, using the stub credential store");
            Arc::new(Self::stub())
        } else {
            Arc::new(Self::from_entries(&config.credentials))
        }
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(&self, user_id: &str) -> Result<Credentials, CredentialError> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(user_id.to_string()))
    }
}
