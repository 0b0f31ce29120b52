use crate::{
    admin::{self, AdminApi},
    core::{
        credentials::{CredentialFields, CREDENTIAL_TYPE_KEY},
        plugin, Plugin, Verdict,
    },
    k8s::{
        self,
        configuration::{KongConsumer, PluginDef, SecretKeyRef},
        NamespacedName, Secret,
    },
    store::SecretLookup,
};
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;


/// Validates resources before they are admitted into the cluster.
///
/// `Ok` carries the verdict of a completed check. `Err` means the check could
/// not be completed and says nothing about the resource's validity.
#[async_trait::async_trait]
pub trait Validator: Send + Sync {
    /// Checks that the consumer has a username that is not already taken.
    async fn validate_consumer(&self, consumer: &KongConsumer) -> Result<Verdict, Error>;

    /// Checks a plugin against the admin API's plugin schema.
    ///
    /// `namespace` is the plugin's own namespace; it is `None` for cluster-wide
    /// plugins, whose secret references name their namespace explicitly.
    async fn validate_plugin(
        &self,
        namespace: Option<&str>,
        plugin: &PluginDef,
    ) -> Result<Verdict, Error>;

    /// Checks that a secret holding a credential carries every field its
    /// credential type requires. Secrets that don't declare a credential type
    /// are accepted.
    async fn validate_credential(&self, secret: &Secret) -> Result<Verdict, Error>;
}

/// A [`Validator`] backed by the admin API and the local resource caches.
#[derive(Clone)]
pub struct AdminApiValidator<A, S> {
    admin: A,
    secrets: S,
    credentials: Arc<CredentialFields>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("fetching consumer from admin API: {0}")]
    FetchConsumer(#[source] admin::Error),

    #[error("could not parse plugin configuration: {0}")]
    ParseConfig(#[source] plugin::ConfigError),

    #[error("could not load secret plugin configuration: {0}")]
    SecretConfig(#[from] SecretConfigError),
}

#[derive(Debug, Error)]
pub enum SecretConfigError {
    #[error("secret reference {0:?} does not specify a namespace")]
    MissingNamespace(String),

    #[error("secret {0} not found")]
    NotFound(NamespacedName),

    #[error("failed to read secret {secret}: {error}")]
    Read {
        secret: NamespacedName,
        #[source]
        error: k8s::Error,
    },

    #[error("no key {key:?} in secret {secret}")]
    MissingKey { secret: NamespacedName, key: String },

    #[error(transparent)]
    Parse(#[from] plugin::ConfigError),
}

// === impl AdminApiValidator ===

impl<A, S> AdminApiValidator<A, S> {
    pub fn new(admin: A, secrets: S, credentials: Arc<CredentialFields>) -> Self {
        Self {
            admin,
            secrets,
            credentials,
        }
    }
}

impl<A, S: SecretLookup> AdminApiValidator<A, S> {
    async fn secret_config(
        &self,
        namespace: Option<&str>,
        secret_ref: &SecretKeyRef,
    ) -> Result<plugin::Configuration, SecretConfigError> {
        let namespace = namespace
            .or(secret_ref.namespace.as_deref())
            .ok_or_else(|| SecretConfigError::MissingNamespace(secret_ref.name.clone()))?;
        let id = NamespacedName::new(namespace, &secret_ref.name);

        let secret = match self.secrets.secret(&id).await {
            Ok(Some(secret)) => secret,
            Ok(None) => return Err(SecretConfigError::NotFound(id)),
            Err(error) => return Err(SecretConfigError::Read { secret: id, error }),
        };
        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get(&secret_ref.key))
            .ok_or_else(|| SecretConfigError::MissingKey {
                secret: id,
                key: secret_ref.key.clone(),
            })?;

        plugin::from_secret_value(&value.0).map_err(Into::into)
    }
}

#[async_trait::async_trait]
impl<A, S> Validator for AdminApiValidator<A, S>
where
    A: AdminApi,
    S: SecretLookup,
{
    async fn validate_consumer(&self, consumer: &KongConsumer) -> Result<Verdict, Error> {
        if consumer.username.is_empty() {
            return Ok(Verdict::reject("username cannot be empty"));
        }

        match self.admin.get_consumer(&consumer.username).await {
            Ok(None) => Ok(Verdict::Accept),
            Ok(Some(_)) => Ok(Verdict::reject("consumer already exists")),
            Err(error) => {
                tracing::error!(%error, username = %consumer.username, "Failed to fetch consumer");
                Err(Error::FetchConsumer(error))
            }
        }
    }

    async fn validate_plugin(
        &self,
        namespace: Option<&str>,
        def: &PluginDef,
    ) -> Result<Verdict, Error> {
        if def.plugin_name.is_empty() {
            return Ok(Verdict::reject("plugin name cannot be empty"));
        }

        let mut config = plugin::from_raw(def.config.as_ref()).map_err(Error::ParseConfig)?;

        if let Some(secret_ref) = def.secret_ref() {
            if !config.is_empty() {
                return Ok(Verdict::reject(
                    "plugin cannot use both Config and ConfigFrom",
                ));
            }
            config = self.secret_config(namespace, secret_ref).await?;
        }

        let plugin = Plugin {
            name: def.plugin_name.clone(),
            config,
            run_on: def.run_on.clone().filter(|r| !r.is_empty()),
            protocols: Some(def.protocols.clone()).filter(|p| !p.is_empty()),
        };

        // Errors on the schema request reject the plugin with the error's text
        // rather than failing the check.
        match self.admin.validate_plugin(&plugin).await {
            Ok(StatusCode::CREATED) => Ok(Verdict::Accept),
            Ok(status) => {
                // TODO: decide whether successful replies other than 201 should
                // reject the plugin; they are currently accepted.
                tracing::debug!(%status, plugin = %plugin.name, "Unexpected schema validation status");
                Ok(Verdict::Accept)
            }
            Err(error) => Ok(Verdict::Reject(error.to_string())),
        }
    }

    async fn validate_credential(&self, secret: &Secret) -> Result<Verdict, Error> {
        let Some(data) = secret.data.as_ref() else {
            return Ok(Verdict::Accept);
        };
        let Some(cred_type) = data.get(CREDENTIAL_TYPE_KEY) else {
            return Ok(Verdict::Accept);
        };
        let cred_type = String::from_utf8_lossy(&cred_type.0);

        // Uniqueness of credential keys is not checked against the admin API.
        match self
            .credentials
            .check(&cred_type, |field| data.contains_key(field))
        {
            Ok(()) => Ok(Verdict::Accept),
            Err(error) => Ok(Verdict::Reject(error.to_string())),
        }
    }
}
