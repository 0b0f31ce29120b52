use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// A plugin's configuration, as understood by the admin API.
pub type Configuration = serde_json::Map<String, Value>;

/// A plugin entity as submitted to the admin API.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Plugin {
    pub name: String,
    pub config: Configuration,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_on: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("plugin configuration must be an object")]
    NotAnObject,

    #[error("failed to parse plugin configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Converts an inline plugin configuration into a [`Configuration`].
///
/// An absent or null configuration is empty.
pub fn from_raw(raw: Option<&Value>) -> Result<Configuration, ConfigError> {
    match raw {
        None | Some(Value::Null) => Ok(Configuration::new()),
        Some(Value::Object(config)) => Ok(config.clone()),
        Some(_) => Err(ConfigError::NotAnObject),
    }
}

/// Parses a plugin configuration stored in a secret value.
///
/// Values may be written as YAML or JSON.
pub fn from_secret_value(value: &[u8]) -> Result<Configuration, ConfigError> {
    serde_yaml::from_slice(value).map_err(Into::into)
}
