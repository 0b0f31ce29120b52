//! Resources in the `configuration.konghq.com` API group.
//!
//! These resources carry their fields at the top level of the object rather
//! than under a `spec`, so the resource traits are implemented by hand instead
//! of being derived.

use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::ObjectMeta;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "configuration.konghq.com";

/// A consumer of proxied services.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct KongConsumer {
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Unique username of the consumer in the proxy's configuration.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_id: String,

    /// Names of secrets holding the consumer's credentials.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<String>,
}

/// A plugin configuration scoped to a namespace.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct KongPlugin {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub plugin: PluginDef,
}

/// A plugin configuration usable from any namespace.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct KongClusterPlugin {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub plugin: PluginDef,
}

/// Overrides applied to the proxy objects generated for an ingress.
///
/// Each section is passed through to the admin API as-is.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct KongIngress {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<serde_json::Value>,
}

/// Routes TCP streams to services, optionally terminating TLS by SNI.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TCPIngress {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: TCPIngressSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TCPIngressSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<TCPIngressRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<IngressTLS>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TCPIngressRule {
    /// SNI name to match. Only TLS streams can be matched by host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    pub port: u16,

    pub backend: IngressBackend,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressTLS {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_name: String,
}

/// Routes UDP datagrams to services.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct UDPIngress {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: UDPIngressSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UDPIngressSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<UDPIngressRule>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UDPIngressRule {
    pub port: u16,

    pub backend: IngressBackend,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressBackend {
    pub service_name: String,

    pub service_port: u16,
}

/// The fields shared by namespaced and cluster-wide plugin resources.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PluginDef {
    /// Name of the plugin to run.
    #[serde(default, rename = "plugin", skip_serializing_if = "String::is_empty")]
    pub plugin_name: String,

    /// Inline plugin configuration. Must not be combined with `configFrom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    /// Plugin configuration stored in a secret.
    #[serde(default, rename = "configFrom", skip_serializing_if = "Option::is_none")]
    pub config_from: Option<ConfigSource>,

    #[serde(default, rename = "consumerRef", skip_serializing_if = "Option::is_none")]
    pub consumer_ref: Option<String>,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_on: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSource {
    #[serde(default)]
    pub secret_key_ref: SecretKeyRef,
}

/// References a single key of a secret.
///
/// `namespace` is only meaningful for cluster-wide plugins; namespaced plugins
/// always read secrets from their own namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SecretKeyRef {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

// === impl PluginDef ===

impl PluginDef {
    /// Returns the secret reference if `configFrom` names one.
    pub fn secret_ref(&self) -> Option<&SecretKeyRef> {
        self.config_from
            .as_ref()
            .map(|src| &src.secret_key_ref)
            .filter(|r| !r.is_empty())
    }
}

// === impl SecretKeyRef ===

impl SecretKeyRef {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.key.is_empty() && self.namespace.is_none()
    }
}

macro_rules! configuration_resource {
    ($ty:ty, $version:literal, $kind:literal, $plural:literal, $scope:ty) => {
        impl k8s_openapi::Resource for $ty {
            const API_VERSION: &'static str = concat!("configuration.konghq.com/", $version);
            const GROUP: &'static str = GROUP;
            const KIND: &'static str = $kind;
            const VERSION: &'static str = $version;
            const URL_PATH_SEGMENT: &'static str = $plural;
            type Scope = $scope;
        }

        impl k8s_openapi::Metadata for $ty {
            type Ty = ObjectMeta;

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

configuration_resource!(
    KongConsumer,
    "v1",
    "KongConsumer",
    "kongconsumers",
    NamespaceResourceScope
);
configuration_resource!(KongPlugin, "v1", "KongPlugin", "kongplugins", NamespaceResourceScope);
configuration_resource!(
    KongClusterPlugin,
    "v1",
    "KongClusterPlugin",
    "kongclusterplugins",
    ClusterResourceScope
);
configuration_resource!(
    KongIngress,
    "v1",
    "KongIngress",
    "kongingresses",
    NamespaceResourceScope
);
configuration_resource!(
    TCPIngress,
    "v1beta1",
    "TCPIngress",
    "tcpingresses",
    NamespaceResourceScope
);
configuration_resource!(
    UDPIngress,
    "v1alpha1",
    "UDPIngress",
    "udpingresses",
    NamespaceResourceScope
);
