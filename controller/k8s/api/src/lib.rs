#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod configuration;

pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Endpoints, Secret, Service},
        networking::v1::Ingress,
    },
    ByteString,
};
pub use kube::{
    api::{Api, ObjectMeta, PostParams, Resource, ResourceExt},
    core::ErrorResponse,
    Client, Error,
};

/// Identifies a namespaced resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

// === impl NamespacedName ===

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Returns true if the error is an API response with the given status code.
pub fn is_status(error: &Error, code: u16) -> bool {
    matches!(error, Error::Api(rsp) if rsp.code == code)
}

pub fn is_not_found(error: &Error) -> bool {
    is_status(error, 404)
}
