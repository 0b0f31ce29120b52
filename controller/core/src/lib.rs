#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod credentials;
mod enablement;
pub mod plugin;
mod verdict;

pub use self::{
    credentials::CredentialFields, enablement::EnablementStatus, plugin::Plugin, verdict::Verdict,
};

pub const CONTROLLER_NAME: &str = "ingress-controller";
