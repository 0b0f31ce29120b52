#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use ingress_controller_core as core;
pub use ingress_controller_k8s_api as k8s;

pub mod admin;
mod admission;
mod args;
pub mod config_secret;
pub mod controller;
mod metrics;
pub mod store;
pub mod validator;

pub use self::args::Args;
