//! Conditional installation of controllers.

use crate::{
    core::EnablementStatus,
    k8s::{Client, Resource},
    store::SharedCache,
};
use anyhow::{anyhow, Context, Result};
use kube::runtime::watcher;
use serde::de::DeserializeOwned;
use std::{fmt, marker::PhantomData};
use tracing::{info_span, Instrument};


/// A handle that controllers are installed into.
pub trait Manager {
    /// Read-only access to the cluster, used to auto-detect whether a
    /// controller should run.
    type Reader: Sync;

    fn api_reader(&self) -> &Self::Reader;
}

/// A controller that can be installed into a [`Manager`].
pub trait Controller<M>: Send + Sync {
    fn setup_with_manager(&self, mgr: &mut M) -> Result<()>;

    /// A human-readable name for diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Decides whether a controller with `auto` enablement should be installed.
#[async_trait::async_trait]
pub trait AutoDetect<R: Sync>: Send + Sync {
    async fn detect(&self, reader: &R) -> bool;
}

/// A controller paired with the policy that decides whether it is installed.
pub struct ControllerDef<'a, M: Manager> {
    enabled: &'a EnablementStatus,
    auto: Option<Box<dyn AutoDetect<M::Reader> + 'a>>,
    controller: Box<dyn Controller<M> + 'a>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Setup {
    Installed,
    Skipped,
}

/// Auto-detects a controller by checking that the API server serves its
/// resource kind.
pub struct ApiResourceExists<K>(PhantomData<fn() -> K>);

/// Watches every resource of one kind into a cache.
pub struct Watcher<K> {
    cache: SharedCache<K>,
    config: watcher::Config,
    cluster_scoped: bool,
}

/// Installs controllers into a [`kubert::Runtime`].
pub struct RuntimeManager<'r, S> {
    runtime: &'r mut kubert::Runtime<S>,
    client: Client,
}

// === impl ControllerDef ===

impl<'a, M: Manager> ControllerDef<'a, M> {
    pub fn new(enabled: &'a EnablementStatus, controller: impl Controller<M> + 'a) -> Self {
        Self {
            enabled,
            auto: None,
            controller: Box::new(controller),
        }
    }

    pub fn with_auto(mut self, auto: impl AutoDetect<M::Reader> + 'a) -> Self {
        self.auto = Some(Box::new(auto));
        self
    }

    pub fn name(&self) -> &'static str {
        self.controller.name()
    }

    /// Installs the controller if it is enabled, or if it is set to `auto` and
    /// its auto-detection says it should run.
    pub async fn maybe_setup_with_manager(&self, mgr: &mut M) -> Result<Setup> {
        match *self.enabled {
            EnablementStatus::Disabled => {
                tracing::debug!(controller = %self.name(), "Controller disabled");
                return Ok(Setup::Skipped);
            }

            EnablementStatus::Auto => {
                let auto = self.auto.as_ref().ok_or_else(|| {
                    anyhow!("'auto' enablement not supported for controller {:?}", self.name())
                })?;
                if !auto.detect(mgr.api_reader()).await {
                    tracing::info!(controller = %self.name(), "Controller not detected, skipping");
                    return Ok(Setup::Skipped);
                }
            }

            EnablementStatus::Enabled => {}
        }

        self.install(mgr)
    }

    fn install(&self, mgr: &mut M) -> Result<Setup> {
        self.controller.setup_with_manager(mgr)?;
        tracing::info!(controller = %self.name(), "Controller installed");
        Ok(Setup::Installed)
    }
}

impl<M: Manager> fmt::Debug for ControllerDef<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerDef")
            .field("enabled", self.enabled)
            .field("auto", &self.auto.is_some())
            .field("controller", &self.name())
            .finish()
    }
}

/// Installs each controller in order, stopping at the first failure.
pub async fn setup_all<M: Manager>(controllers: &[ControllerDef<'_, M>], mgr: &mut M) -> Result<()> {
    for controller in controllers {
        controller
            .maybe_setup_with_manager(mgr)
            .await
            .with_context(|| format!("unable to create controller {:?}", controller.name()))?;
    }
    Ok(())
}

// === impl ApiResourceExists ===

impl<K> Default for ApiResourceExists<K> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait::async_trait]
impl<K> AutoDetect<Client> for ApiResourceExists<K>
where
    K: Resource,
    K::DynamicType: Default,
{
    async fn detect(&self, client: &Client) -> bool {
        let dt = Default::default();
        let api_version = K::api_version(&dt);
        let kind = K::kind(&dt);
        let exists = client
            .list_api_group_resources(&api_version)
            .await
            .ok()
            .iter()
            .flat_map(|r| r.resources.iter())
            .any(|r| r.kind == kind);
        if !exists {
            tracing::warn!(%api_version, %kind, "Resource kind not found");
        }
        exists
    }
}

// === impl Watcher ===

impl<K> Watcher<K> {
    pub fn namespaced(cache: SharedCache<K>) -> Self {
        Self {
            cache,
            config: watcher::Config::default(),
            cluster_scoped: false,
        }
    }

    pub fn cluster(cache: SharedCache<K>) -> Self {
        Self {
            cluster_scoped: true,
            ..Self::namespaced(cache)
        }
    }
}

impl<S, K> Controller<RuntimeManager<'_, S>> for Watcher<K>
where
    S: 'static,
    K: Resource + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    fn setup_with_manager(&self, mgr: &mut RuntimeManager<'_, S>) -> Result<()> {
        let kind = K::kind(&Default::default()).into_owned();
        let events = mgr.runtime.watch_all::<K>(self.config.clone());
        if self.cluster_scoped {
            tokio::spawn(
                kubert::index::cluster(self.cache.clone(), events)
                    .instrument(info_span!("watch", %kind)),
            );
        } else {
            tokio::spawn(
                kubert::index::namespaced(self.cache.clone(), events)
                    .instrument(info_span!("watch", %kind)),
            );
        }
        Ok(())
    }
}

// === impl RuntimeManager ===

impl<'r, S> RuntimeManager<'r, S> {
    pub fn new(runtime: &'r mut kubert::Runtime<S>) -> Self {
        let client = runtime.client();
        Self { runtime, client }
    }
}

impl<S> Manager for RuntimeManager<'_, S> {
    type Reader = Client;

    fn api_reader(&self) -> &Client {
        &self.client
    }
}
