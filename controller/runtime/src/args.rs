use crate::{
    admin::{AdminClient, ClientOptions},
    admission::Admission,
    config_secret,
    controller::{self, ApiResourceExists, ControllerDef, RuntimeManager, Watcher},
    core::{CredentialFields, EnablementStatus},
    k8s::{
        configuration::{
            KongClusterPlugin, KongConsumer, KongIngress, KongPlugin, TCPIngress, UDPIngress,
        },
        Ingress, NamespacedName,
    },
    metrics::AdmissionMetrics,
    store::{SecretReader, Store},
    validator::AdminApiValidator,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{path::PathBuf, sync::Arc};
use tracing::info;

#[derive(Debug, Parser)]
#[clap(name = "ingress-controller", about = "An ingress controller for the Kong proxy")]
pub struct Args {
    #[clap(
        long,
        default_value = "ingress_controller=info,warn",
        env = "INGRESS_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// URL of the proxy's admin API.
    #[clap(long, default_value = "http://localhost:8001")]
    kong_admin_url: String,

    /// A header added to every admin API request, formatted as `name:value`.
    #[clap(long = "kong-admin-header")]
    kong_admin_headers: Vec<String>,

    /// Disables verification of the admin API's TLS certificate.
    #[clap(long)]
    kong_admin_tls_skip_verify: bool,

    /// Path to a PEM-encoded CA certificate for the admin API.
    #[clap(long)]
    kong_admin_ca_cert_file: Option<PathBuf>,

    /// A PEM-encoded CA certificate for the admin API.
    #[clap(long)]
    kong_admin_ca_cert: Option<String>,

    /// Name of the secret that stages rendered proxy configuration.
    #[clap(long, default_value = "kong-config")]
    config_secret_name: String,

    #[clap(long, default_value = "kong-system", env = "POD_NAMESPACE")]
    config_secret_namespace: String,

    #[clap(flatten)]
    controllers: ControllerFlags,
}

/// Enablement of each controller: one of `enabled`, `disabled` or `auto`.
#[derive(Debug, clap::Args)]
struct ControllerFlags {
    /// Watches services and their endpoints.
    #[clap(long, default_value = "enabled")]
    controller_service: EnablementStatus,

    #[clap(long = "controller-ingress-networkingv1", default_value = "enabled")]
    controller_ingress: EnablementStatus,

    #[clap(long, default_value = "enabled")]
    controller_secret: EnablementStatus,

    #[clap(long, default_value = "disabled")]
    controller_kongplugin: EnablementStatus,

    #[clap(long, default_value = "disabled")]
    controller_kongclusterplugin: EnablementStatus,

    #[clap(long, default_value = "disabled")]
    controller_kongconsumer: EnablementStatus,

    #[clap(long, default_value = "enabled")]
    controller_kongingress: EnablementStatus,

    #[clap(long, default_value = "disabled")]
    controller_tcpingress: EnablementStatus,

    #[clap(long, default_value = "disabled")]
    controller_udpingress: EnablementStatus,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            kong_admin_url,
            kong_admin_headers,
            kong_admin_tls_skip_verify,
            kong_admin_ca_cert_file,
            kong_admin_ca_cert,
            config_secret_name,
            config_secret_namespace,
            controllers,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let admin_client = AdminClient::new(
            &kong_admin_url,
            &ClientOptions {
                headers: kong_admin_headers,
                tls_skip_verify: kong_admin_tls_skip_verify,
                ca_cert_path: kong_admin_ca_cert_file,
                ca_cert: kong_admin_ca_cert,
            },
        )?;

        let mut prom = <Registry>::default();
        let admission_metrics = AdmissionMetrics::register(&mut prom);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        let config_secret = NamespacedName::new(config_secret_namespace, config_secret_name);
        let (_, created) = config_secret::get_or_create(&runtime.client(), &config_secret)
            .await
            .with_context(|| format!("failed to load config secret {config_secret}"))?;
        info!(secret = %config_secret, created, "Config secret ready");

        // Install resource watches into the local store.
        let store = Store::default();
        {
            let defs = controllers.defs(&store);
            let mut mgr = RuntimeManager::new(&mut runtime);
            controller::setup_all(&defs, &mut mgr).await?;
        }

        // Secrets referenced by plugin configuration are read through the cache, falling back to
        // the API when the secret controller is disabled.
        let secrets = SecretReader::new(store.secrets.clone(), runtime.client());
        let validator = AdminApiValidator::new(
            admin_client,
            secrets,
            Arc::new(CredentialFields::default()),
        );
        let admission = Admission::new(Arc::new(validator), admission_metrics);
        let runtime = runtime.spawn_server(move || admission);

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

// === impl ControllerFlags ===

impl ControllerFlags {
    fn defs<'a, 'r, S: 'static>(
        &'a self,
        store: &Store,
    ) -> Vec<ControllerDef<'a, RuntimeManager<'r, S>>> {
        vec![
            ControllerDef::new(
                &self.controller_service,
                Watcher::namespaced(store.services.clone()),
            ),
            ControllerDef::new(
                &self.controller_service,
                Watcher::namespaced(store.endpoints.clone()),
            ),
            ControllerDef::new(
                &self.controller_ingress,
                Watcher::namespaced(store.ingresses.clone()),
            )
            .with_auto(ApiResourceExists::<Ingress>::default()),
            ControllerDef::new(
                &self.controller_secret,
                Watcher::namespaced(store.secrets.clone()),
            ),
            ControllerDef::new(
                &self.controller_kongplugin,
                Watcher::namespaced(store.plugins.clone()),
            )
            .with_auto(ApiResourceExists::<KongPlugin>::default()),
            ControllerDef::new(
                &self.controller_kongclusterplugin,
                Watcher::cluster(store.cluster_plugins.clone()),
            )
            .with_auto(ApiResourceExists::<KongClusterPlugin>::default()),
            ControllerDef::new(
                &self.controller_kongconsumer,
                Watcher::namespaced(store.consumers.clone()),
            )
            .with_auto(ApiResourceExists::<KongConsumer>::default()),
            ControllerDef::new(
                &self.controller_kongingress,
                Watcher::namespaced(store.kong_ingresses.clone()),
            )
            .with_auto(ApiResourceExists::<KongIngress>::default()),
            ControllerDef::new(
                &self.controller_tcpingress,
                Watcher::namespaced(store.tcp_ingresses.clone()),
            )
            .with_auto(ApiResourceExists::<TCPIngress>::default()),
            ControllerDef::new(
                &self.controller_udpingress,
                Watcher::namespaced(store.udp_ingresses.clone()),
            )
            .with_auto(ApiResourceExists::<UDPIngress>::default()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_defaults() {
        let args = Args::try_parse_from(["ingress-controller"]).unwrap();
        let flags = &args.controllers;
        assert_eq!(flags.controller_service, EnablementStatus::Enabled);
        assert_eq!(flags.controller_ingress, EnablementStatus::Enabled);
        assert_eq!(flags.controller_secret, EnablementStatus::Enabled);
        assert_eq!(flags.controller_kongplugin, EnablementStatus::Disabled);
        assert_eq!(flags.controller_kongclusterplugin, EnablementStatus::Disabled);
        assert_eq!(flags.controller_kongconsumer, EnablementStatus::Disabled);
        assert_eq!(flags.controller_kongingress, EnablementStatus::Enabled);
        assert_eq!(flags.controller_tcpingress, EnablementStatus::Disabled);
        assert_eq!(flags.controller_udpingress, EnablementStatus::Disabled);
        assert_eq!(args.kong_admin_url, "http://localhost:8001");
        assert_eq!(args.config_secret_name, "kong-config");
    }

    #[test]
    fn parses_enablement_flags() {
        let args = Args::try_parse_from([
            "ingress-controller",
            "--controller-ingress-networkingv1=auto",
            "--controller-kongconsumer=enabled",
            "--controller-secret=disabled",
            "--controller-udpingress=auto",
            "--kong-admin-header=Kong-Admin-Token:s3cr3t",
            "--kong-admin-header=X-Team:edge",
        ])
        .unwrap();
        assert_eq!(args.controllers.controller_ingress, EnablementStatus::Auto);
        assert_eq!(args.controllers.controller_kongconsumer, EnablementStatus::Enabled);
        assert_eq!(args.controllers.controller_secret, EnablementStatus::Disabled);
        assert_eq!(args.controllers.controller_udpingress, EnablementStatus::Auto);
        assert_eq!(
            args.kong_admin_headers,
            vec!["Kong-Admin-Token:s3cr3t", "X-Team:edge"]
        );
    }

    #[test]
    fn rejects_unknown_enablement() {
        let err = Args::try_parse_from(["ingress-controller", "--controller-service=sometimes"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue, "{err}");
    }
}
