use std::sync::Arc;

use eyre::{Context, Result, bail};
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Client};

use crate::cluster::{KubeServiceClient, ServiceClient};
use crate::ip::collector::Collector;
use crate::ip::loadbalancer::TcpLoadBalancerProvider;
use crate::ip::mapper::Mapper;
use crate::ip::tracker::{self, Tracker};
use crate::ip::IpSet;
use crate::memoizer::Memoizer;
use crate::reconciler::Reconciler;
use crate::service::Handler;

mod ip;

use self::ip::FilteringIpSetProvider;

/// Top-level composition root: owns the whole mapping graph and drives it
/// from the Service watch and the IP change tracker.
pub struct Exposer {
    client: Client,
    service_client: Arc<dyn ServiceClient>,
    ip_set_memoizer: Arc<Memoizer<IpSet>>,
    handler: Arc<Handler>,
    reconciler: Reconciler,
    bind_cidrs: Vec<String>,
}

impl Exposer {
    pub async fn new(
        annotation_key: &str,
        bind_cidrs: &[String],
        disallowed_host_port_ranges: &[String],
    ) -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("failed to create cluster client")?;

        let collector = Collector::new();

        let ip_set_memoizer = Arc::new(Memoizer::new(move || collector.get()));

        let ip_set_provider = FilteringIpSetProvider::new(bind_cidrs, Arc::clone(&ip_set_memoizer) as _)
            .context("failed to create IP set provider")?;

        let mapper = Arc::new(Mapper::new(
            Arc::new(ip_set_provider),
            Arc::new(TcpLoadBalancerProvider),
        ));

        let handler = Arc::new(
            Handler::new(annotation_key, mapper, disallowed_host_port_ranges)
                .context("failed to create service handler")?,
        );

        let service_client: Arc<dyn ServiceClient> =
            Arc::new(KubeServiceClient::new(client.clone()));

        let reconciler = Reconciler::new(Arc::clone(&service_client), Arc::clone(&handler) as _);

        Ok(Self {
            client,
            service_client,
            ip_set_memoizer,
            handler,
            reconciler,
            bind_cidrs: bind_cidrs.to_vec(),
        })
    }

    /// Runs the Service watch and, when bind CIDRs are configured, the IP
    /// change tracker. The first failure cancels the rest; a worker that
    /// stops on its own is treated as a failure too.
    pub async fn run(self) -> Result<()> {
        info!("starting exposer");

        let watch = async {
            self.watch_services()
                .await
                .context("failed to watch services")?;

            bail!("service watch stopped unexpectedly");

            #[allow(unreachable_code)]
            Ok::<(), eyre::Report>(())
        };

        let track = async {
            if self.bind_cidrs.is_empty() {
                info!("bind CIDRs are empty, mappings will listen on all interfaces, IP change tracker will not be started");

                return futures::future::pending::<Result<()>>().await;
            }

            info!("bind CIDRs are specified, starting IP change tracker");

            let tracker = Tracker::new(
                Arc::clone(&self.ip_set_memoizer) as _,
                Arc::clone(&self.service_client),
                Arc::clone(&self.handler) as _,
                tracker::DEFAULT_PERIOD,
            );

            tracker
                .run()
                .await
                .context("failed to run IP change tracker")?;

            bail!("IP change tracker stopped unexpectedly");

            #[allow(unreachable_code)]
            Ok::<(), eyre::Report>(())
        };

        tokio::try_join!(watch, track)?;

        Ok(())
    }

    async fn watch_services(&self) -> Result<()> {
        let api: Api<Service> = Api::all(self.client.clone());

        let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
        tokio::pin!(stream);

        while let Some(event) = stream.try_next().await.context("service watch failed")? {
            match event {
                Event::Apply(svc) | Event::InitApply(svc) | Event::Delete(svc) => {
                    let Some(name) = svc.metadata.name.as_deref() else {
                        continue;
                    };
                    let Some(namespace) = svc.metadata.namespace.as_deref() else {
                        continue;
                    };

                    // errors are per-service: the next event or tracker tick
                    // re-drives the failed mapping
                    if let Err(e) = self.reconciler.reconcile(namespace, name).await {
                        error!("failed to reconcile service {namespace}/{name}: {e:#}");
                    }
                }

                Event::Init | Event::InitDone => debug!("service watch initialization event"),
            }
        }

        Ok(())
    }
}
