use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Context, Result, bail};
use tokio::sync::Mutex;

use super::loadbalancer::{LoadBalancer, LoadBalancerProvider};
use super::{IpSet, IpSetProvider};

/// Creates and removes host port mappings for services.
#[async_trait]
pub trait PortMapper: Send + Sync {
    /// Registers a mapping from a host port to a service port.
    ///
    /// Returns an error when the host port is already registered to another
    /// service; the caller must surface it without retrying in place.
    async fn add(&self, svc_name: &str, host_port: u16, svc_port: u16) -> Result<()>;

    /// Removes the mapping for the given service name, if any.
    async fn remove(&self, svc_name: &str);
}

struct PortMapping {
    host_ip_set: IpSet,
    lb: Box<dyn LoadBalancer>,
    host_port: u16,
    svc_port: u16,
}

#[derive(Default)]
struct Index {
    // both keyed views of the same rows: a host port belongs to exactly one
    // service, a service owns at most one mapping
    by_host_port: HashMap<u16, String>,
    by_svc_name: HashMap<String, PortMapping>,
}

/// Maps host ports to services by running one TCP load balancer per exposed
/// service, bound on every host IP the provider reports.
///
/// All operations serialize on one lock, held across load balancer start and
/// close.
pub struct Mapper {
    ip_set_provider: Arc<dyn IpSetProvider>,
    lb_provider: Arc<dyn LoadBalancerProvider>,
    index: Mutex<Index>,
}

impl Mapper {
    pub fn new(
        ip_set_provider: Arc<dyn IpSetProvider>,
        lb_provider: Arc<dyn LoadBalancerProvider>,
    ) -> Self {
        Self {
            ip_set_provider,
            lb_provider,
            index: Mutex::new(Index::default()),
        }
    }

    async fn remove_locked(index: &mut Index, svc_name: &str) {
        debug!("remove mapping for {svc_name} if it exists");

        let Some(mut mapping) = index.by_svc_name.remove(svc_name) else {
            return;
        };

        index.by_host_port.remove(&mapping.host_port);

        // a close failure must not keep the row alive
        if let Err(e) = mapping.lb.close().await {
            info!("error on closing load balancer for {svc_name}: {e:#}");
        }

        info!("removed mapping for {svc_name}");
    }
}

#[async_trait]
impl PortMapper for Mapper {
    async fn add(&self, svc_name: &str, host_port: u16, svc_port: u16) -> Result<()> {
        debug!("add mapping for {svc_name}: host port {host_port}, service port {svc_port}");

        let mut index = self.index.lock().await;

        let host_ip_set = self
            .ip_set_provider
            .get()
            .context("failed to get matching IP set")?;

        if let Some(owner) = index.by_host_port.get(&host_port) {
            if owner != svc_name {
                bail!("host port {host_port} is already registered to another service: {owner}");
            }
        }

        if let Some(existing) = index.by_svc_name.get(svc_name) {
            if existing.host_port == host_port
                && existing.svc_port == svc_port
                && existing.host_ip_set == host_ip_set
            {
                info!("nothing to do, no changes in mapping for {svc_name}");

                return Ok(());
            }

            Self::remove_locked(&mut index, svc_name).await;
        }

        if host_ip_set.is_empty() {
            debug!("skip creating load balancer for {svc_name}, no matching IPs found");

            return Ok(());
        }

        let mut lb = self
            .lb_provider
            .new_load_balancer()
            .context("failed to create load balancer")?;

        let upstream = format!("{svc_name}:{svc_port}");

        for ip in &host_ip_set {
            let addr: IpAddr = ip
                .parse()
                .with_context(|| format!("invalid IP address in set: {ip:?}"))?;

            lb.add_route(SocketAddr::new(addr, host_port), vec![upstream.clone()])
                .context("failed to add route to load balancer")?;
        }

        lb.start().await.context("failed to start load balancer")?;

        index.by_host_port.insert(host_port, svc_name.to_string());
        index.by_svc_name.insert(
            svc_name.to_string(),
            PortMapping {
                host_ip_set: host_ip_set.clone(),
                lb,
                host_port,
                svc_port,
            },
        );

        info!("added mapping for {svc_name} on host port {host_port} to service port {svc_port}, ips: {host_ip_set:?}");

        Ok(())
    }

    async fn remove(&self, svc_name: &str) {
        let mut index = self.index.lock().await;

        Self::remove_locked(&mut index, svc_name).await;
    }
}
