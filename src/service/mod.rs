use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Context, ContextCompat, Result, bail};
use k8s_openapi::api::core::v1::Service;

use crate::ip::mapper::PortMapper;

pub mod annotation;
pub mod ranges;

use self::annotation::validate_annotation_key;
use self::ranges::PortRange;

/// Interprets Service resources into port mapping changes.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn handle(&self, svc: &Service) -> Result<()>;

    async fn handle_delete(&self, svc_name: &str) -> Result<()>;
}

/// Derives the desired mapping for a service from its annotation and TCP
/// ports and drives the mapper towards it.
pub struct Handler {
    annotation_key: String,
    disallowed_host_port_ranges: Vec<PortRange>,
    mapper: Arc<dyn PortMapper>,
}

impl Handler {
    pub fn new(
        annotation_key: &str,
        mapper: Arc<dyn PortMapper>,
        disallowed_host_port_ranges: &[String],
    ) -> Result<Self> {
        validate_annotation_key(annotation_key).context("invalid annotation key")?;

        let disallowed_host_port_ranges = disallowed_host_port_ranges
            .iter()
            .map(|s| {
                s.parse()
                    .with_context(|| format!("invalid disallowed host port range {s:?}"))
            })
            .collect::<Result<Vec<PortRange>>>()?;

        Ok(Self {
            annotation_key: annotation_key.to_string(),
            disallowed_host_port_ranges,
            mapper,
        })
    }
}

#[async_trait]
impl ServiceHandler for Handler {
    async fn handle(&self, svc: &Service) -> Result<()> {
        let name = svc.metadata.name.as_deref().context("service has no name")?;
        let namespace = svc
            .metadata
            .namespace
            .as_deref()
            .context("service has no namespace")?;

        let svc_name = format!("{name}.{namespace}");

        debug!("handle service {svc_name}");

        let Some(host_port_str) = svc
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(&self.annotation_key))
        else {
            debug!("annotation is not set on service {svc_name}");

            self.mapper.remove(&svc_name).await;

            return Ok(());
        };

        debug!(
            "found annotation {}={host_port_str} on service {svc_name}",
            self.annotation_key
        );

        let host_port: u16 = host_port_str
            .parse()
            .with_context(|| format!("invalid host port {host_port_str:?}"))?;

        if host_port == 0 {
            bail!("invalid host port 0");
        }

        if let Some(range) = self
            .disallowed_host_port_ranges
            .iter()
            .find(|range| range.contains(host_port))
        {
            warn!(
                "host port {host_port} for service {svc_name} is in the disallowed range {range}, skipping"
            );

            self.mapper.remove(&svc_name).await;

            return Ok(());
        }

        // a port with no protocol counts as TCP, the API server defaults it
        let tcp_ports: Vec<u16> = svc
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .filter(|port| matches!(port.protocol.as_deref(), None | Some("TCP")))
                    .filter_map(|port| u16::try_from(port.port).ok())
                    .collect()
            })
            .unwrap_or_default();

        let Some(&svc_port) = tcp_ports.first() else {
            debug!("no TCP ports on service {svc_name}");

            self.mapper.remove(&svc_name).await;

            return Ok(());
        };

        if tcp_ports.len() > 1 {
            info!("more than one TCP port on service {svc_name}, using the first one: {svc_port}");
        }

        self.mapper
            .add(&svc_name, host_port, svc_port)
            .await
            .context("failed to register host port")
    }

    async fn handle_delete(&self, svc_name: &str) -> Result<()> {
        if svc_name.is_empty() {
            bail!("service name must not be empty");
        }

        debug!("handle delete of service {svc_name}");

        self.mapper.remove(svc_name).await;

        Ok(())
    }
}
