use std::sync::Arc;

use eyre::{Context, Result};

use crate::cluster::ServiceClient;
use crate::service::ServiceHandler;

/// Resolves a reconcile request to the current Service state and hands it
/// to the service handler, treating a missing Service as a deletion.
pub struct Reconciler {
    client: Arc<dyn ServiceClient>,
    handler: Arc<dyn ServiceHandler>,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ServiceClient>, handler: Arc<dyn ServiceHandler>) -> Self {
        Self { client, handler }
    }

    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<()> {
        let svc_name = format!("{name}.{namespace}");

        match self.client.get(namespace, name).await? {
            Some(svc) => self
                .handler
                .handle(&svc)
                .await
                .context("failed to handle service"),

            None => self.handler.handle_delete(&svc_name).await,
        }
    }
}
