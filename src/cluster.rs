use async_trait::async_trait;
use eyre::{Context, Result};
use k8s_openapi::api::core::v1::Service;
use kube::api::ListParams;
use kube::{Api, Client};

/// The view of the cluster API the reconciler and the tracker need: fetch
/// one Service or list them all.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Fetches one Service, `None` when it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    /// Lists Services across all namespaces.
    async fn list_all(&self) -> Result<Vec<Service>>;
}

pub struct KubeServiceClient {
    client: Client,
}

impl KubeServiceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceClient for KubeServiceClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);

        match api.get(name).await {
            Ok(svc) => Ok(Some(svc)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e).with_context(|| format!("could not fetch service {namespace}/{name}")),
        }
    }

    async fn list_all(&self) -> Result<Vec<Service>> {
        let api: Api<Service> = Api::all(self.client.clone());

        let services = api
            .list(&ListParams::default())
            .await
            .context("failed to list services")?;

        Ok(services.items)
    }
}
