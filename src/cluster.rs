//! Lazily constructed Kubernetes client shared by all admission requests.
//!
//! The client is built on first use from the in-cluster service account
//! credentials. Construction runs exactly once; its outcome, success or
//! failure, is kept for the lifetime of the process.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, Config};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::error::{ClientError, Error, Result};

type ClientFactory = Box<dyn Fn() -> std::result::Result<Client, ClientError> + Send + Sync>;

/// Read access to the pods of a namespace
#[async_trait]
pub trait PodLister: Send + Sync {
    /// List every pod in `namespace`, without server-side filtering
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;
}

/// Process-wide Kubernetes client handle
pub struct ClusterClient {
    cell: OnceCell<std::result::Result<Client, ClientError>>,
    factory: ClientFactory,
}

impl ClusterClient {
    /// Client built from in-cluster credentials on first use
    pub fn in_cluster() -> Self {
        Self::with_factory(in_cluster_client)
    }

    /// Client built by `factory` on first use
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> std::result::Result<Client, ClientError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    /// Wrap an already constructed client
    pub fn with_client(client: Client) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Ok(client))),
            factory: Box::new(|| Err(ClientError::Build("client already provided".into()))),
        }
    }

    /// Get the shared client, constructing it if this is the first call.
    ///
    /// Concurrent callers wait for the single in-flight construction.
    pub async fn acquire(&self) -> std::result::Result<Client, ClientError> {
        self.cell
            .get_or_init(|| async {
                debug!("Constructing Kubernetes client");
                let result = (self.factory)();
                match &result {
                    Ok(_) => info!("Kubernetes client ready"),
                    Err(e) => error!(error = %e, "Kubernetes client construction failed"),
                }
                result
            })
            .await
            .clone()
    }
}

#[async_trait]
impl PodLister for ClusterClient {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let client = self.acquire().await?;
        let pods: Api<Pod> = Api::namespaced(client, namespace);
        let list = pods
            .list(&ListParams::default())
            .await
            .map_err(|source| Error::List {
                namespace: namespace.to_string(),
                source,
            })?;
        Ok(list.items)
    }
}

fn in_cluster_client() -> std::result::Result<Client, ClientError> {
    let config = Config::incluster().map_err(|e| ClientError::InClusterConfig(e.to_string()))?;
    Client::try_from(config).map_err(|e| ClientError::Build(e.to_string()))
}
