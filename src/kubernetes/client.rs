use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{ListParams, ObjectList};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, Resource};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::ResourceLister;
use crate::progress::ProgressHandle;

/// Timeout for connecting to K8s API
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for reading K8s API responses
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for paginated list requests
const PAGE_SIZE: u32 = 500;

/// Lists contexts, namespaces and pods through the Kubernetes API
/// Caches one client per context name
pub struct KubeLister {
    kubeconfig: Kubeconfig,
    clients: Arc<RwLock<HashMap<String, Client>>>,
    progress: Option<ProgressHandle>,
}

impl KubeLister {
    /// Load the kubeconfig (KUBECONFIG or ~/.kube/config) without connecting
    pub fn from_kubeconfig() -> Result<Self> {
        let kubeconfig = Kubeconfig::read().context("Failed to read kubeconfig")?;
        Ok(Self::new(kubeconfig))
    }

    pub fn new(kubeconfig: Kubeconfig) -> Self {
        Self {
            kubeconfig,
            clients: Arc::new(RwLock::new(HashMap::new())),
            progress: None,
        }
    }

    /// Report connection events to a progress handle
    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Get or create a client for the given context
    async fn get_or_create_client(&self, context: &str) -> Result<Client> {
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(context) {
                return Ok(client.clone());
            }
        }

        if !self.kubeconfig.contexts.iter().any(|c| c.name == context) {
            return Err(anyhow!("Context '{}' not found in kubeconfig", context));
        }

        if let Some(progress) = &self.progress {
            progress.connecting(context);
        }
        let start = Instant::now();

        let mut config = Config::from_custom_kubeconfig(
            self.kubeconfig.clone(),
            &KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            },
        )
        .await
        .with_context(|| format!("Failed to load kubeconfig for context '{}'", context))?;

        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);

        let client = Client::try_from(config)
            .with_context(|| format!("Failed to create client for context '{}'", context))?;

        if let Some(progress) = &self.progress {
            progress.connected(context, start.elapsed().as_millis() as u64);
        }

        // Namespace branches of one context race here; the loser's client is dropped
        let mut clients = self.clients.write().await;
        let client = clients
            .entry(context.to_string())
            .or_insert(client)
            .clone();

        Ok(client)
    }

    /// List every object of `api` following continue tokens, keeping only names
    async fn list_names<K>(api: &Api<K>, what: &str, context: &str) -> Result<Vec<String>>
    where
        K: Resource + Clone + DeserializeOwned + Debug,
    {
        let mut names = Vec::new();
        let mut continue_token: Option<String> = None;
        let mut page_count = 0u32;

        loop {
            let mut params = ListParams::default().limit(PAGE_SIZE);
            if let Some(ref token) = continue_token {
                params = params.continue_token(token);
            }

            let list: ObjectList<K> = api
                .list(&params)
                .await
                .with_context(|| format!("Failed to list {} in context '{}'", what, context))?;
            page_count += 1;

            names.extend(list.items.iter().filter_map(|item| item.meta().name.clone()));

            match list.metadata.continue_ {
                Some(token) if !token.is_empty() => {
                    trace!(
                        context = %context,
                        kind = %what,
                        page = page_count,
                        total_so_far = names.len(),
                        "Fetched page, continuing"
                    );
                    continue_token = Some(token);
                }
                _ => break,
            }
        }

        debug!(
            context = %context,
            kind = %what,
            pages = page_count,
            count = names.len(),
            "Listed names"
        );

        Ok(names)
    }
}

#[async_trait]
impl ResourceLister for KubeLister {
    async fn list_contexts(&self) -> Result<Vec<String>> {
        Ok(self
            .kubeconfig
            .contexts
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    async fn list_namespaces(&self, context: &str) -> Result<Vec<String>> {
        let client = self.get_or_create_client(context).await?;
        let api: Api<Namespace> = Api::all(client);
        Self::list_names(&api, "namespaces", context).await
    }

    async fn list_pods(&self, context: &str, namespace: &str) -> Result<Vec<String>> {
        let client = self.get_or_create_client(context).await?;
        let api: Api<Pod> = Api::namespaced(client, namespace);
        Self::list_names(&api, "pods", context).await
    }
}
