use std::ops::Deref;

use k8s_openapi::{
    api::{
        batch::v1::Job,
        core::v1::{Node, Pod, Taint},
    },
    NamespaceResourceScope,
};
use kube::{
    api::{ListParams, LogParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client, Config,
};
use tracing::{debug, Level};

use crate::{
    api::lifecycle::WorkloadApi,
    error::{KubeApiError, Result},
};

pub async fn create_kube_api<P>(
    accept_invalid_certificates: bool,
    kubeconfig: Option<P>,
    kube_context: Option<String>,
) -> Result<Client>
where
    P: AsRef<str>,
{
    let kube_config_opts = KubeConfigOptions {
        context: kube_context,
        ..Default::default()
    };

    let mut config = if let Some(kubeconfig) = kubeconfig {
        let kubeconfig = shellexpand::full(&kubeconfig)
            .map_err(|e| KubeApiError::ConfigPathExpansionError(e.to_string()))?;
        let parsed_kube_config = Kubeconfig::read_from(kubeconfig.deref())?;
        Config::from_custom_kubeconfig(parsed_kube_config, &kube_config_opts).await?
    } else if kube_config_opts.context.is_some() {
        // if context is set, it's not in cluster so it has to be a kubeconfig.
        Config::from_kubeconfig(&kube_config_opts).await?
    } else {
        // no context and no kubeconfig, infer tries local kube config first and then incluster.
        Config::infer().await?
    };
    config.accept_invalid_certs = accept_invalid_certificates;
    Client::try_from(config).map_err(KubeApiError::from)
}

pub fn get_k8s_resource_api<K>(client: &Client, namespace: &str) -> Api<K>
where
    K: kube::Resource<Scope = NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    Api::namespaced(client.clone(), namespace)
}

/// Every pod in `namespace`, used to find out who already mounts the claim.
#[tracing::instrument(level = Level::DEBUG, skip(client), err)]
pub async fn list_namespace_pods(client: &Client, namespace: &str) -> Result<Vec<Pod>> {
    let pod_api: Api<Pod> = get_k8s_resource_api(client, namespace);

    Ok(pod_api.list(&ListParams::default()).await?.items)
}

/// Taints of `node_name`, an untainted node has an empty list.
#[tracing::instrument(level = Level::DEBUG, skip(client), err)]
pub async fn get_node_taints(client: &Client, node_name: &str) -> Result<Vec<Taint>> {
    let node_api: Api<Node> = Api::all(client.clone());
    let node = node_api.get(node_name).await?;

    let taints = node
        .spec
        .and_then(|spec| spec.taints)
        .unwrap_or_default();
    debug!(?taints, "node taints");

    Ok(taints)
}

/// [`WorkloadApi`] backed by the cluster.
#[derive(Clone)]
pub struct KubeWorkloads {
    job_api: Api<Job>,
    pod_api: Api<Pod>,
}

impl KubeWorkloads {
    pub fn new(client: &Client, namespace: &str) -> Self {
        KubeWorkloads {
            job_api: get_k8s_resource_api(client, namespace),
            pod_api: get_k8s_resource_api(client, namespace),
        }
    }

    /// The pod api this was created with, for opening `exec` sessions on the browse pod.
    pub fn pod_api(&self) -> &Api<Pod> {
        &self.pod_api
    }
}

impl WorkloadApi for KubeWorkloads {
    async fn create_job(&self, job: &Job) -> Result<Job> {
        Ok(self.job_api.create(&PostParams::default(), job).await?)
    }

    async fn get_job(&self, name: &str) -> Result<Job> {
        Ok(self.job_api.get(name).await?)
    }

    async fn list_pods(&self, label_selector: &str) -> Result<Vec<Pod>> {
        Ok(self
            .pod_api
            .list(&ListParams::default().labels(label_selector))
            .await?
            .items)
    }

    async fn get_pod(&self, name: &str) -> Result<Pod> {
        Ok(self.pod_api.get(name).await?)
    }

    async fn pod_logs(&self, name: &str) -> Result<String> {
        Ok(self.pod_api.logs(name, &LogParams::default()).await?)
    }
}
