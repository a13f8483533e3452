use std::{
    convert::Infallible,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::{Api, Client};
use tracing::Level;

use crate::{
    api::kubernetes::get_k8s_resource_api,
    error::{KubeApiError, Result},
};

/// Access modes a [`PersistentVolumeClaim`] can declare.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Mounted read-write by a single node.
    ReadWriteOnce,
    /// Mounted read-only by a single node.
    ReadOnlyOnce,
    /// Mounted read-only by many nodes.
    ReadOnlyMany,
    /// Mounted read-write by many nodes.
    ReadWriteMany,
    /// Mounted read-write by a single pod.
    ReadWriteOncePod,
    /// Anything the cluster reports that we don't know about.
    Other(String),
}

impl AccessMode {
    /// Whether several nodes may mount the volume at the same time.
    pub fn is_shared(&self) -> bool {
        matches!(self, AccessMode::ReadOnlyMany | AccessMode::ReadWriteMany)
    }
}

impl FromStr for AccessMode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ReadWriteOnce" => AccessMode::ReadWriteOnce,
            "ReadOnlyOnce" => AccessMode::ReadOnlyOnce,
            "ReadOnlyMany" => AccessMode::ReadOnlyMany,
            "ReadWriteMany" => AccessMode::ReadWriteMany,
            "ReadWriteOncePod" => AccessMode::ReadWriteOncePod,
            other => AccessMode::Other(other.to_string()),
        })
    }
}

impl Display for AccessMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadWriteOnce => write!(f, "ReadWriteOnce"),
            AccessMode::ReadOnlyOnce => write!(f, "ReadOnlyOnce"),
            AccessMode::ReadOnlyMany => write!(f, "ReadOnlyMany"),
            AccessMode::ReadWriteMany => write!(f, "ReadWriteMany"),
            AccessMode::ReadWriteOncePod => write!(f, "ReadWriteOncePod"),
            AccessMode::Other(other) => write!(f, "{other}"),
        }
    }
}

/// Whether the volume behind a claim may be mounted from several nodes at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessClass {
    /// At most one node (or pod) may mount the volume.
    Exclusive,
    /// Any number of nodes may mount the volume.
    Shared,
}

/// The parts of a [`PersistentVolumeClaim`] we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeClaim {
    pub name: String,
    pub namespace: String,
    pub access_modes: Vec<AccessMode>,
}

impl VolumeClaim {
    /// Fetches the claim `name` from `namespace`.
    #[tracing::instrument(level = Level::DEBUG, skip(client), err)]
    pub async fn fetch(client: &Client, namespace: &str, name: &str) -> Result<Self> {
        let claim_api: Api<PersistentVolumeClaim> = get_k8s_resource_api(client, namespace);

        let claim = claim_api.get(name).await.map_err(|error| match error {
            kube::Error::Api(response) if response.code == 404 => KubeApiError::ClaimNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            },
            error => KubeApiError::KubeError(error),
        })?;

        Self::from_resource(&claim, namespace)
    }

    pub fn from_resource(claim: &PersistentVolumeClaim, namespace: &str) -> Result<Self> {
        let name = claim
            .metadata
            .name
            .clone()
            .ok_or_else(|| KubeApiError::missing_field(claim, ".metadata.name"))?;

        let access_modes = claim
            .spec
            .as_ref()
            .and_then(|spec| spec.access_modes.as_ref())
            .map(|modes| {
                modes
                    .iter()
                    .filter_map(|mode| mode.parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(VolumeClaim {
            name,
            namespace: claim
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| namespace.to_string()),
            access_modes,
        })
    }

    /// A claim is shared when any of its access modes allows multi-node mounts.
    pub fn access_class(&self) -> AccessClass {
        if self.access_modes.iter().any(AccessMode::is_shared) {
            AccessClass::Shared
        } else {
            AccessClass::Exclusive
        }
    }

    fn is_single_pod(&self) -> bool {
        self.access_modes.contains(&AccessMode::ReadWriteOncePod)
    }
}

/// A pod found mounting the claim.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedPod {
    pub name: String,
    pub node_name: Option<String>,
    pub pod: Pod,
}

/// Whether the claim is currently mounted, by which pod and on which node.
///
/// Only constrains placement when the claim's [`AccessClass`] is exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachmentHint {
    pub attached: Option<AttachedPod>,
    /// Number of pods mounting the claim besides [`AttachmentHint::attached`].
    pub other_matches: usize,
}

impl AttachmentHint {
    pub fn is_mounted(&self) -> bool {
        self.attached.is_some()
    }

    pub fn node_name(&self) -> Option<&str> {
        self.attached
            .as_ref()
            .and_then(|attached| attached.node_name.as_deref())
    }

    /// Node the browse job has to run on, if any.
    ///
    /// Fails when the claim may only ever be mounted by a single pod and someone already has it.
    pub fn placement(&self, claim: &VolumeClaim) -> Result<Option<String>> {
        let Some(attached) = self.attached.as_ref() else {
            return Ok(None);
        };

        if claim.is_single_pod() {
            return Err(KubeApiError::ClaimExclusivelyHeld {
                claim: claim.name.clone(),
                pod: attached.name.clone(),
            });
        }

        Ok(match claim.access_class() {
            AccessClass::Exclusive => attached.node_name.clone(),
            AccessClass::Shared => None,
        })
    }
}

/// Finds the first live pod in `pods` with a volume bound to the claim `claim_name`.
///
/// Pods that already `Succeeded` or `Failed` no longer hold the volume and are skipped.
pub fn resolve(pods: &[Pod], claim_name: &str) -> AttachmentHint {
    let mut matching = pods
        .iter()
        .filter(|pod| !is_terminated(pod) && mounts_claim(pod, claim_name));

    let attached = matching.next().map(|pod| AttachedPod {
        name: pod.metadata.name.clone().unwrap_or_default(),
        node_name: pod.spec.as_ref().and_then(|spec| spec.node_name.clone()),
        pod: pod.clone(),
    });

    AttachmentHint {
        attached,
        other_matches: matching.count(),
    }
}

fn is_terminated(pod: &Pod) -> bool {
    matches!(
        pod.status
            .as_ref()
            .and_then(|status| status.phase.as_deref()),
        Some("Succeeded" | "Failed")
    )
}

fn mounts_claim(pod: &Pod, claim_name: &str) -> bool {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.volumes.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|volume| volume.persistent_volume_claim.as_ref())
        .any(|source| source.claim_name == claim_name)
}
