use thiserror::Error;

use crate::api::owner::OwnerError;

pub type Result<T, E = KubeApiError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum KubeApiError {
    #[error("Kube failed: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to infer Kube config: {0}")]
    InferKubeConfigError(#[from] kube::config::InferConfigError),

    #[error("Failed to load Kube config: {0}")]
    KubeConfigPathError(#[from] kube::config::KubeconfigError),

    #[error("Path expansion for kubeconfig failed: {0}")]
    ConfigPathExpansionError(String),

    #[error("PersistentVolumeClaim `{name}` not found in namespace `{namespace}`")]
    ClaimNotFound { name: String, namespace: String },

    #[error(
        "PersistentVolumeClaim `{claim}` uses the `ReadWriteOncePod` access mode and is already mounted by pod `{pod}`"
    )]
    ClaimExclusivelyHeld { claim: String, pod: String },

    #[error("{kind} `{name}` is missing field `{field}`")]
    MissingField {
        kind: &'static str,
        name: String,
        field: &'static str,
    },

    #[error("Failed to identify the controller of pod `{pod}`: {source}")]
    Owner {
        pod: String,
        #[source]
        source: OwnerError,
    },
}

impl KubeApiError {
    pub fn missing_field<R>(resource: &R, field: &'static str) -> Self
    where
        R: kube::Resource<DynamicType = ()>,
    {
        KubeApiError::MissingField {
            kind: static_kind::<R>(),
            name: resource.meta().name.clone().unwrap_or_default(),
            field,
        }
    }
}

/// [`kube::Resource::kind`] returns a `Cow` for dynamic types, but for the static
/// `k8s-openapi` types the kind is always a `&'static str` constant.
fn static_kind<R>() -> &'static str
where
    R: kube::Resource<DynamicType = ()>,
{
    match R::kind(&()) {
        std::borrow::Cow::Borrowed(kind) => kind,
        std::borrow::Cow::Owned(_) => "resource",
    }
}
