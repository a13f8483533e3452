//! Who keeps the pod that mounts the claim alive.
//!
//! Only reported to the user, so they know what to scale down when the claim can't be shared.

use std::{fmt, str::FromStr};

use k8s_openapi::{
    api::{
        apps::v1::ReplicaSet,
        batch::v1::Job,
        core::v1::Pod,
    },
    apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use kube::{Api, Client};
use thiserror::Error;
use tracing::{debug, Level};

use crate::{
    api::kubernetes::get_k8s_resource_api,
    error::{KubeApiError, Result},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OwnerError {
    #[error("it has no owner references")]
    NoOwner,

    #[error("it has {0} owner references, expected exactly one")]
    MultipleOwners(usize),

    #[error("owner kind `{0}` is not supported")]
    UnknownKind(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    ReplicaSet,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::ReplicaSet => "ReplicaSet",
            OwnerKind::Deployment => "Deployment",
            OwnerKind::StatefulSet => "StatefulSet",
            OwnerKind::DaemonSet => "DaemonSet",
            OwnerKind::Job => "Job",
            OwnerKind::CronJob => "CronJob",
        }
    }
}

impl FromStr for OwnerKind {
    type Err = OwnerError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind {
            "ReplicaSet" => Ok(OwnerKind::ReplicaSet),
            "Deployment" => Ok(OwnerKind::Deployment),
            "StatefulSet" => Ok(OwnerKind::StatefulSet),
            "DaemonSet" => Ok(OwnerKind::DaemonSet),
            "Job" => Ok(OwnerKind::Job),
            "CronJob" => Ok(OwnerKind::CronJob),
            other => Err(OwnerError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodOwner {
    pub kind: OwnerKind,
    pub name: String,
}

impl PodOwner {
    /// The single direct owner of `pod`.
    pub fn of_pod(pod: &Pod) -> Result<Self, OwnerError> {
        PodOwner::from_references(pod.metadata.owner_references.as_deref())
    }

    fn from_references(references: Option<&[OwnerReference]>) -> Result<Self, OwnerError> {
        let reference = match references.unwrap_or_default() {
            [] => return Err(OwnerError::NoOwner),
            [reference] => reference,
            many => return Err(OwnerError::MultipleOwners(many.len())),
        };

        Ok(PodOwner {
            kind: reference.kind.parse()?,
            name: reference.name.clone(),
        })
    }

    /// The owner that is worth scaling: a [`OwnerKind::ReplicaSet`] is reported as its
    /// deployment, a [`OwnerKind::Job`] as its cron job, when they have one.
    fn lift(self, parent: Option<&[OwnerReference]>) -> Self {
        let expected = match self.kind {
            OwnerKind::ReplicaSet => OwnerKind::Deployment,
            OwnerKind::Job => OwnerKind::CronJob,
            _ => return self,
        };

        match PodOwner::from_references(parent) {
            Ok(parent) if parent.kind == expected => parent,
            _ => self,
        }
    }
}

impl fmt::Display for PodOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.kind, self.name)
    }
}

/// Resolves the controller of `pod`, following `ReplicaSet`s and `Job`s one level up.
#[tracing::instrument(level = Level::DEBUG, skip(client, pod), err)]
pub async fn resolve_controller(client: &Client, namespace: &str, pod: &Pod) -> Result<PodOwner> {
    let owner = PodOwner::of_pod(pod).map_err(|source| KubeApiError::Owner {
        pod: pod.metadata.name.clone().unwrap_or_default(),
        source,
    })?;

    let parent = match owner.kind {
        OwnerKind::ReplicaSet => {
            let api: Api<ReplicaSet> = get_k8s_resource_api(client, namespace);
            api.get(&owner.name).await?.metadata.owner_references
        }
        OwnerKind::Job => {
            let api: Api<Job> = get_k8s_resource_api(client, namespace);
            api.get(&owner.name).await?.metadata.owner_references
        }
        _ => None,
    };

    let controller = owner.lift(parent.as_deref());
    debug!(%controller, "resolved controller");

    Ok(controller)
}

#[cfg(test)]
mod tests {
    use kube::api::ObjectMeta;
    use rstest::rstest;

    use super::*;

    fn reference(kind: &str, name: &str) -> OwnerReference {
        OwnerReference {
            kind: kind.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn owned_pod(references: Vec<OwnerReference>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("app".to_string()),
                owner_references: Some(references),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[rstest]
    #[case("ReplicaSet", OwnerKind::ReplicaSet)]
    #[case("StatefulSet", OwnerKind::StatefulSet)]
    #[case("DaemonSet", OwnerKind::DaemonSet)]
    #[case("Job", OwnerKind::Job)]
    fn single_owner(#[case] kind: &str, #[case] expected: OwnerKind) {
        let owner = PodOwner::of_pod(&owned_pod(vec![reference(kind, "web")])).unwrap();

        assert_eq!(owner.kind, expected);
        assert_eq!(owner.name, "web");
    }

    #[test]
    fn no_owner() {
        assert_eq!(PodOwner::of_pod(&Pod::default()), Err(OwnerError::NoOwner));
        assert_eq!(
            PodOwner::of_pod(&owned_pod(Vec::new())),
            Err(OwnerError::NoOwner)
        );
    }

    #[test]
    fn multiple_owners() {
        let pod = owned_pod(vec![
            reference("ReplicaSet", "a"),
            reference("StatefulSet", "b"),
        ]);

        assert_eq!(PodOwner::of_pod(&pod), Err(OwnerError::MultipleOwners(2)));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let pod = owned_pod(vec![reference("Rollout", "canary")]);

        assert_eq!(
            PodOwner::of_pod(&pod),
            Err(OwnerError::UnknownKind("Rollout".to_string()))
        );
    }

    #[rstest]
    #[case(OwnerKind::ReplicaSet, "Deployment", OwnerKind::Deployment)]
    #[case(OwnerKind::Job, "CronJob", OwnerKind::CronJob)]
    fn lifts_to_parent(
        #[case] kind: OwnerKind,
        #[case] parent_kind: &str,
        #[case] expected: OwnerKind,
    ) {
        let owner = PodOwner {
            kind,
            name: "child".to_string(),
        };
        let parent = [reference(parent_kind, "parent")];

        let lifted = owner.lift(Some(&parent));

        assert_eq!(lifted.kind, expected);
        assert_eq!(lifted.name, "parent");
    }

    #[rstest]
    #[case::orphan(None)]
    #[case::unexpected_parent(Some(reference("StatefulSet", "parent")))]
    fn stays_put_without_matching_parent(#[case] parent: Option<OwnerReference>) {
        let owner = PodOwner {
            kind: OwnerKind::ReplicaSet,
            name: "web-5d8f".to_string(),
        };
        let parent: Vec<_> = parent.into_iter().collect();

        assert_eq!(owner.clone().lift(Some(&parent)), owner);
    }

    #[test]
    fn statefulset_is_not_lifted() {
        let owner = PodOwner {
            kind: OwnerKind::StatefulSet,
            name: "db".to_string(),
        };

        assert_eq!(
            owner.clone().lift(Some(&[reference("Deployment", "x")])),
            owner
        );
    }

    #[test]
    fn display() {
        let owner = PodOwner {
            kind: OwnerKind::Deployment,
            name: "web".to_string(),
        };

        assert_eq!(owner.to_string(), "Deployment `web`");
    }
}
