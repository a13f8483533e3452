use k8s_openapi::api::{
    batch::v1::{Job, JobSpec},
    core::v1::{
        Container, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Volume,
        VolumeMount,
    },
};
use kube::api::ObjectMeta;

use crate::api::container::{
    util::{
        security_context, BROWSE_SCRIPT, CONTAINER_NAME, MOUNT_PATH, TTL_SECONDS_AFTER_FINISHED,
        VOLUME_NAME,
    },
    BrowseJobOptions,
};

/// Label the job controller puts on every pod it creates.
pub const JOB_NAME_LABEL: &str = "job-name";

/// The disposable job that mounts the claim.
///
/// Its name is derived from the claim, so there is at most one browse job per claim in a
/// namespace, and its pod can be found again with [`BrowseJob::label_selector`].
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseJob {
    name: String,
    options: BrowseJobOptions,
}

impl BrowseJob {
    pub fn new(options: BrowseJobOptions) -> Self {
        BrowseJob {
            name: format!("browse-{}", options.claim_name),
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.options.namespace
    }

    pub fn options(&self) -> &BrowseJobOptions {
        &self.options
    }

    pub fn label_selector(&self) -> String {
        format!("{JOB_NAME_LABEL}={}", self.name)
    }

    /// Whether the job runs the browse script, as opposed to a user supplied command.
    pub fn is_interactive(&self) -> bool {
        self.options.args.is_empty()
    }

    pub fn as_update(&self) -> Job {
        let BrowseJob { name, options } = self;

        let args = if options.args.is_empty() {
            vec![BROWSE_SCRIPT.to_string()]
        } else {
            options.args.clone()
        };

        let tolerations = (!options.tolerations.is_empty()).then(|| options.tolerations.clone());

        Job {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(options.namespace.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                ttl_seconds_after_finished: Some(TTL_SECONDS_AFTER_FINISHED),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        name: Some("browse-pvc".to_string()),
                        labels: Some([(JOB_NAME_LABEL.to_string(), name.clone())].into()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        restart_policy: Some("Never".to_string()),
                        node_name: options.node.clone(),
                        tolerations,
                        containers: vec![Container {
                            name: CONTAINER_NAME.to_string(),
                            image: Some(options.image.clone()),
                            command: Some(options.command.clone()),
                            args: Some(args),
                            security_context: Some(security_context(options.user)),
                            env: Some(vec![EnvVar {
                                name: "PS1".to_string(),
                                value: Some("\\h:\\w\\$ ".to_string()),
                                ..Default::default()
                            }]),
                            volume_mounts: Some(vec![VolumeMount {
                                name: VOLUME_NAME.to_string(),
                                mount_path: MOUNT_PATH.to_string(),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        volumes: Some(vec![Volume {
                            name: VOLUME_NAME.to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: options.claim_name.clone(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
