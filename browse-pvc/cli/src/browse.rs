use browse_pvc_kube::{
    api::{
        claim::{resolve, AccessClass, AttachedPod, AttachmentHint, VolumeClaim},
        container::{
            job::BrowseJob,
            util::{shell_command, tolerations_for_taints, CONTAINER_NAME},
            BrowseJobOptions,
        },
        kubernetes::{create_kube_api, get_node_taints, list_namespace_pods, KubeWorkloads},
        lifecycle::{JobLifecycle, JobOutcome, PollConfig},
        owner::resolve_controller,
    },
    error::KubeApiError,
};
use browse_pvc_progress::{messages, Progress, ProgressTracker};
use browse_pvc_session::{
    error::SessionError,
    exec::KubeExec,
    resize::platform_source,
    session::{Session, SessionIo},
    terminal::CrosstermTerminal,
};
use kube::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::{
    config::BrowseOptions,
    error::{CliError, CliResult},
};

/// Mounts the claim in a browse job, then either attaches a shell to it or prints the output of
/// the user's command.
pub(crate) async fn browse(options: BrowseOptions, mut progress: ProgressTracker) -> CliResult<()> {
    let client = create_kube_api(
        options.accept_invalid_certificates,
        options.kubeconfig.as_deref(),
        options.context.clone(),
    )
    .await
    .map_err(CliError::CreateKubeApiFailed)?;

    let namespace = options
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());
    debug!(%namespace, claim = %options.claim, "browsing claim");

    let mut lookup = progress.subtask("looking up claim...");
    let claim = match VolumeClaim::fetch(&client, &namespace, &options.claim).await {
        Ok(claim) => claim,
        Err(source) => {
            lookup.failure(None);
            return Err(CliError::ClaimLookup {
                claim: options.claim,
                source,
            });
        }
    };
    lookup.success(Some(&format!("found claim `{}`", claim.name)));

    let job = prepare_job(&client, &namespace, &claim, options, &progress).await?;
    let workloads = KubeWorkloads::new(&client, &namespace);

    let mut lifecycle = JobLifecycle::submit(&workloads, &job, PollConfig::READY)
        .await
        .map_err(|fail| CliError::lifecycle(job.name(), fail))?;
    progress.info(&format!("created job `{}`", lifecycle.job_name()));

    if job.is_interactive() {
        let pod = lifecycle
            .wait_ready(&progress)
            .await
            .map_err(|fail| CliError::lifecycle(job.name(), fail))?;
        let pod_name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| CliError::KubeApi(KubeApiError::missing_field(&pod, ".metadata.name")))?;

        // the spinner has to be gone before the terminal goes raw
        progress.success(Some(&format!("attaching to `{pod_name}`")));

        let exec = KubeExec::new(
            workloads.pod_api().clone(),
            pod_name,
            CONTAINER_NAME.to_string(),
        );
        let source = platform_source().map_err(SessionError::Terminal)?;

        Session::new(CrosstermTerminal, exec)
            .attach(shell_command(), source, SessionIo::std())
            .await?;
        info!("session ended");

        Ok(())
    } else {
        let mut waiting = progress.subtask("waiting for job to finish...");
        let outcome = match lifecycle.wait_finished(PollConfig::COMPLETION).await {
            Ok(outcome) => outcome,
            Err(fail) => {
                waiting.failure(Some(&fail.to_string()));
                return Err(CliError::lifecycle(job.name(), fail));
            }
        };
        waiting.success(Some("job finished"));

        let pod = lifecycle
            .discover_pod()
            .await
            .map_err(|fail| CliError::lifecycle(job.name(), fail))?;
        let logs = lifecycle
            .pod_logs(&pod)
            .await
            .map_err(|fail| CliError::lifecycle(job.name(), fail))?;
        progress.success(None);

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(logs.as_bytes())
            .await
            .map_err(CliError::Output)?;
        stdout.flush().await.map_err(CliError::Output)?;

        match outcome {
            JobOutcome::Succeeded => Ok(()),
            JobOutcome::Failed => Err(CliError::CommandFailed(job.name().to_string())),
        }
    }
}

/// Decides where the browse job can run, telling the user about whoever already mounts the
/// claim.
async fn prepare_job<P>(
    client: &Client,
    namespace: &str,
    claim: &VolumeClaim,
    options: BrowseOptions,
    progress: &P,
) -> CliResult<BrowseJob>
where
    P: Progress,
{
    let pods = list_namespace_pods(client, namespace)
        .await
        .map_err(CliError::KubeApi)?;
    let hint = resolve(&pods, &claim.name);
    let placement = hint.placement(claim);

    if let Some(attached) = hint.attached.as_ref() {
        if let Ok(node) = &placement {
            for notice in attachment_notices(&hint, claim, node.as_deref()) {
                match notice {
                    AttachmentNotice::Warning(msg) => progress.warning(msg),
                    AttachmentNotice::Info(msg) => progress.info(msg),
                }
            }
        }

        let exclusive = claim.access_class() == AccessClass::Exclusive;
        advise_owner(client, namespace, attached, exclusive, progress).await;
    }

    let node = placement.map_err(CliError::ClaimUnavailable)?;
    let tolerations = match node.as_deref() {
        Some(node) => {
            let taints = get_node_taints(client, node)
                .await
                .map_err(CliError::KubeApi)?;
            tolerations_for_taints(&taints)
        }
        None => Vec::new(),
    };

    let BrowseOptions {
        image,
        container_user,
        command,
        ..
    } = options;

    Ok(BrowseJob::new(
        BrowseJobOptions::new(
            image,
            namespace.to_string(),
            claim.name.clone(),
            container_user,
        )
        .with_args(command)
        .pinned_to(node, tolerations),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachmentNotice {
    Warning(&'static str),
    Info(&'static str),
}

/// What to tell the user about pods already mounting the claim, once the browse job's node is
/// settled.
fn attachment_notices(
    hint: &AttachmentHint,
    claim: &VolumeClaim,
    node: Option<&str>,
) -> Vec<AttachmentNotice> {
    if !hint.is_mounted() {
        return Vec::new();
    }

    match claim.access_class() {
        AccessClass::Shared => vec![AttachmentNotice::Info(messages::SHARED_CLAIM_ATTACHED)],
        AccessClass::Exclusive => {
            let mut notices = Vec::new();
            if node.is_some() {
                notices.push(AttachmentNotice::Warning(messages::EXCLUSIVE_CLAIM_ATTACHED));
            }
            if hint.other_matches > 0 {
                notices.push(AttachmentNotice::Warning(
                    messages::MULTIPLE_EXCLUSIVE_ATTACHMENTS,
                ));
            }
            notices
        }
    }
}

/// Names the controller of the pod that mounts the claim, never scales anything itself.
async fn advise_owner<P>(
    client: &Client,
    namespace: &str,
    attached: &AttachedPod,
    exclusive: bool,
    progress: &P,
) where
    P: Progress,
{
    match resolve_controller(client, namespace, &attached.pod).await {
        Ok(owner) if exclusive => progress.info(&format!(
            "pod `{}` mounting the claim is managed by {owner}, scale it down if the browse pod can't start next to it",
            attached.name
        )),
        Ok(owner) => progress.info(&format!(
            "pod `{}` mounting the claim is managed by {owner}",
            attached.name
        )),
        Err(fail) => progress.warning(&fail.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Pod;
    use rstest::rstest;

    use super::*;

    fn attached(node: Option<&str>, other_matches: usize) -> AttachmentHint {
        AttachmentHint {
            attached: Some(AttachedPod {
                name: "db-0".to_string(),
                node_name: node.map(ToString::to_string),
                pod: Pod::default(),
            }),
            other_matches,
        }
    }

    fn claim(modes: &[&str]) -> VolumeClaim {
        VolumeClaim {
            name: "data".to_string(),
            namespace: "default".to_string(),
            access_modes: modes.iter().filter_map(|mode| mode.parse().ok()).collect(),
        }
    }

    #[test]
    fn unmounted_claim_has_no_notices() {
        let hint = AttachmentHint::default();

        assert!(attachment_notices(&hint, &claim(&["ReadWriteOnce"]), None).is_empty());
    }

    #[test]
    fn pinned_claim_warns() {
        let hint = attached(Some("n1"), 0);
        let claim = claim(&["ReadWriteOnce"]);
        let node = hint.placement(&claim).unwrap();

        assert_eq!(
            attachment_notices(&hint, &claim, node.as_deref()),
            vec![AttachmentNotice::Warning(messages::EXCLUSIVE_CLAIM_ATTACHED)]
        );
    }

    #[test]
    fn several_exclusive_attachments_warn_twice() {
        let hint = attached(Some("n1"), 2);
        let claim = claim(&["ReadOnlyOnce"]);
        let node = hint.placement(&claim).unwrap();

        assert_eq!(
            attachment_notices(&hint, &claim, node.as_deref()),
            vec![
                AttachmentNotice::Warning(messages::EXCLUSIVE_CLAIM_ATTACHED),
                AttachmentNotice::Warning(messages::MULTIPLE_EXCLUSIVE_ATTACHMENTS),
            ]
        );
    }

    #[rstest]
    #[case(&["ReadWriteMany"])]
    #[case(&["ReadOnlyMany"])]
    fn shared_claim_is_informational(#[case] modes: &[&str]) {
        let hint = attached(Some("n1"), 1);
        let claim = claim(modes);
        let node = hint.placement(&claim).unwrap();

        assert_eq!(node, None);
        assert_eq!(
            attachment_notices(&hint, &claim, node.as_deref()),
            vec![AttachmentNotice::Info(messages::SHARED_CLAIM_ATTACHED)]
        );
    }

    #[test]
    fn single_pod_claim_is_rejected_before_any_notice() {
        let hint = attached(Some("n1"), 0);

        assert!(matches!(
            hint.placement(&claim(&["ReadWriteOncePod"])),
            Err(KubeApiError::ClaimExclusivelyHeld { .. })
        ));
    }
}
