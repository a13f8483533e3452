use k8s_openapi::api::core::v1::{Capabilities, SeccompProfile, SecurityContext, Taint, Toleration};

/// Where the claim is mounted inside the browse container.
pub const MOUNT_PATH: &str = "/mnt";

pub const CONTAINER_NAME: &str = "browser";

pub const VOLUME_NAME: &str = "target-pvc";

/// Seconds the finished job lingers before the cluster deletes it.
pub const TTL_SECONDS_AFTER_FINISHED: i32 = 10;

/// Keeps the job's main process alive until someone attaches a shell and then leaves.
///
/// Counts the shell processes in `/proc` once as a baseline, waits until an extra one shows up
/// (the `exec` session), and exits after that extra shell is gone.
pub const BROWSE_SCRIPT: &str = r#"
chmod +x /etc/profile.d/ps1.sh 2>/dev/null

count_shells() {
    ls /proc | grep -E '^[0-9]+$' | while read -r pid; do cat /proc/"$pid"/comm 2>/dev/null; done | grep -E "ash|bash|sh" | wc -l
}

base_processes=$(count_shells)
echo "Processes: $base_processes"
sleep 2

while :; do
    shell_processes=$(count_shells)
    if [ "$shell_processes" -gt "$base_processes" ]; then
        echo "Found an additional process"
        while [ "$shell_processes" -gt "$base_processes" ]; do
            sleep 2
            shell_processes=$(count_shells)
        done
        exit 0
    fi
    sleep 1
done
"#;

pub(crate) fn default_command() -> Vec<String> {
    ["/bin/sh", "-c", "--"]
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

/// Command run through the `exec` subresource to drop the operator into the mounted volume.
pub fn shell_command() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("cd {MOUNT_PATH} && (ash || bash || sh)"),
    ]
}

/// Security context for the browse container.
///
/// Root gets just enough to fix ownership on the volume (`CHOWN`, `FOWNER`), anyone else gets
/// nothing at all.
pub(super) fn security_context(user: i64) -> SecurityContext {
    let root = user == 0;

    let capabilities = if root {
        Capabilities {
            add: Some(vec!["CHOWN".to_string(), "FOWNER".to_string()]),
            drop: Some(vec!["ALL".to_string()]),
        }
    } else {
        Capabilities {
            add: None,
            drop: Some(vec!["ALL".to_string()]),
        }
    };

    SecurityContext {
        run_as_user: Some(user),
        run_as_non_root: Some(!root),
        allow_privilege_escalation: Some(root),
        capabilities: Some(capabilities),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// An `Equal` toleration for every taint, so a job pinned to a tainted node still gets admitted.
pub fn tolerations_for_taints(taints: &[Taint]) -> Vec<Toleration> {
    taints
        .iter()
        .map(|taint| Toleration {
            key: Some(taint.key.clone()),
            value: taint.value.clone(),
            operator: Some("Equal".to_string()),
            effect: Some(taint.effect.clone()),
            ..Default::default()
        })
        .collect()
}
