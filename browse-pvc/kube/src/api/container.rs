use k8s_openapi::api::core::v1::Toleration;

pub mod job;
pub mod util;

/// Everything needed to describe the browse job.
///
/// Built once from the command line and the cluster state, then passed by value into
/// [`job::BrowseJob::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseJobOptions {
    pub image: String,
    pub namespace: String,
    pub claim_name: String,
    /// Container entrypoint.
    pub command: Vec<String>,
    /// Container arguments, the self-terminating browse script is used when empty.
    pub args: Vec<String>,
    /// Node the job is pinned to, when the claim can only be mounted from there.
    pub node: Option<String>,
    /// `runAsUser` for the browse container, `0` gets a root security posture.
    pub user: i64,
    pub tolerations: Vec<Toleration>,
}

impl BrowseJobOptions {
    /// Options with the default `/bin/sh -c --` entrypoint and no placement constraints.
    pub fn new(image: String, namespace: String, claim_name: String, user: i64) -> Self {
        BrowseJobOptions {
            image,
            namespace,
            claim_name,
            command: util::default_command(),
            args: Vec::new(),
            node: None,
            user,
            tolerations: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Pins the job to `node`, tolerating whatever that node is tainted with.
    pub fn pinned_to(mut self, node: Option<String>, tolerations: Vec<Toleration>) -> Self {
        self.node = node;
        self.tolerations = tolerations;
        self
    }
}
