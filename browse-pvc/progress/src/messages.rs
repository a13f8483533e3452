//! Longer progress message texts that are shown in more than one place.

/// Warning when a claim with a shared access mode is already mounted somewhere.
pub const SHARED_CLAIM_ATTACHED: &str = "The claim is already mounted, but its access mode allows \
    concurrent mounts, so the browse pod may be scheduled on any node.";

/// Warning when a single-node claim is already mounted, so the browse pod has to share that node.
pub const EXCLUSIVE_CLAIM_ATTACHED: &str = "The claim is already mounted with a single-node access \
    mode, the browse pod will be pinned to the same node.";

/// Warning when more than one pod mounts a claim that should only be mounted from one node.
pub const MULTIPLE_EXCLUSIVE_ATTACHMENTS: &str = "More than one pod mounts this single-node claim, \
    the first one found decides where the browse pod runs.";
