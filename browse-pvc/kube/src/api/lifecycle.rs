use std::time::Duration;

use browse_pvc_progress::Progress;
use k8s_openapi::api::{batch::v1::Job, core::v1::Pod};
use thiserror::Error;
use tracing::{debug, info, trace, Level};

use crate::{
    api::container::job::BrowseJob,
    error::{KubeApiError, Result},
};

/// The cluster operations the lifecycle needs, so it can run against a test double.
#[allow(async_fn_in_trait)]
pub trait WorkloadApi {
    async fn create_job(&self, job: &Job) -> Result<Job>;

    async fn get_job(&self, name: &str) -> Result<Job>;

    async fn list_pods(&self, label_selector: &str) -> Result<Vec<Pod>>;

    async fn get_pod(&self, name: &str) -> Result<Pod>;

    async fn pod_logs(&self, name: &str) -> Result<String>;
}

/// How often, and how many times, the cluster is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollConfig {
    /// Budget shared by "job is active" and "pod is running".
    pub const READY: PollConfig = PollConfig {
        attempts: 30,
        interval: Duration::from_secs(1),
    };

    /// Budget for a job running a user supplied command to finish.
    pub const COMPLETION: PollConfig = PollConfig {
        attempts: 300,
        interval: Duration::from_secs(1),
    };
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig::READY
    }
}

/// Where the browse job is on its way to a running pod.
///
/// Only ever moves forward, [`LifecyclePhase::Failed`] and [`LifecyclePhase::TimedOut`] can be
/// reached from any non-terminal phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    Submitted,
    Active,
    PodDiscovered,
    PodRunning,
    Failed(String),
    TimedOut,
}

impl LifecyclePhase {
    fn rank(&self) -> u8 {
        match self {
            LifecyclePhase::Submitted => 0,
            LifecyclePhase::Active => 1,
            LifecyclePhase::PodDiscovered => 2,
            LifecyclePhase::PodRunning => 3,
            LifecyclePhase::Failed(_) | LifecyclePhase::TimedOut => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::PodRunning | LifecyclePhase::Failed(_) | LifecyclePhase::TimedOut
        )
    }
}

impl From<&LifecycleError> for LifecyclePhase {
    fn from(error: &LifecycleError) -> Self {
        if error.is_timeout() {
            LifecyclePhase::TimedOut
        } else {
            LifecyclePhase::Failed(error.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to create job `{job}`: {source}")]
    Submit {
        job: String,
        #[source]
        source: KubeApiError,
    },

    #[error("Job `{job}` did not become active within {attempts} polling attempts")]
    ActivationTimeout { job: String, attempts: u32 },

    #[error("Pod `{pod}` did not reach the `Running` phase within {attempts} polling attempts")]
    ReadyTimeout { pod: String, attempts: u32 },

    #[error("Job `{job}` did not finish within {attempts} polling attempts")]
    CompletionTimeout { job: String, attempts: u32 },

    #[error("No pod matches `{selector}`")]
    PodNotFound { selector: String },

    #[error("Found {count} pods matching `{selector}`, expected exactly one")]
    AmbiguousPods { selector: String, count: usize },

    #[error("Pod `{pod}` reached the `{phase}` phase without ever running")]
    PodTerminated { pod: String, phase: String },

    #[error(transparent)]
    Kube(#[from] KubeApiError),
}

impl LifecycleError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            LifecycleError::ActivationTimeout { .. }
                | LifecycleError::ReadyTimeout { .. }
                | LifecycleError::CompletionTimeout { .. }
        )
    }
}

/// How a job running a user supplied command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug)]
struct AttemptBudget {
    total: u32,
    remaining: u32,
}

impl AttemptBudget {
    fn new(total: u32) -> Self {
        AttemptBudget {
            total,
            remaining: total,
        }
    }

    fn try_take(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(remaining) => {
                self.remaining = remaining;
                true
            }
            None => false,
        }
    }
}

/// Drives a submitted [`BrowseJob`] until its single pod is running.
///
/// Both waiting stages draw from the same [`AttemptBudget`], a slow start leaves less time for
/// the pod to become ready.
#[derive(Debug)]
pub struct JobLifecycle<'a, W> {
    api: &'a W,
    job_name: String,
    selector: String,
    interval: Duration,
    budget: AttemptBudget,
    phase: LifecyclePhase,
}

impl<'a, W> JobLifecycle<'a, W>
where
    W: WorkloadApi,
{
    /// Creates the job in the cluster, the returned lifecycle starts in
    /// [`LifecyclePhase::Submitted`].
    #[tracing::instrument(level = Level::DEBUG, skip_all, fields(job = job.name()), err)]
    pub async fn submit(
        api: &'a W,
        job: &BrowseJob,
        config: PollConfig,
    ) -> Result<Self, LifecycleError> {
        let created = api
            .create_job(&job.as_update())
            .await
            .map_err(|source| LifecycleError::Submit {
                job: job.name().to_string(),
                source,
            })?;

        // the api server may have mangled the name (`generateName`), trust what it returned
        let job_name = created
            .metadata
            .name
            .unwrap_or_else(|| job.name().to_string());
        info!(%job_name, "browse job created");

        Ok(JobLifecycle {
            api,
            selector: job.label_selector(),
            job_name,
            interval: config.interval,
            budget: AttemptBudget::new(config.attempts),
            phase: LifecyclePhase::Submitted,
        })
    }

    pub fn phase(&self) -> &LifecyclePhase {
        &self.phase
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.budget.remaining
    }

    fn advance(&mut self, next: LifecyclePhase) {
        debug_assert!(
            next.rank() > self.phase.rank(),
            "lifecycle moved backwards from {:?} to {next:?}",
            self.phase
        );
        trace!(from = ?self.phase, to = ?next, "lifecycle transition");
        self.phase = next;
    }

    fn fail(&mut self, error: LifecycleError) -> LifecycleError {
        self.advance(LifecyclePhase::from(&error));
        error
    }

    /// [`LifecyclePhase::Submitted`] -> [`LifecyclePhase::Active`]: the job controller started
    /// at least one pod.
    pub async fn wait_active(&mut self) -> Result<(), LifecycleError> {
        while self.budget.try_take() {
            let job = match self.api.get_job(&self.job_name).await {
                Ok(job) => job,
                Err(error) => return Err(self.fail(error.into())),
            };

            let active = job
                .status
                .as_ref()
                .and_then(|status| status.active)
                .unwrap_or_default();
            debug!(active, remaining = self.budget.remaining, "polled job");

            if active > 0 {
                self.advance(LifecyclePhase::Active);
                return Ok(());
            }

            tokio::time::sleep(self.interval).await;
        }

        let error = LifecycleError::ActivationTimeout {
            job: self.job_name.clone(),
            attempts: self.budget.total,
        };
        Err(self.fail(error))
    }

    /// [`LifecyclePhase::Active`] -> [`LifecyclePhase::PodDiscovered`]: exactly one pod carries
    /// the job's label.
    ///
    /// Not retried, the job name is derived from the claim so a second pod means something else
    /// is going on in the namespace.
    pub async fn discover_pod(&mut self) -> Result<Pod, LifecycleError> {
        let pods = match self.api.list_pods(&self.selector).await {
            Ok(pods) => pods,
            Err(error) => return Err(self.fail(error.into())),
        };

        match <[Pod; 1]>::try_from(pods) {
            Ok([pod]) => {
                self.advance(LifecyclePhase::PodDiscovered);
                Ok(pod)
            }
            Err(pods) if pods.is_empty() => {
                let error = LifecycleError::PodNotFound {
                    selector: self.selector.clone(),
                };
                Err(self.fail(error))
            }
            Err(pods) => {
                let error = LifecycleError::AmbiguousPods {
                    selector: self.selector.clone(),
                    count: pods.len(),
                };
                Err(self.fail(error))
            }
        }
    }

    /// [`LifecyclePhase::PodDiscovered`] -> [`LifecyclePhase::PodRunning`], with whatever is
    /// left of the attempt budget.
    pub async fn wait_running(&mut self, mut pod: Pod) -> Result<Pod, LifecycleError> {
        let Some(pod_name) = pod.metadata.name.clone() else {
            let error = KubeApiError::missing_field(&pod, ".metadata.name").into();
            return Err(self.fail(error));
        };

        loop {
            let phase = pod_phase(&pod).map(str::to_owned);

            match phase.as_deref() {
                Some("Running") => {
                    self.advance(LifecyclePhase::PodRunning);
                    return Ok(pod);
                }
                Some(phase @ ("Succeeded" | "Failed")) => {
                    let error = LifecycleError::PodTerminated {
                        pod: pod_name,
                        phase: phase.to_string(),
                    };
                    return Err(self.fail(error));
                }
                phase => debug!(?phase, remaining = self.budget.remaining, "pod not running yet"),
            }

            if !self.budget.try_take() {
                let error = LifecycleError::ReadyTimeout {
                    pod: pod_name,
                    attempts: self.budget.total,
                };
                return Err(self.fail(error));
            }

            tokio::time::sleep(self.interval).await;

            pod = match self.api.get_pod(&pod_name).await {
                Ok(pod) => pod,
                Err(error) => return Err(self.fail(error.into())),
            };
        }
    }

    /// Runs the three waiting stages, reporting each of them on `progress`.
    pub async fn wait_ready<P>(&mut self, progress: &P) -> Result<Pod, LifecycleError>
    where
        P: Progress,
    {
        let mut stage = progress.subtask("waiting for job to start...");
        if let Err(fail) = self.wait_active().await {
            stage.failure(Some(&fail.to_string()));
            return Err(fail);
        }
        stage.success(Some("job is active"));

        let mut stage = progress.subtask("looking for job pod...");
        let pod = match self.discover_pod().await {
            Ok(pod) => pod,
            Err(fail) => {
                stage.failure(Some(&fail.to_string()));
                return Err(fail);
            }
        };
        stage.success(Some("found job pod"));

        let mut stage = progress.subtask("waiting for pod to be ready...");
        match self.wait_running(pod).await {
            Ok(pod) => {
                stage.success(Some("pod is running"));
                Ok(pod)
            }
            Err(fail) => {
                stage.failure(Some(&fail.to_string()));
                Err(fail)
            }
        }
    }

    /// Waits for a job running a user supplied command to finish, with its own attempt budget.
    ///
    /// Leaves the phase alone, the caller moves on with [`JobLifecycle::discover_pod`] to fetch
    /// the pod's logs.
    pub async fn wait_finished(&self, config: PollConfig) -> Result<JobOutcome, LifecycleError> {
        let mut budget = AttemptBudget::new(config.attempts);

        while budget.try_take() {
            let job = self.api.get_job(&self.job_name).await?;
            let (succeeded, failed) = job
                .status
                .as_ref()
                .map(|status| {
                    (
                        status.succeeded.unwrap_or_default(),
                        status.failed.unwrap_or_default(),
                    )
                })
                .unwrap_or_default();

            if succeeded > 0 {
                return Ok(JobOutcome::Succeeded);
            } else if failed > 0 {
                return Ok(JobOutcome::Failed);
            }

            tokio::time::sleep(config.interval).await;
        }

        Err(LifecycleError::CompletionTimeout {
            job: self.job_name.clone(),
            attempts: config.attempts,
        })
    }

    pub async fn pod_logs(&self, pod: &Pod) -> Result<String, LifecycleError> {
        let name = pod
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| KubeApiError::missing_field(pod, ".metadata.name"))?;

        Ok(self.api.pod_logs(name).await?)
    }
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
}
