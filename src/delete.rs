// Batch deletion
// --------------
// Submits one delete request for all target paths. When the server hands
// back an async job id, the job is polled at a fixed interval until it
// completes or fails, the optional deadline passes, or the caller cancels.
// Cancelling only stops the waiting: a submitted job keeps running
// server side.

use crate::api::{DeleteLaunch, JobStatus, StorageApi};
use crate::error::ApiError;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use crate::cancel::CancelToken;

/// Longest single sleep while waiting, so cancellation is noticed quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Pause between status checks.
    pub interval: Duration,
    /// Stop waiting after this long. `None` waits forever.
    pub deadline: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Every path was deleted.
    Done,
    /// The job reported failure with this reason.
    Failed(String),
    /// The deadline passed while the job was still running.
    TimedOut { job_id: String },
    /// The caller cancelled; `job_id` is `None` if nothing was submitted.
    Cancelled { job_id: Option<String> },
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Done)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    pub outcome: PollOutcome,
    /// Number of status requests sent, failed ones included.
    pub status_checks: u32,
    pub job_id: Option<String>,
}

type PollObserver<'a> = Box<dyn FnMut(u32) + 'a>;

pub struct BatchDeleter<'a, A: StorageApi + ?Sized> {
    api: &'a A,
    config: PollConfig,
    cancel: CancelToken,
    on_poll: Option<PollObserver<'a>>,
}

impl<'a, A: StorageApi + ?Sized> BatchDeleter<'a, A> {
    pub fn new(api: &'a A, config: PollConfig) -> Self {
        Self {
            api,
            config,
            cancel: CancelToken::new(),
            on_poll: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called after every status check that left the job running.
    pub fn on_poll(mut self, observer: impl FnMut(u32) + 'a) -> Self {
        self.on_poll = Some(Box::new(observer));
        self
    }

    /// Delete `paths` and wait for the outcome. Only a failed submission
    /// is returned as an error; poll errors are logged and retried.
    pub fn delete(&mut self, paths: &[String]) -> Result<DeletionReport, ApiError> {
        if paths.is_empty() {
            return Ok(DeletionReport {
                outcome: PollOutcome::Done,
                status_checks: 0,
                job_id: None,
            });
        }
        if self.cancel.is_cancelled() {
            return Ok(DeletionReport {
                outcome: PollOutcome::Cancelled { job_id: None },
                status_checks: 0,
                job_id: None,
            });
        }

        info!(count = paths.len(), "submitting batch delete");
        match self.api.delete_batch(paths)? {
            DeleteLaunch::Complete => {
                debug!("batch delete completed synchronously");
                Ok(DeletionReport {
                    outcome: PollOutcome::Done,
                    status_checks: 0,
                    job_id: None,
                })
            }
            DeleteLaunch::AsyncJob(job_id) => {
                debug!(%job_id, "batch delete running asynchronously");
                let (outcome, status_checks) = self.poll(&job_id);
                Ok(DeletionReport {
                    outcome,
                    status_checks,
                    job_id: Some(job_id),
                })
            }
        }
    }

    fn poll(&mut self, job_id: &str) -> (PollOutcome, u32) {
        let started = Instant::now();
        let mut checks = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                debug!(%job_id, "stopped waiting for batch delete");
                return (
                    PollOutcome::Cancelled {
                        job_id: Some(job_id.to_string()),
                    },
                    checks,
                );
            }

            checks += 1;
            match self.api.delete_batch_check(job_id) {
                Ok(JobStatus::Complete) => return (PollOutcome::Done, checks),
                Ok(JobStatus::Failed(reason)) => {
                    debug!(%job_id, %reason, "batch delete failed");
                    return (PollOutcome::Failed(reason), checks);
                }
                Ok(JobStatus::InProgress) => debug!(%job_id, checks, "batch delete in progress"),
                Err(e) => warn!(%job_id, error = %e, "batch check request failed"),
            }

            if let Some(observer) = self.on_poll.as_mut() {
                observer(checks);
            }

            if self.config.deadline.is_some_and(|d| started.elapsed() >= d) {
                debug!(%job_id, checks, "gave up waiting for batch delete");
                return (
                    PollOutcome::TimedOut {
                        job_id: job_id.to_string(),
                    },
                    checks,
                );
            }

            self.wait();
        }
    }

    fn wait(&self) {
        let mut remaining = self.config.interval;
        while !remaining.is_zero() && !self.cancel.is_cancelled() {
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining -= slice;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ListFolderPage, ThumbnailRequest, ThumbnailResult};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Replays scripted status responses; the last one repeats forever.
    struct ScriptedJob {
        launch: DeleteLaunch,
        statuses: RefCell<VecDeque<Result<JobStatus, ApiError>>>,
        checks: Cell<u32>,
        submitted: RefCell<Vec<Vec<String>>>,
    }

    impl ScriptedJob {
        fn new(launch: DeleteLaunch, statuses: Vec<Result<JobStatus, ApiError>>) -> Self {
            Self {
                launch,
                statuses: RefCell::new(statuses.into()),
                checks: Cell::new(0),
                submitted: RefCell::new(Vec::new()),
            }
        }

        fn async_job(statuses: Vec<Result<JobStatus, ApiError>>) -> Self {
            Self::new(DeleteLaunch::AsyncJob("dbjid:test".into()), statuses)
        }
    }

    fn transport_error() -> ApiError {
        ApiError::Status {
            endpoint: "files/delete_batch/check".into(),
            status: 503,
            summary: "unavailable".into(),
        }
    }

    impl StorageApi for ScriptedJob {
        fn list_folder(&self, _: &str, _: u32, _: bool) -> Result<ListFolderPage, ApiError> {
            unimplemented!()
        }

        fn list_folder_continue(&self, _: &str) -> Result<ListFolderPage, ApiError> {
            unimplemented!()
        }

        fn get_thumbnail_batch(&self, _: &[ThumbnailRequest]) -> Result<Vec<ThumbnailResult>, ApiError> {
            unimplemented!()
        }

        fn delete_batch(&self, paths: &[String]) -> Result<DeleteLaunch, ApiError> {
            self.submitted.borrow_mut().push(paths.to_vec());
            Ok(self.launch.clone())
        }

        fn delete_batch_check(&self, job_id: &str) -> Result<JobStatus, ApiError> {
            assert_eq!(job_id, "dbjid:test");
            self.checks.set(self.checks.get() + 1);
            let mut statuses = self.statuses.borrow_mut();
            if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                match statuses.front().unwrap() {
                    Ok(s) => Ok(s.clone()),
                    Err(_) => Err(transport_error()),
                }
            }
        }
    }

    fn fast() -> PollConfig {
        PollConfig {
            interval: Duration::ZERO,
            deadline: None,
        }
    }

    fn paths() -> Vec<String> {
        vec!["/b_old.txt".into(), "/c_old.txt".into()]
    }

    #[test]
    fn polls_until_complete() {
        let api = ScriptedJob::async_job(vec![
            Ok(JobStatus::InProgress),
            Ok(JobStatus::InProgress),
            Ok(JobStatus::Complete),
        ]);
        let polls = Cell::new(0);
        let report = BatchDeleter::new(&api, fast())
            .on_poll(|_| polls.set(polls.get() + 1))
            .delete(&paths())
            .unwrap();
        assert_eq!(report.outcome, PollOutcome::Done);
        // two in-progress answers, then the completing check
        assert_eq!(polls.get(), 2);
        assert_eq!(report.status_checks, 3);
        assert_eq!(api.checks.get(), 3);
        assert_eq!(report.job_id.as_deref(), Some("dbjid:test"));
    }

    #[test]
    fn failure_stops_after_first_check() {
        let api = ScriptedJob::async_job(vec![Ok(JobStatus::Failed("too_many_write_operations".into()))]);
        let report = BatchDeleter::new(&api, fast()).delete(&paths()).unwrap();
        assert_eq!(report.outcome, PollOutcome::Failed("too_many_write_operations".into()));
        assert_eq!(report.status_checks, 1);
        assert_eq!(api.checks.get(), 1);
    }

    #[test]
    fn synchronous_completion_skips_polling() {
        let api = ScriptedJob::new(DeleteLaunch::Complete, vec![]);
        let report = BatchDeleter::new(&api, fast()).delete(&paths()).unwrap();
        assert!(report.outcome.is_success());
        assert_eq!(report.status_checks, 0);
        assert_eq!(api.checks.get(), 0);
        assert_eq!(api.submitted.borrow().as_slice(), &[paths()]);
    }

    #[test]
    fn check_errors_are_retried() {
        let api = ScriptedJob::async_job(vec![
            Err(transport_error()),
            Err(transport_error()),
            Ok(JobStatus::Complete),
        ]);
        let report = BatchDeleter::new(&api, fast()).delete(&paths()).unwrap();
        assert_eq!(report.outcome, PollOutcome::Done);
        assert_eq!(report.status_checks, 3);
    }

    #[test]
    fn deadline_stops_waiting() {
        let api = ScriptedJob::async_job(vec![Ok(JobStatus::InProgress)]);
        let config = PollConfig {
            interval: Duration::from_millis(1),
            deadline: Some(Duration::ZERO),
        };
        let report = BatchDeleter::new(&api, config).delete(&paths()).unwrap();
        assert_eq!(
            report.outcome,
            PollOutcome::TimedOut {
                job_id: "dbjid:test".into()
            }
        );
        assert_eq!(report.status_checks, 1);
    }

    #[test]
    fn cancel_from_observer_stops_polling() {
        let api = ScriptedJob::async_job(vec![Ok(JobStatus::InProgress)]);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let report = BatchDeleter::new(&api, fast())
            .with_cancel(cancel)
            .on_poll(move |n| {
                if n == 4 {
                    trigger.cancel();
                }
            })
            .delete(&paths())
            .unwrap();
        assert_eq!(
            report.outcome,
            PollOutcome::Cancelled {
                job_id: Some("dbjid:test".into())
            }
        );
        assert_eq!(report.status_checks, 4);
    }

    #[test]
    fn cancelled_before_submit_sends_nothing() {
        let api = ScriptedJob::new(DeleteLaunch::Complete, vec![]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = BatchDeleter::new(&api, fast()).with_cancel(cancel).delete(&paths()).unwrap();
        assert_eq!(report.outcome, PollOutcome::Cancelled { job_id: None });
        assert!(api.submitted.borrow().is_empty());
    }

    #[test]
    fn empty_target_list_is_a_no_op() {
        let api = ScriptedJob::new(DeleteLaunch::Complete, vec![]);
        let report = BatchDeleter::new(&api, fast()).delete(&[]).unwrap();
        assert!(report.outcome.is_success());
        assert!(api.submitted.borrow().is_empty());
    }

    #[test]
    fn submission_error_is_returned() {
        struct Rejecting;
        impl StorageApi for Rejecting {
            fn list_folder(&self, _: &str, _: u32, _: bool) -> Result<ListFolderPage, ApiError> {
                unimplemented!()
            }
            fn list_folder_continue(&self, _: &str) -> Result<ListFolderPage, ApiError> {
                unimplemented!()
            }
            fn get_thumbnail_batch(&self, _: &[ThumbnailRequest]) -> Result<Vec<ThumbnailResult>, ApiError> {
                unimplemented!()
            }
            fn delete_batch(&self, _: &[String]) -> Result<DeleteLaunch, ApiError> {
                Err(ApiError::InvalidToken)
            }
            fn delete_batch_check(&self, _: &str) -> Result<JobStatus, ApiError> {
                unimplemented!()
            }
        }
        let err = BatchDeleter::new(&Rejecting, fast()).delete(&paths()).unwrap_err();
        assert!(err.is_unauthorized());
    }
}
