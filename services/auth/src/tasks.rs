//! Bounded background queue for login side effects
//!
//! Login log writes and last-login updates run on one worker task behind a
//! bounded channel. Submission never waits: when the queue is full the job is
//! rejected and counted, so a slow sink cannot hold up a login.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    models::LoginLogEntry,
    repositories::{LoginLogSink, UserRepository},
};

#[derive(Debug)]
enum Job {
    RecordLogin(LoginLogEntry),
    TouchLastLogin {
        user_id: i64,
        ip: String,
        at: DateTime<Utc>,
    },
    Flush(oneshot::Sender<()>),
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::RecordLogin(_) => "record_login",
            Job::TouchLastLogin { .. } => "touch_last_login",
            Job::Flush(_) => "flush",
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<Job>,
    rejected: Arc<AtomicU64>,
}

/// Handle on the worker task; await it after every queue clone is dropped
pub struct TaskWorker {
    handle: JoinHandle<()>,
}

impl TaskWorker {
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("Background task worker panicked: {}", e);
        }
    }
}

impl TaskQueue {
    /// Spawn the worker on the current tokio runtime
    pub fn start(
        capacity: usize,
        sink: Arc<dyn LoginLogSink>,
        users: Arc<dyn UserRepository>,
    ) -> (Self, TaskWorker) {
        let (sender, receiver) = mpsc::channel(capacity);
        let handle = tokio::spawn(run_worker(receiver, sink, users));
        info!("Background task queue started (capacity {})", capacity);

        (
            Self {
                sender,
                rejected: Arc::new(AtomicU64::new(0)),
            },
            TaskWorker { handle },
        )
    }

    fn submit(&self, job: Job) -> bool {
        let name = job.name();
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Background queue full, rejected {} ({} total)", name, total);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Background queue closed, dropped {}", name);
                false
            }
        }
    }

    pub fn record_login(&self, entry: LoginLogEntry) -> bool {
        self.submit(Job::RecordLogin(entry))
    }

    pub fn touch_last_login(&self, user_id: i64, ip: &str) -> bool {
        self.submit(Job::TouchLastLogin {
            user_id,
            ip: ip.to_string(),
            at: Utc::now(),
        })
    }

    /// Jobs rejected because the queue was full
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Wait until every job submitted before this call has been handled
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Job::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<Job>,
    sink: Arc<dyn LoginLogSink>,
    users: Arc<dyn UserRepository>,
) {
    while let Some(job) = receiver.recv().await {
        match job {
            Job::RecordLogin(entry) => {
                if let Err(e) = sink.record(&entry).await {
                    error!("Failed to record login log for {}: {:#}", entry.user_name, e);
                }
            }
            Job::TouchLastLogin { user_id, ip, at } => {
                if let Err(e) = users.touch_last_login(user_id, &ip, at).await {
                    error!("Failed to update last login of user {}: {:#}", user_id, e);
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Background task queue drained");
}
