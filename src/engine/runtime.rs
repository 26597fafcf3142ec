//! Worker-pool runtime for document-ingestion workers.
//!
//! [`ResolutionEngine`] is synchronous. Ingestion pipelines resolve many names
//! in parallel, so this module runs the engine on bounded, thread-based worker
//! pools. Lookups and writes get separate pools: a burst of provisioning never
//! queues ahead of pure reads.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::contact::ContactId;
use crate::engine::ResolutionEngine;
use crate::error::{ExecutionError, ResolverError, ResolverResult, ValidationError};
use crate::resolution::ResolutionResult;
use crate::scope::{Scope, UserId};
use crate::storage::UpsertOutcome;

/// Execution path selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPath {
    /// Read-only resolution.
    Lookup,
    /// Provisioning and alias learning.
    Provision,
}

impl ExecutionPath {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Provision => "provision",
        }
    }
}

/// A unit of work for the runtime.
#[derive(Debug, Clone)]
pub enum ResolutionRequest {
    /// `resolve_customer`.
    Resolve {
        /// Lookup scope.
        scope: Scope,
        /// Raw name as extracted.
        raw_name: String,
    },
    /// `get_or_create_customer_contact`.
    GetOrCreate {
        /// Lookup/creation scope.
        scope: Scope,
        /// Raw name as extracted.
        raw_name: String,
        /// Attribution.
        created_by: Option<UserId>,
    },
    /// `learn_customer_alias`.
    Learn {
        /// Alias scope.
        scope: Scope,
        /// Raw name to learn.
        raw_name: String,
        /// Target contact.
        customer_id: ContactId,
        /// Confidence in `[0, 1]`.
        confidence: f64,
        /// Attribution.
        created_by: Option<UserId>,
    },
}

impl ResolutionRequest {
    /// Pool this request runs on.
    #[must_use]
    pub const fn path(&self) -> ExecutionPath {
        match self {
            Self::Resolve { .. } => ExecutionPath::Lookup,
            Self::GetOrCreate { .. } | Self::Learn { .. } => ExecutionPath::Provision,
        }
    }

    fn run(self, engine: &ResolutionEngine) -> ResolverResult<ResolutionResponse> {
        match self {
            Self::Resolve { scope, raw_name } => engine
                .resolve_customer(&scope, &raw_name)
                .map(ResolutionResponse::Resolved),
            Self::GetOrCreate {
                scope,
                raw_name,
                created_by,
            } => engine
                .get_or_create_customer_contact(&scope, &raw_name, created_by.as_ref())
                .map(ResolutionResponse::Resolved),
            Self::Learn {
                scope,
                raw_name,
                customer_id,
                confidence,
                created_by,
            } => engine
                .learn_customer_alias(
                    &scope,
                    &raw_name,
                    customer_id,
                    confidence,
                    created_by.as_ref(),
                )
                .map(ResolutionResponse::Learned),
        }
    }
}

/// Result of a [`ResolutionRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionResponse {
    /// From `Resolve` or `GetOrCreate`.
    Resolved(ResolutionResult),
    /// From `Learn`.
    Learned(UpsertOutcome),
}

impl ResolutionResponse {
    /// The resolution, if this response carries one.
    #[must_use]
    pub fn into_resolution(self) -> Option<ResolutionResult> {
        match self {
            Self::Resolved(result) => Some(result),
            Self::Learned(_) => None,
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of lookup workers.
    pub lookup_workers: usize,
    /// Number of provisioning workers.
    pub provision_workers: usize,
    /// Maximum queued jobs per pool.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lookup_workers: 4,
            provision_workers: 2,
            queue_capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    /// Validate pool sizes.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidConfig` if any field is zero.
    pub fn validate(self) -> Result<Self, ValidationError> {
        for (name, value) in [
            ("lookup_workers", self.lookup_workers),
            ("provision_workers", self.provision_workers),
            ("queue_capacity", self.queue_capacity),
        ] {
            if value == 0 {
                return Err(ValidationError::InvalidConfig {
                    reason: format!("{name} must be at least 1"),
                });
            }
        }
        Ok(self)
    }
}

enum Job {
    Run {
        request: ResolutionRequest,
        reply: Sender<ResolverResult<ResolutionResponse>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    path: ExecutionPath,
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(
        path: ExecutionPath,
        workers: usize,
        queue_capacity: usize,
        engine: &Arc<ResolutionEngine>,
    ) -> ResolverResult<Self> {
        let (tx, rx) = bounded::<Job>(queue_capacity);
        let mut pool = Self {
            path,
            tx: Some(tx),
            workers: Vec::with_capacity(workers),
            queue_capacity,
        };

        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let engine = Arc::clone(engine);
            let handle = thread::Builder::new()
                .name(format!("resolver-{}-{idx}", path.as_str()))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        match job {
                            Job::Run { request, reply } => {
                                let _ = reply.send(request.run(&engine));
                            }

                            #[cfg(test)]
                            Job::Sleep { duration, reply } => {
                                thread::sleep(duration);
                                let _ = reply.send(());
                            }
                        }
                    }
                })
                .map_err(|e| ResolverError::internal(format!("failed to spawn worker: {e}")))?;
            pool.workers.push(handle);
        }

        Ok(pool)
    }

    fn try_submit(&self, job: Job) -> Result<(), ExecutionError> {
        let path = self.path.as_str().to_string();
        let Some(tx) = &self.tx else {
            return Err(ExecutionError::Disconnected { path });
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(path = %path, capacity = self.queue_capacity, "resolver queue full");
                Err(ExecutionError::QueueFull {
                    path,
                    capacity: self.queue_capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected { path }),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain queued jobs, then exit.
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Handle to a submitted request.
///
/// Dropping the handle abandons the result; the request itself still runs to
/// completion, and the store keeps the write path all-or-nothing.
pub struct ResolutionHandle {
    path: ExecutionPath,
    rx: Receiver<ResolverResult<ResolutionResponse>>,
}

impl ResolutionHandle {
    /// Pool the request was routed to.
    #[must_use]
    pub const fn path(&self) -> ExecutionPath {
        self.path
    }

    /// Wait for the result.
    ///
    /// # Errors
    /// The request's own error, or `ExecutionError::Disconnected` if the
    /// worker went away without replying.
    pub fn join(self) -> ResolverResult<ResolutionResponse> {
        self.rx.recv().map_err(|_| ExecutionError::Disconnected {
            path: self.path.as_str().to_string(),
        })?
    }

    /// Wait for the result, up to `timeout`.
    ///
    /// # Errors
    /// As [`join`](Self::join), plus `ExecutionError::Timeout` once the
    /// deadline passes.
    pub fn join_timeout(self, timeout: Duration) -> ResolverResult<ResolutionResponse> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => ExecutionError::Disconnected {
                path: self.path.as_str().to_string(),
            },
        })?
    }
}

/// Runs a [`ResolutionEngine`] on separate lookup and provisioning pools.
///
/// Dropping the runtime closes both queues, lets workers finish what is
/// already queued, and joins every thread.
pub struct ResolutionRuntime {
    engine: Arc<ResolutionEngine>,
    lookup: WorkerPool,
    provision: WorkerPool,
}

impl ResolutionRuntime {
    /// Start the worker pools.
    ///
    /// # Errors
    /// - `Validation(InvalidConfig)` for a zero-sized pool or queue
    /// - `Internal` if a worker thread cannot be spawned
    pub fn new(engine: ResolutionEngine, config: RuntimeConfig) -> ResolverResult<Self> {
        let config = config.validate()?;
        let engine = Arc::new(engine);
        let lookup = WorkerPool::start(
            ExecutionPath::Lookup,
            config.lookup_workers,
            config.queue_capacity,
            &engine,
        )?;
        let provision = WorkerPool::start(
            ExecutionPath::Provision,
            config.provision_workers,
            config.queue_capacity,
            &engine,
        )?;
        Ok(Self {
            engine,
            lookup,
            provision,
        })
    }

    fn pool(&self, path: ExecutionPath) -> &WorkerPool {
        match path {
            ExecutionPath::Lookup => &self.lookup,
            ExecutionPath::Provision => &self.provision,
        }
    }

    /// Queue a request without blocking.
    ///
    /// # Errors
    /// `ExecutionError::QueueFull` when the target pool is saturated; the
    /// caller decides whether to back off and retry.
    pub fn submit(&self, request: ResolutionRequest) -> ResolverResult<ResolutionHandle> {
        let path = request.path();
        let (tx, rx) = bounded(1);
        self.pool(path).try_submit(Job::Run { request, reply: tx })?;
        Ok(ResolutionHandle { path, rx })
    }

    /// Submit and wait.
    ///
    /// # Errors
    /// Submission errors and the request's own error.
    pub fn execute(&self, request: ResolutionRequest) -> ResolverResult<ResolutionResponse> {
        self.submit(request)?.join()
    }

    /// Shared engine.
    #[must_use]
    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    #[cfg(test)]
    fn submit_sleep(
        &self,
        path: ExecutionPath,
        duration: Duration,
    ) -> ResolverResult<Receiver<()>> {
        let (tx, rx) = bounded(1);
        self.pool(path).try_submit(Job::Sleep { duration, reply: tx })?;
        Ok(rx)
    }
}
