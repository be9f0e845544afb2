//! # Fan-out Aggregator
//!
//! Applies one remote fetch per resource (repository, image, channel...)
//! concurrently and folds the results into a single aggregate.
//!
//! ## Workflow:
//! 1.  **Spawn**: one tokio task per resource, admitted through a `Semaphore`
//!     so at most `max_concurrency` remote calls are in flight for this pass.
//! 2.  **Fetch with retry**: every task wraps its own call in
//!     [`retry`](crate::core::retry::retry). A resource that keeps failing
//!     only affects its own contribution.
//! 3.  **Merge**: a successful contribution is folded into the shared
//!     accumulator under a `Mutex` held for the merge only, never across a
//!     remote call. Merges must be order-independent (sums, counts, map
//!     inserts keyed by resource).
//! 4.  **Join**: the pass waits for every task (a barrier, not a deadline)
//!     before the aggregate is handed back. Nothing partial escapes.
//!
//! Resource enumeration itself is paginated; [`collect_pages`] drains a
//! cursor into one list before any detail fetch starts.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::retry::{retry, RetryError, RetryPolicy};

/// Upper bound on pages followed by [`collect_pages`]; guards against a
/// server that keeps handing out a "next" cursor.
pub const MAX_PAGES: usize = 1_000;

/// Anything a fan-out can be run over. The name is used for logs and for
/// failure reports.
pub trait ResourceName {
    /// Stable, human-readable identifier of the resource.
    fn resource_name(&self) -> &str;
}

impl ResourceName for String {
    fn resource_name(&self) -> &str {
        self
    }
}

impl ResourceName for &'static str {
    fn resource_name(&self) -> &str {
        self
    }
}

/// A resource whose contribution was dropped from the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    /// [`ResourceName::resource_name`] of the failed resource.
    pub resource: String,
    /// Rendered error of the last attempt.
    pub reason: String,
}

/// Outcome of one fan-out pass.
#[derive(Debug)]
pub struct FanOutReport<A> {
    /// Merge of every successful contribution.
    pub aggregate: A,
    /// Number of resources that contributed.
    pub succeeded: usize,
    /// Resources that did not contribute, in completion order.
    pub failures: Vec<ResourceFailure>,
    /// `true` if the cancellation token fired during the pass. Callers should
    /// not publish a cancelled aggregate.
    pub cancelled: bool,
}

impl<A> FanOutReport<A> {
    /// Total number of resources the pass was run over.
    pub fn total(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    /// `true` when resources were attempted and none of them contributed.
    /// Such an aggregate is empty rather than current and must not replace a
    /// published snapshot.
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0 && !self.failures.is_empty()
    }
}

/// # Fan-out
///
/// Bounded-concurrency executor shared by every per-resource refresh job of a
/// provider.
#[derive(Debug, Clone)]
pub struct FanOut {
    max_concurrency: usize,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl FanOut {
    /// `max_concurrency` of `0` is treated as `1`.
    pub fn new(max_concurrency: usize, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            policy,
            cancel,
        }
    }

    /// The retry policy applied around every per-resource call.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The token retries observe.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// # Run
    ///
    /// Fetches every resource in `resources` through `fetch` and folds the
    /// successes with `merge`.
    ///
    /// `job` prefixes the log lines (e.g. `"commit-activity"`).
    pub async fn run<R, C, E, F, Fut, A, M>(
        &self,
        job: &str,
        resources: Vec<R>,
        fetch: F,
        merge: M,
    ) -> FanOutReport<A>
    where
        R: ResourceName + Send + Sync + 'static,
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, E>> + Send + 'static,
        C: Send + 'static,
        E: Display + Send + 'static,
        A: Default + Send + 'static,
        M: Fn(&mut A, C) + Send + Sync + 'static,
    {
        let fetch = Arc::new(fetch);
        let merge = Arc::new(merge);
        let accumulator = Arc::new(Mutex::new(A::default()));
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        log::info!("[{}] fanning out over {} resources (max {} in flight).", job, resources.len(), self.max_concurrency);

        for resource in resources {
            let resource = Arc::new(resource);
            let fetch = Arc::clone(&fetch);
            let merge = Arc::clone(&merge);
            let accumulator = Arc::clone(&accumulator);
            let permits = Arc::clone(&permits);
            let cancel = self.cancel.clone();
            let policy = self.policy;
            let label = format!("{}:{}", job, resource.resource_name());

            tasks.spawn(async move {
                let name = resource.resource_name().to_string();

                let Ok(_permit) = permits.acquire_owned().await else {
                    return Err(ResourceFailure {
                        resource: name,
                        reason: "fan-out permits closed".to_string(),
                    });
                };

                let attempt = retry(&label, policy, &cancel, || fetch(Arc::clone(&resource)));
                let contribution = match AssertUnwindSafe(attempt).catch_unwind().await {
                    Ok(Ok(contribution)) => contribution,
                    Ok(Err(RetryError::Cancelled)) => {
                        return Err(ResourceFailure {
                            resource: name,
                            reason: "cancelled".to_string(),
                        });
                    }
                    Ok(Err(e)) => {
                        return Err(ResourceFailure {
                            resource: name,
                            reason: e.to_string(),
                        });
                    }
                    Err(_) => {
                        return Err(ResourceFailure {
                            resource: name,
                            reason: "fetch panicked".to_string(),
                        });
                    }
                };

                let mut acc = accumulator.lock().unwrap_or_else(PoisonError::into_inner);
                merge(&mut *acc, contribution);
                Ok(())
            });
        }

        let mut succeeded = 0;
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(failure)) => {
                    log::error!("[{}] {} excluded: {}", job, failure.resource, failure.reason);
                    failures.push(failure);
                }
                Err(e) => {
                    // Only reachable if the merge itself panicked or the runtime is going away.
                    log::error!("[{}] resource task aborted: {}", job, e);
                    failures.push(ResourceFailure {
                        resource: "<unknown>".to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let aggregate = std::mem::take(&mut *accumulator.lock().unwrap_or_else(PoisonError::into_inner));
        let cancelled = self.cancel.is_cancelled();

        log::info!(
            "[{}] fan-out complete: {} ok, {} failed{}.",
            job,
            succeeded,
            failures.len(),
            if cancelled { ", cancelled" } else { "" }
        );

        FanOutReport {
            aggregate,
            succeeded,
            failures,
            cancelled,
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T, C> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor of the following page; `None` on the last page.
    pub next: Option<C>,
}

impl<T, C> Page<T, C> {
    /// A page with no successor.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// # Collect Pages
///
/// Follows the next-page cursor from the first page (`fetch_page(None)`)
/// until a page reports none, accumulating every item in order.
///
/// Any page failure fails the whole enumeration: a truncated resource list
/// would silently drop resources from every derived aggregate.
pub async fn collect_pages<T, C, E, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, E>
where
    F: FnMut(Option<C>) -> Fut,
    Fut: Future<Output = Result<Page<T, C>, E>>,
{
    let mut items = Vec::new();
    let mut cursor = None;

    for _ in 0..MAX_PAGES {
        let page = fetch_page(cursor.take()).await?;
        items.extend(page.items);
        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(items),
        }
    }

    log::warn!("Pagination stopped after {} pages; listing may be incomplete.", MAX_PAGES);
    Ok(items)
}
