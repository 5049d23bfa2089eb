//! Bounded fan-out over a key set.
//!
//! Every unit is polled from the calling task, so there is a single writer for
//! the result map even though many units are in flight. A semaphore permit is
//! held by each running unit and released when the unit's future is dropped,
//! whether it finished, failed or was cancelled.

use crate::batcher::dedupe_preserve;
use futures_util::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use tokio::sync::Semaphore;

/// Notified once per completed unit.
pub trait ProgressObserver {
    fn on_complete(&mut self, done: usize, total: usize) -> Result<(), String>;
}

/// Reports progress through the log.
pub struct LogProgress {
    desc: String,
}

impl LogProgress {
    pub fn new(desc: impl Into<String>) -> Self {
        Self { desc: desc.into() }
    }
}

impl ProgressObserver for LogProgress {
    fn on_complete(&mut self, done: usize, total: usize) -> Result<(), String> {
        if done == total {
            info!("{}: {}/{} done", self.desc, done, total);
        } else {
            debug!("{}: {}/{}", self.desc, done, total);
        }
        Ok(())
    }
}

pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_complete(&mut self, _done: usize, _total: usize) -> Result<(), String> {
        Ok(())
    }
}

/// Result of one unit in tolerant mode.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Outcome<V> {
    pub value: Option<V>,
    pub error: Option<String>,
}

impl<V> Outcome<V> {
    pub fn ok(value: V) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    pub fn failed(error: impl Display) -> Self {
        Self {
            value: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.value.is_some() && self.error.is_none()
    }
}

/// Not run yet: neither a value nor an error.
impl<V> Default for Outcome<V> {
    fn default() -> Self {
        Self {
            value: None,
            error: None,
        }
    }
}

/// Applies `op` to every distinct item with at most `concurrency` units in
/// flight and returns the results keyed by item. Repeated items run once.
///
/// Fail-fast: the first error is returned and all other units, running or
/// still waiting for a permit, are dropped. No partial map is produced.
pub async fn map_bounded<K, V, E, F, Fut>(
    items: impl IntoIterator<Item = K>,
    concurrency: usize,
    observer: &mut dyn ProgressObserver,
    op: F,
) -> Result<HashMap<K, V>, E>
where
    K: Eq + Hash + Clone,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    let sem = Semaphore::new(concurrency.max(1));
    let sem = &sem;
    let op = &op;

    let mut pending: FuturesUnordered<_> = dedupe_preserve(items)
        .into_iter()
        .map(|key| async move {
            // the semaphore is never closed, so acquire cannot fail
            let _permit = sem.acquire().await.ok();
            let res = op(key.clone()).await;
            (key, res)
        })
        .collect();

    let total = pending.len();
    let mut out = HashMap::with_capacity(total);
    let mut done = 0;

    while let Some((key, res)) = pending.next().await {
        out.insert(key, res?);
        done += 1;
        if let Err(e) = observer.on_complete(done, total) {
            warn!("progress observer failed: {e}");
        }
    }

    Ok(out)
}

/// Like [`map_bounded`], but failures are captured per item. Always yields
/// exactly one outcome per distinct input item.
pub async fn map_tolerant<K, V, E, F, Fut>(
    items: impl IntoIterator<Item = K>,
    concurrency: usize,
    observer: &mut dyn ProgressObserver,
    op: F,
) -> HashMap<K, Outcome<V>>
where
    K: Eq + Hash + Clone,
    E: Display,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    let wrapped = move |key: K| {
        let fut = op(key);
        async move {
            Ok::<_, Infallible>(match fut.await {
                Ok(v) => Outcome::ok(v),
                Err(e) => Outcome::failed(e),
            })
        }
    };

    match map_bounded(items, concurrency, observer, wrapped).await {
        Ok(out) => out,
        Err(never) => match never {},
    }
}
