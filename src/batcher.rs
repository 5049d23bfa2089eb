use crate::concurrent::{map_bounded, NoProgress};
use crate::error::{Error, Result};
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;

/// Splits `items` into consecutive groups of `batch_size` (the last may be
/// shorter), keeping the input order.
pub fn partition<K: Clone>(items: &[K], batch_size: usize) -> Vec<Vec<K>> {
    items
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Drops repeated items, first occurrence wins.
pub fn dedupe_preserve<K: Eq + Hash + Clone>(items: impl IntoIterator<Item = K>) -> Vec<K> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Merges keyed answers of separate calls. A key answered twice is reported
/// as [`Error::DuplicateKey`].
pub fn merge_answers<R, V>(answers: impl IntoIterator<Item = HashMap<R, V>>) -> Result<HashMap<R, V>>
where
    R: Eq + Hash + Display,
{
    let mut merged = HashMap::new();
    for answer in answers {
        for (key, value) in answer {
            match merged.entry(key) {
                Entry::Occupied(e) => return Err(Error::DuplicateKey(e.key().to_string())),
                Entry::Vacant(e) => {
                    e.insert(value);
                }
            }
        }
    }
    Ok(merged)
}

/// Issues one call per batch, at most `concurrency` at once, and merges the
/// keyed answers. Identities must be unique before batching.
pub async fn run_batched<K, R, V, F, Fut>(
    items: &[K],
    batch_size: usize,
    concurrency: usize,
    op: F,
) -> Result<HashMap<R, V>>
where
    K: Clone,
    R: Eq + Hash + Display,
    F: Fn(Vec<K>) -> Fut,
    Fut: Future<Output = Result<HashMap<R, V>>>,
{
    let batches = partition(items, batch_size);
    debug!(
        "dispatching {} items in {} batches of <= {}, {} at a time",
        items.len(),
        batches.len(),
        batch_size.max(1),
        concurrency.max(1)
    );

    let answers = map_bounded(0..batches.len(), concurrency, &mut NoProgress, |i| {
        op(batches[i].clone())
    })
    .await?;
    merge_answers(answers.into_values())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_partition_sizes() {
        let items: Vec<u32> = (0..10).collect();
        let batches = partition(&items, 3);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert_eq!(batches[3], vec![9]);
        assert_eq!(partition(&items, 0).len(), 10);
        assert!(partition::<u32>(&[], 3).is_empty());
    }

    #[test]
    fn test_dedupe_preserve() {
        assert_eq!(
            dedupe_preserve(["e2e4", "d2d4", "e2e4", "g1f3", "d2d4"]),
            vec!["e2e4", "d2d4", "g1f3"]
        );
    }

    #[tokio::test]
    async fn test_merge_all_keys() {
        let calls = Cell::new(0);
        let items: Vec<u32> = (0..10).collect();
        let merged = run_batched(&items, 3, 8, |batch| {
            calls.set(calls.get() + 1);
            async move { Ok(batch.into_iter().map(|k| (k, k * k)).collect::<HashMap<_, _>>()) }
        })
        .await
        .unwrap();

        assert_eq!(calls.get(), 4);
        assert_eq!(merged.len(), 10);
        assert_eq!(merged[&9], 81);
    }

    #[tokio::test]
    async fn test_overlap_is_an_error() {
        let items: Vec<u32> = (0..6).collect();
        let res = run_batched(&items, 3, 8, |batch| async move {
            Ok(batch.into_iter().map(|k| (k % 4, k)).collect::<HashMap<_, _>>())
        })
        .await;
        assert!(matches!(res, Err(Error::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn test_batch_failure_propagates() {
        let items: Vec<u32> = (0..6).collect();
        let res = run_batched(&items, 2, 8, |batch| async move {
            if batch.contains(&4) {
                Err(Error::Fatal("worker crashed".into()))
            } else {
                Ok(batch.into_iter().map(|k| (k, ())).collect::<HashMap<_, _>>())
            }
        })
        .await;
        assert!(matches!(res, Err(Error::Fatal(_))));
    }

    #[tokio::test]
    async fn test_concurrency_caps_calls_in_flight() {
        let active = Cell::new(0usize);
        let peak = Cell::new(0usize);
        let items: Vec<u32> = (0..20).collect();
        let merged = run_batched(&items, 2, 3, |batch| {
            let active = &active;
            let peak = &peak;
            async move {
                active.set(active.get() + 1);
                peak.set(peak.get().max(active.get()));
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                active.set(active.get() - 1);
                Ok(batch.into_iter().map(|k| (k, k)).collect::<HashMap<_, _>>())
            }
        })
        .await
        .unwrap();
        assert_eq!(merged.len(), 20);
        assert!(peak.get() <= 3, "peak {}", peak.get());
    }
}
