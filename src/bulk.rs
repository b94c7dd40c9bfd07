//! Bulk orchestration
//!
//! Splits a sample sequence into fixed-size chunks, dispatches every chunk
//! through a shared [`Limiter`], and puts the answers back together by chunk
//! index. Completion order is irrelevant: `result[i]` is always the prediction
//! for `samples[i]`.
//!
//! Two aggregation modes are offered:
//! - [`assemble`] (used by `bulk_predict`) is all-or-nothing: the first failed
//!   chunk, by index, fails the run and successful chunks are discarded.
//! - the raw [`ChunkOutcome`] list lets a caller salvage successful chunks.
//!
//! A failing chunk never cancels its siblings; every dispatched chunk runs to
//! completion before outcomes are returned.

use std::future::Future;
use std::ops::Range;

use futures::future::join_all;
use tracing::{debug, debug_span, info_span, warn, Instrument};

use crate::config::BulkDefaults;
use crate::error::{PredictError, Result};
use crate::limiter::Limiter;
use crate::schema::{coerce, FeatureSchema, Sample};

/// A contiguous run of the input, remembering where it started.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a, T> {
    pub index: usize,
    pub start: usize,
    pub items: &'a [T],
}

impl<T> Chunk<'_, T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.items.len()
    }
}

/// Partition `items` into consecutive chunks of at most `batch_size`.
pub fn chunk_samples<T>(items: &[T], batch_size: usize) -> Result<Vec<Chunk<'_, T>>> {
    if batch_size == 0 {
        return Err(PredictError::config("batch_size must be at least 1"));
    }
    Ok(items
        .chunks(batch_size)
        .enumerate()
        .map(|(index, items)| Chunk {
            index,
            start: index * batch_size,
            items,
        })
        .collect())
}

/// Settings for one bulk run.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    /// Coerce samples before dispatch; only honoured when a schema is set
    pub map_to_schema: bool,
    /// Schema used for coercion. Ignored unless `map_to_schema` is also
    /// true; [`BulkOptions::with_schema`] sets both.
    pub schema: Option<FeatureSchema>,
}

impl BulkOptions {
    pub fn new(batch_size: usize, concurrency: usize) -> Self {
        Self {
            batch_size,
            concurrency,
            map_to_schema: false,
            schema: None,
        }
    }

    /// Coerce every sample to `schema` before sending it.
    pub fn with_schema(mut self, schema: FeatureSchema) -> Self {
        self.schema = Some(schema);
        self.map_to_schema = true;
        self
    }

    fn active_schema(&self) -> Option<&FeatureSchema> {
        self.schema.as_ref().filter(|_| self.map_to_schema)
    }
}

impl Default for BulkOptions {
    fn default() -> Self {
        BulkDefaults::default().into()
    }
}

impl From<BulkDefaults> for BulkOptions {
    fn from(d: BulkDefaults) -> Self {
        Self::new(d.batch_size, d.concurrency)
    }
}

/// Result of one chunk's network call.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub index: usize,
    pub start: usize,
    pub len: usize,
    pub result: Result<Vec<f64>>,
}

impl ChunkOutcome {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Dispatch every chunk of `samples` through `dispatch` and return one
/// outcome per chunk, ordered by chunk index.
///
/// `dispatch` receives the (possibly coerced) records of one chunk and must
/// answer with one prediction per record, in the same order.
pub async fn run_chunks<F, Fut>(
    samples: &[Sample],
    opts: &BulkOptions,
    dispatch: F,
) -> Result<Vec<ChunkOutcome>>
where
    F: Fn(Vec<Sample>) -> Fut,
    Fut: Future<Output = Result<Vec<f64>>>,
{
    let chunks = chunk_samples(samples, opts.batch_size)?;
    let schema = opts.active_schema();
    if let Some(schema) = schema {
        schema.validate()?;
    }
    let limiter = Limiter::new(opts.concurrency);

    let span = info_span!(
        "bulk_predict",
        samples = samples.len(),
        chunks = chunks.len(),
        batch_size = opts.batch_size,
        concurrency = limiter.max_concurrent()
    );

    async {
        // join_all polls in index order, so tickets are requested in index order
        let tasks = chunks.iter().map(|chunk| {
            let (index, start, len) = (chunk.index, chunk.start, chunk.len());
            let items = chunk.items;
            let limiter = &limiter;
            let dispatch = &dispatch;
            async move {
                // records are built once the chunk is admitted
                let result = limiter
                    .submit(|| dispatch(prepare(items, schema)))
                    .await
                    .and_then(|predictions| check_alignment(index, len, predictions));
                match &result {
                    Ok(_) => debug!("chunk done"),
                    Err(e) => warn!(error = %e, "chunk failed"),
                }
                ChunkOutcome {
                    index,
                    start,
                    len,
                    result,
                }
            }
            .instrument(debug_span!("chunk", index, start, len))
        });

        let mut outcomes = join_all(tasks).await;
        outcomes.sort_by_key(|o| o.index);
        Ok(outcomes)
    }
    .instrument(span)
    .await
}

fn prepare(items: &[Sample], schema: Option<&FeatureSchema>) -> Vec<Sample> {
    match schema {
        Some(schema) => items.iter().map(|s| coerce(s, schema)).collect(),
        None => items.to_vec(),
    }
}

fn check_alignment(chunk: usize, expected: usize, predictions: Vec<f64>) -> Result<Vec<f64>> {
    if predictions.len() != expected {
        return Err(PredictError::Misaligned {
            chunk,
            expected,
            actual: predictions.len(),
        });
    }
    Ok(predictions)
}

/// Flatten chunk outcomes into one prediction list, failing on the first
/// failed chunk by index.
pub fn assemble(mut outcomes: Vec<ChunkOutcome>) -> Result<Vec<f64>> {
    outcomes.sort_by_key(|o| o.index);
    let total = outcomes.iter().map(|o| o.len).sum();
    let mut out = Vec::with_capacity(total);
    for outcome in outcomes {
        match outcome.result {
            Ok(predictions) => out.extend(predictions),
            Err(e) => {
                return Err(PredictError::BulkFailure {
                    chunk: outcome.index,
                    start: outcome.start,
                    source: Box::new(e),
                })
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::sleep;

    fn tagged(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let mut s = Sample::new();
                s.insert("i".to_string(), json!(i));
                s
            })
            .collect()
    }

    fn tag(s: &Sample) -> f64 {
        s["i"].as_f64().unwrap()
    }

    #[test]
    fn chunks_cover_input() {
        let items: Vec<u32> = (0..5).collect();
        let chunks = chunk_samples(&items, 2).unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(chunks[2].start, 4);
        assert_eq!(chunks[1].range(), 2..4);
        assert!(chunk_samples(&items, 0).is_err());
        assert!(chunk_samples::<u32>(&[], 3).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reassembles_by_index_not_completion() {
        // [1,2], [3,4], [5] regardless of which chunk lands first
        let samples = tagged(5);
        let opts = BulkOptions::new(2, 2);
        let outcomes = run_chunks(&samples, &opts, |records| async move {
            let first = tag(&records[0]) as u64;
            // earlier chunks finish later
            sleep(Duration::from_millis(100 - first * 10)).await;
            Ok::<Vec<f64>, PredictError>(records.iter().map(|r| tag(r) + 1.0).collect())
        })
        .await
        .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(assemble(outcomes).unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn positional_alignment_survives_chunking_and_limiting() {
        for (n, batch, conc) in [(1, 1, 1), (17, 4, 3), (100, 7, 5), (64, 64, 2), (9, 20, 8)] {
            let samples = tagged(n);
            let opts = BulkOptions::new(batch, conc);
            let preds = assemble(
                run_chunks(&samples, &opts, |records| async move {
                    let jitter = (tag(&records[0]) as u64 * 7919) % 13;
                    sleep(Duration::from_millis(jitter)).await;
                    Ok::<Vec<f64>, PredictError>(records.iter().map(tag).collect())
                })
                .await
                .unwrap(),
            )
            .unwrap();
            assert_eq!(preds.len(), n);
            for (i, p) in preds.iter().enumerate() {
                assert_eq!(*p, i as f64);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let samples = tagged(40);
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let opts = BulkOptions::new(3, 4);
        let outcomes = run_chunks(&samples, &opts, |records| {
            let running = running.clone();
            let max_seen = max_seen.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<Vec<f64>, PredictError>(vec![0.0; records.len()])
            }
        })
        .await
        .unwrap();
        assert_eq!(outcomes.len(), 14);
        assert!(max_seen.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failed_chunk_fails_the_run_but_siblings_finish() {
        let samples = tagged(6);
        let finished = Arc::new(AtomicUsize::new(0));
        let opts = BulkOptions::new(2, 3);
        let outcomes = run_chunks(&samples, &opts, |records| {
            let finished = finished.clone();
            async move {
                if tag(&records[0]) == 2.0 {
                    return Err(PredictError::Rejected {
                        status: 400,
                        body: "bad".to_string(),
                    });
                }
                sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<Vec<f64>, PredictError>(records.iter().map(tag).collect())
            }
        })
        .await
        .unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 2);
        // partial mode keeps the good chunks
        let good: Vec<_> = outcomes.iter().filter(|o| o.is_ok()).map(|o| o.range()).collect();
        assert_eq!(good, vec![0..2, 4..6]);

        match assemble(outcomes).unwrap_err() {
            PredictError::BulkFailure { chunk, start, source } => {
                assert_eq!(chunk, 1);
                assert_eq!(start, 2);
                assert_eq!(source.status(), Some(400));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_answer_is_misaligned() {
        let samples = tagged(3);
        let outcomes = run_chunks(&samples, &BulkOptions::new(3, 1), |_records| async move {
            Ok::<Vec<f64>, PredictError>(vec![1.0])
        })
        .await
        .unwrap();
        assert!(matches!(
            outcomes[0].result,
            Err(PredictError::Misaligned {
                chunk: 0,
                expected: 3,
                actual: 1
            })
        ));
    }

    #[tokio::test]
    async fn schema_is_applied_before_dispatch() {
        let samples = vec![json!({"age": "61", "sex": 1, "noise": true})
            .as_object()
            .cloned()
            .unwrap()];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let opts = BulkOptions::new(10, 1).with_schema(FeatureSchema::new(["age"], ["sex"]));
        run_chunks(&samples, &opts, |records| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().extend(records.clone());
                Ok::<Vec<f64>, PredictError>(vec![0.5; records.len()])
            }
        })
        .await
        .unwrap();
        let sent = seen.lock().unwrap().clone();
        assert_eq!(
            serde_json::Value::Object(sent[0].clone()),
            json!({"age": 61, "sex": "1"})
        );
    }

    #[tokio::test]
    async fn schema_ignored_without_flag() {
        let samples = tagged(2);
        let mut opts = BulkOptions::new(10, 1).with_schema(FeatureSchema::new(["x"], ["y"]));
        opts.map_to_schema = false;
        let outcomes = run_chunks(&samples, &opts, |records| async move {
            Ok::<Vec<f64>, PredictError>(records.iter().map(tag).collect())
        })
        .await
        .unwrap();
        assert_eq!(assemble(outcomes).unwrap(), vec![0.0, 1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn records_are_built_only_once_admitted() {
        let samples = vec![
            json!({"i": 0, "age": "30"}).as_object().cloned().unwrap(),
            json!({"i": 1, "age": "31"}).as_object().cloned().unwrap(),
            json!({"i": 2, "age": "32"}).as_object().cloned().unwrap(),
        ];
        let origin = tokio::time::Instant::now();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let opts = BulkOptions::new(1, 1).with_schema(FeatureSchema::new(["age"], ["i"]));
        run_chunks(&samples, &opts, |records| {
            starts
                .lock()
                .unwrap()
                .push((origin.elapsed(), Value::Object(records[0].clone())));
            async move {
                sleep(Duration::from_millis(10)).await;
                Ok::<Vec<f64>, PredictError>(vec![0.0; records.len()])
            }
        })
        .await
        .unwrap();

        let starts = starts.lock().unwrap().clone();
        // each chunk is prepared when the previous one releases its ticket
        for (k, (at, _)) in starts.iter().enumerate() {
            let expected = 10 * k as u128;
            assert!((expected..=expected + 2).contains(&at.as_millis()), "{k}: {at:?}");
        }
        assert_eq!(starts[2].1, json!({"age": 32, "i": "2"}));
    }

    #[tokio::test]
    async fn schema_field_alone_does_not_coerce() {
        let samples = tagged(2);
        let mut opts = BulkOptions::new(10, 1);
        opts.schema = Some(FeatureSchema::new(["x"], ["y"]));
        let outcomes = run_chunks(&samples, &opts, |records| async move {
            Ok::<Vec<f64>, PredictError>(records.iter().map(tag).collect())
        })
        .await
        .unwrap();
        assert_eq!(assemble(outcomes).unwrap(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn empty_input_dispatches_nothing() {
        let calls = AtomicUsize::new(0);
        let outcomes = run_chunks(&[], &BulkOptions::new(5, 2), |_records| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<Vec<f64>, PredictError>(vec![]) }
        })
        .await
        .unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(assemble(outcomes).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn partition_covers_every_index_once(len in 0usize..300, batch in 1usize..50) {
            let items: Vec<usize> = (0..len).collect();
            let chunks = chunk_samples(&items, batch).unwrap();
            let mut next = 0;
            for (k, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, k);
                prop_assert_eq!(chunk.start, k * batch);
                prop_assert!(!chunk.is_empty() && chunk.len() <= batch);
                for (offset, item) in chunk.items.iter().enumerate() {
                    prop_assert_eq!(*item, chunk.start + offset);
                }
                next += chunk.len();
            }
            prop_assert_eq!(next, len);
        }
    }
}
