//! Bounded-width batch processing.
//!
//! Documents are parsed in chunks of `width`. Every document in a chunk runs
//! on the blocking pool; the next chunk starts only after the whole chunk has
//! settled. Documents share no state, so one failing document never affects
//! another.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use crate::invoice::InvoiceParser;
use crate::models::invoice::DocumentResult;

/// One document to parse.
#[derive(Debug, Clone)]
pub struct BatchInput {
    /// Name reported in the result.
    pub file_name: String,
    pub path: PathBuf,
}

impl BatchInput {
    /// Input named after the final path component.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            file_name,
            path: path.to_path_buf(),
        }
    }
}

/// Reported after every finished document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub file_name: String,
}

/// Parse `inputs` at most `width` at a time. Results are in input order and
/// there is exactly one per input.
pub async fn parse_batch<F>(
    parser: Arc<InvoiceParser>,
    inputs: Vec<BatchInput>,
    width: usize,
    mut on_progress: F,
) -> Vec<DocumentResult>
where
    F: FnMut(&BatchProgress),
{
    let total = inputs.len();
    let width = width.max(1);
    info!("Batch of {} documents, width {}", total, width);

    let mut completed = 0;
    run_in_chunks(
        inputs,
        width,
        |input| parse_one(Arc::clone(&parser), input),
        |result: &DocumentResult| {
            completed += 1;
            on_progress(&BatchProgress {
                completed,
                total,
                file_name: result.file_name.clone(),
            });
        },
    )
    .await
}

/// Run `job` over `items` in chunks of `width`; a chunk starts once the
/// previous one has settled. Output keeps input order.
async fn run_in_chunks<T, R, Fut>(
    items: Vec<T>,
    width: usize,
    mut job: impl FnMut(T) -> Fut,
    mut on_done: impl FnMut(&R),
) -> Vec<R>
where
    Fut: Future<Output = R>,
{
    let mut results: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
    let mut pending = items.into_iter().enumerate();

    loop {
        let chunk: Vec<(usize, T)> = pending.by_ref().take(width).collect();
        if chunk.is_empty() {
            break;
        }
        debug!("Starting chunk of {} documents", chunk.len());

        let mut in_flight: FuturesUnordered<_> = chunk
            .into_iter()
            .map(|(index, item)| {
                let fut = job(item);
                async move { (index, fut.await) }
            })
            .collect();

        while let Some((index, result)) = in_flight.next().await {
            on_done(&result);
            results[index] = Some(result);
        }
    }

    results.into_iter().flatten().collect()
}

async fn parse_one(parser: Arc<InvoiceParser>, input: BatchInput) -> DocumentResult {
    let data = match tokio::fs::read(&input.path).await {
        Ok(data) => data,
        Err(e) => {
            warn!("Cannot read {}: {}", input.path.display(), e);
            return DocumentResult::failed(input.file_name, format!("cannot read {}: {}", input.path.display(), e));
        }
    };

    let file_name = input.file_name.clone();
    match tokio::task::spawn_blocking(move || parser.parse_document(&input.file_name, &data)).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            warn!("Parser panicked on {}", file_name);
            DocumentResult::failed(file_name, "parser panicked")
        }
        Err(e) => {
            warn!("Parse task for {} did not finish: {}", file_name, e);
            DocumentResult::failed(file_name, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::ParserConfig;
    use crate::models::invoice::ParseStatus;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn parser() -> Arc<InvoiceParser> {
        Arc::new(InvoiceParser::new(ParserConfig::default()).unwrap())
    }

    #[test]
    fn test_input_named_after_file() {
        let input = BatchInput::from_path("/tmp/invoices/a.pdf");
        assert_eq!(input.file_name, "a.pdf");
        assert_eq!(input.path, PathBuf::from("/tmp/invoices/a.pdf"));
    }

    #[tokio::test]
    async fn test_missing_file_yields_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![BatchInput::from_path(dir.path().join("missing.pdf"))];

        let results = parse_batch(parser(), inputs, 10, |_| {}).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_name, "missing.pdf");
        assert_eq!(results[0].status, ParseStatus::Failed);
        assert!(results[0].error_message.as_deref().unwrap().starts_with("cannot read"));
    }

    #[tokio::test]
    async fn test_order_and_progress_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = Vec::new();
        for i in 0..5 {
            let path = dir.path().join(format!("doc{}.pdf", i));
            if i % 2 == 0 {
                std::fs::write(&path, b"not a pdf at all").unwrap();
            }
            inputs.push(BatchInput::from_path(path));
        }

        let mut progress = Vec::new();
        let results = parse_batch(parser(), inputs, 2, |p| progress.push((p.completed, p.total))).await;

        let names: Vec<&str> = results.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["doc0.pdf", "doc1.pdf", "doc2.pdf", "doc3.pdf", "doc4.pdf"]);
        assert!(results.iter().all(|r| r.status == ParseStatus::Failed));
        assert_eq!(progress, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_width() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut done = 0;

        let results = run_in_chunks(
            (0..7).collect(),
            3,
            |i: usize| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    i * 10
                }
            },
            |_: &usize| done += 1,
        )
        .await;

        assert_eq!(results, vec![0, 10, 20, 30, 40, 50, 60]);
        assert_eq!(done, 7);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_width_still_processes() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![
            BatchInput::from_path(dir.path().join("a.pdf")),
            BatchInput::from_path(dir.path().join("b.pdf")),
        ];

        let results = parse_batch(parser(), inputs, 0, |_| {}).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let mut calls = 0;
        let results = parse_batch(parser(), Vec::new(), 10, |_| calls += 1).await;
        assert!(results.is_empty());
        assert_eq!(calls, 0);
    }
}
