//! Repeated extraction runs.
//!
//! Trials run strictly one after another against the same image and schema.
//! A failed trial is recorded and the run continues.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::extract::DocumentSubmitter;
use crate::models::{DocumentImage, FieldSchema, TrialResult};

/// Runs the same extraction N times and collects per-trial results.
pub struct TrialRunner<'a> {
    submitter: &'a dyn DocumentSubmitter,
    delay: Duration,
}

impl<'a> TrialRunner<'a> {
    pub fn new(submitter: &'a dyn DocumentSubmitter) -> Self {
        Self {
            submitter,
            delay: Duration::ZERO,
        }
    }

    /// Pause between consecutive trials. Not applied before the first trial.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run `trials` extractions and return exactly that many results in index order.
    pub async fn run(
        &self,
        image: &DocumentImage,
        schema: &FieldSchema,
        trials: NonZeroUsize,
    ) -> Vec<TrialResult> {
        self.run_with(image, schema, trials, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_trial` after every trial.
    pub async fn run_with<F>(
        &self,
        image: &DocumentImage,
        schema: &FieldSchema,
        trials: NonZeroUsize,
        mut on_trial: F,
    ) -> Vec<TrialResult>
    where
        F: FnMut(&TrialResult),
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("trial_run", %run_id, schema = %schema.name, trials = trials.get());

        async move {
            info!(
                "Starting {} trial(s) against {}",
                trials.get(),
                self.submitter.describe()
            );

            let mut results = Vec::with_capacity(trials.get());
            for index in 0..trials.get() {
                if index > 0 && !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }

                let started = Instant::now();
                let outcome = self.submitter.submit(image, schema).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;

                let result = match outcome {
                    Ok(fields) => {
                        debug!(
                            "Trial {} succeeded in {}ms ({}/{} fields found)",
                            index,
                            elapsed_ms,
                            fields.found_count(),
                            fields.len()
                        );
                        TrialResult::succeeded(index, fields, elapsed_ms)
                    }
                    Err(e) => {
                        warn!("Trial {} failed: {}", index, e);
                        TrialResult::failed(index, e.failure_kind(), e.to_string(), elapsed_ms)
                    }
                };

                on_trial(&result);
                results.push(result);
            }

            let succeeded = results.iter().filter(|r| r.is_success()).count();
            info!(
                "Run complete: {} succeeded, {} failed",
                succeeded,
                results.len() - succeeded
            );
            results
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::scripted::ScriptedSubmitter;
    use crate::extract::ExtractError;
    use crate::models::{FailureKind, FieldMapping, FieldSpec};
    use crate::utils::image::fixtures::png_bytes;
    use crate::utils::image::ImageError;

    fn image() -> DocumentImage {
        DocumentImage::from_bytes(png_bytes(2, 2), 1 << 20).unwrap()
    }

    fn schema() -> FieldSchema {
        FieldSchema {
            name: "test".to_string(),
            system_prompt: String::new(),
            instruction: String::new(),
            fields: vec![FieldSpec::new("name", "name", "Jane")],
        }
    }

    fn trials(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_returns_one_result_per_trial_in_order() {
        let submitter =
            ScriptedSubmitter::single_field("name", &[Some("Jane"), Some("Jane"), Some("Jan")]);
        let results = TrialRunner::new(&submitter)
            .run(&image(), &schema(), trials(3))
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_success()));
        let indices: Vec<_> = results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(submitter.calls(), 3);
    }

    #[tokio::test]
    async fn test_failures_do_not_halt_the_run() {
        let submitter = ScriptedSubmitter::new(vec![
            Err(ExtractError::Timeout(Duration::from_secs(5))),
            Ok(FieldMapping::from_pairs([("name", Some("Jane"))])),
            Err(ExtractError::InvalidImage(ImageError::Empty)),
            Err(ExtractError::ApiError("HTTP 500".into())),
        ]);
        let results = TrialRunner::new(&submitter)
            .run(&image(), &schema(), trials(4))
            .await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].failure().map(|(k, _)| k), Some(FailureKind::Timeout));
        assert!(results[1].is_success());
        assert_eq!(
            results[2].failure().map(|(k, _)| k),
            Some(FailureKind::InvalidImage)
        );
        assert_eq!(results[3].failure().map(|(k, _)| k), Some(FailureKind::ApiError));
    }

    #[tokio::test]
    async fn test_observer_sees_every_trial() {
        let submitter = ScriptedSubmitter::single_field("name", &[Some("A"), None]);
        let mut seen = Vec::new();
        let results = TrialRunner::new(&submitter)
            .with_delay(Duration::from_millis(1))
            .run_with(&image(), &schema(), trials(2), |r| seen.push(r.index))
            .await;

        assert_eq!(seen, vec![0, 1]);
        assert_eq!(results[1].fields().and_then(|f| f.value("name")), None);
    }
}
