//! Trial runner, aggregation and report rendering through the public API.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use kycscan::evaluation::{
    parse_rendered_accuracies, render_report, AggregateReport, GroundTruth, MatchPolicy,
    ReferenceSource, StatisticsAggregator, TrialRunner, INSUFFICIENT_DATA,
};
use kycscan::extract::{DocumentSubmitter, ExtractError};
use kycscan::models::{DocumentImage, FailureKind, FieldMapping, FieldSchema, FieldSpec};

/// Replays a fixed list of replies, one per submission.
struct Replay(Mutex<VecDeque<Result<FieldMapping, ExtractError>>>);

impl Replay {
    fn new(replies: Vec<Result<FieldMapping, ExtractError>>) -> Self {
        Self(Mutex::new(replies.into()))
    }
}

#[async_trait]
impl DocumentSubmitter for Replay {
    fn describe(&self) -> String {
        "replay".to_string()
    }

    async fn submit(
        &self,
        _image: &DocumentImage,
        _schema: &FieldSchema,
    ) -> Result<FieldMapping, ExtractError> {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExtractError::ApiError("no reply left".into())))
    }
}

fn schema() -> FieldSchema {
    FieldSchema {
        name: "passport".to_string(),
        system_prompt: String::new(),
        instruction: String::new(),
        fields: vec![
            FieldSpec::new("FN", "first name", "John"),
            FieldSpec::new("LN", "last name", "Doe"),
            FieldSpec::new("POB", "place of birth", "CALIFORNIA"),
        ],
    }
}

fn reply(fn_: &str, ln: &str) -> Result<FieldMapping, ExtractError> {
    Ok(FieldMapping::from_pairs([
        ("FN", Some(fn_)),
        ("LN", Some(ln)),
        ("POB", None),
    ]))
}

fn image() -> DocumentImage {
    // Minimal GIF header is enough for content sniffing.
    let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec();
    DocumentImage::from_bytes(gif, 1024).unwrap()
}

async fn run(replies: Vec<Result<FieldMapping, ExtractError>>, truth: GroundTruth) -> AggregateReport {
    let submitter = Replay::new(replies);
    let trials = NonZeroUsize::new(submitter.0.lock().unwrap().len()).unwrap();
    let image = image();
    let schema = schema();

    let results = TrialRunner::new(&submitter)
        .with_delay(Duration::from_millis(1))
        .run(&image, &schema, trials)
        .await;

    StatisticsAggregator::new(&schema)
        .with_ground_truth(truth)
        .with_image_fingerprint(image.fingerprint())
        .aggregate(&results)
}

#[tokio::test]
async fn test_majority_reference_with_failed_trial() {
    let report = run(
        vec![
            reply("Jane", "Doe"),
            reply("Jane", "Dae"),
            Err(ExtractError::Timeout(Duration::from_secs(120))),
        ],
        GroundTruth::new(),
    )
    .await;

    assert_eq!(report.total_trials, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);

    let first_name = report.field("FN").unwrap();
    assert_eq!(first_name.reference.as_deref(), Some("Jane"));
    assert_eq!(first_name.reference_source, ReferenceSource::Majority);
    assert_eq!(first_name.accuracy, Some(1.0));

    // One vote each: the first spelling wins the tie.
    let last_name = report.field("LN").unwrap();
    assert_eq!(last_name.reference.as_deref(), Some("Doe"));
    assert_eq!(last_name.accuracy, Some(0.5));

    assert_eq!(report.field("POB").unwrap().accuracy, None);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, 2);
    assert_eq!(failures[0].1, FailureKind::Timeout);
}

#[tokio::test]
async fn test_ground_truth_report_renders_and_parses_back() {
    let truth = GroundTruth::from_assignments(["FN=jane", "LN=Doe"]).unwrap();
    let report = run(
        vec![
            reply("Jane", "Doe"),
            reply("Jane ", "DOE"),
            reply("Janet", "Doe"),
        ],
        truth,
    )
    .await;

    assert_eq!(report.match_policy, MatchPolicy::Normalized);
    assert_eq!(report.field("FN").unwrap().reference_source, ReferenceSource::GroundTruth);
    assert_eq!(report.field("LN").unwrap().accuracy, Some(1.0));
    assert_eq!(report.exact_match_rate, Some(2.0 / 3.0));

    let rendered = render_report(&report);
    assert!(rendered.contains("66.67%"));
    assert!(rendered.contains(INSUFFICIENT_DATA));
    assert!(rendered.contains(&report.image_fingerprint.clone().unwrap()));

    let parsed = parse_rendered_accuracies(&rendered);
    assert_eq!(parsed.len(), 3);
    for ((field, accuracy), stats) in parsed.iter().zip(&report.fields) {
        assert_eq!(field, &stats.field);
        match (accuracy, stats.accuracy) {
            (Some(parsed), Some(actual)) => assert!((parsed - actual).abs() < 0.00005),
            (None, None) => {}
            other => panic!("{}: {:?}", field, other),
        }
    }
}

#[tokio::test]
async fn test_all_trials_failing_leaves_rates_undefined() {
    let report = run(
        vec![
            Err(ExtractError::ApiError("HTTP 429".into())),
            Err(ExtractError::ApiError("HTTP 429".into())),
        ],
        GroundTruth::from_assignments(["FN=Jane"]).unwrap(),
    )
    .await;

    assert_eq!(report.success_rate, Some(0.0));
    assert!(report.fields.iter().all(|f| f.accuracy.is_none()));
    assert_eq!(report.mean_match_rate, None);
    assert!(render_report(&report).contains("HTTP 429"));
}

#[tokio::test]
async fn test_saved_report_round_trips_through_json() {
    let report = run(vec![reply("Jane", "Doe")], GroundTruth::new()).await;
    let restored = AggregateReport::from_json(&report.to_json().unwrap()).unwrap();
    assert_eq!(render_report(&restored), render_report(&report));
}
