//! Repeated-trial evaluation form handlers.

use std::num::NonZeroUsize;
use std::time::Duration;

use askama::Template;
use axum::{
    extract::{Multipart, State},
    response::Html,
};

use super::super::template_structs::{EvaluateTemplate, FormState, ReportView};
use super::super::AppState;
use super::form::{FormError, UploadForm, MAX_FORM_TRIALS};
use crate::evaluation::{AggregateReport, StatisticsAggregator, TrialRunner};
use crate::extract::resolve_schema;

fn render(template: EvaluateTemplate<'_>) -> Html<String> {
    Html(
        template
            .render()
            .unwrap_or_else(|e| format!("Template error: {}", e)),
    )
}

fn page(
    form: FormState,
    trials: usize,
    ground_truth: String,
    outcome: Result<Option<AggregateReport>, FormError>,
) -> EvaluateTemplate<'static> {
    let (error, report) = match outcome {
        Ok(report) => (String::new(), report.iter().map(ReportView::from).collect()),
        Err(e) => (e.to_string(), Vec::new()),
    };

    EvaluateTemplate {
        title: "Evaluate accuracy",
        form,
        trials,
        max_trials: MAX_FORM_TRIALS,
        ground_truth,
        has_error: !error.is_empty(),
        error,
        report,
    }
}

async fn run_evaluation(state: &AppState, form: &mut UploadForm) -> Result<AggregateReport, FormError> {
    let trials = form.trials(state.settings.default_trials)?;
    let trials = NonZeroUsize::new(trials).ok_or_else(|| FormError::InvalidTrials(trials.to_string()))?;
    let ground_truth = form.ground_truth()?;
    let image = form.document(state.settings.max_image_bytes)?;

    let schema = resolve_schema(
        &form.selection(),
        state.submitter.as_ref(),
        &image,
        &state.catalog,
    )
    .await?;

    let results = TrialRunner::new(state.submitter.as_ref())
        .with_delay(Duration::from_millis(state.settings.trial_delay_ms))
        .run(&image, schema, trials)
        .await;

    Ok(StatisticsAggregator::new(schema)
        .with_ground_truth(ground_truth)
        .with_policy(state.settings.match_policy)
        .with_image_fingerprint(image.fingerprint())
        .aggregate(&results))
}

/// Empty evaluation form.
pub async fn evaluate_form(State(state): State<AppState>) -> Html<String> {
    let form = FormState::new(&state.catalog, "auto", 0, state.settings.max_image_bytes);
    let trials = state.settings.default_trials.clamp(1, MAX_FORM_TRIALS);
    render(page(form, trials, String::new(), Ok(None)))
}

/// Run the trials and show the accuracy report under the form.
pub async fn evaluate_submit(State(state): State<AppState>, multipart: Multipart) -> Html<String> {
    let max_bytes = state.settings.max_image_bytes;
    let default_trials = state.settings.default_trials.clamp(1, MAX_FORM_TRIALS);

    let mut form = match UploadForm::read(multipart).await {
        Ok(form) => form,
        Err(e) => {
            let form = FormState::new(&state.catalog, "auto", 0, max_bytes);
            return render(page(form, default_trials, String::new(), Err(e)));
        }
    };

    let form_state = FormState::new(
        &state.catalog,
        form.schema.as_deref().unwrap_or_default(),
        form.rotation_degrees(),
        max_bytes,
    );
    let trials = form.trials(default_trials).unwrap_or(default_trials);
    let ground_truth = form.ground_truth.clone().unwrap_or_default();

    let outcome = run_evaluation(&state, &mut form).await.map(Some);
    render(page(form_state, trials, ground_truth, outcome))
}
