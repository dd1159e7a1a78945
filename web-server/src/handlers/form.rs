//! Browser form handlers

use std::collections::HashMap;

use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::Html,
};

use super::run_pipeline;
use crate::views::{self, Outcome};
use crate::AppState;

/// Empty form
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(views::page(state.pipeline.schema(), &HashMap::new(), None))
}

/// Form submission: same page, output area filled with the result or the error
pub async fn assess(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Html<String>) {
    let submitted = form.clone();
    let result = run_pipeline(&state.pipeline, move |p| {
        let vector = p.collector().collect_form(&form)?;
        p.assess(&vector)
    })
    .await;

    let (status, outcome) = match result {
        Ok(assessment) => (StatusCode::OK, Outcome::Assessed(assessment)),
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::error!("Form assessment failed: {}", e);
            } else {
                tracing::debug!("Form rejected: {}", e);
            }
            (status, Outcome::Failed(e.user_message()))
        }
    };

    (
        status,
        Html(views::page(state.pipeline.schema(), &submitted, Some(&outcome))),
    )
}
