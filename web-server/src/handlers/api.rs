//! JSON API handlers

use std::collections::HashMap;

use axum::{extract::State, Json};
use mace_risk_core::{
    AggregatedExplanation, Assessment, FeatureSpec, FormColumn, LayoutInfo, RawValue,
};
use serde::{Deserialize, Serialize};

use super::run_pipeline;
use crate::{AppError, AppResult, AppState};

/// Either keyed values (form key or display name) or a schema-ordered list
#[derive(Debug, Deserialize)]
pub struct AssessRequest {
    #[serde(default)]
    pub features: Option<HashMap<String, RawValue>>,
    #[serde(default)]
    pub values: Option<Vec<RawValue>>,
}

#[derive(Debug, Serialize)]
pub struct AssessResponse {
    pub probability: f64,
    pub raw_score: f64,
    pub explanation: Option<ExplanationBody>,
    pub explanation_error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ExplanationBody {
    #[serde(flatten)]
    pub aggregated: AggregatedExplanation,
    pub final_value: f64,
    pub image_id: String,
    pub image_url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl From<Assessment> for AssessResponse {
    fn from(assessment: Assessment) -> Self {
        let (explanation, explanation_error) = match assessment.explanation {
            Ok(published) => (
                Some(ExplanationBody {
                    final_value: published.aggregated.final_value(),
                    image_url: format!("/explanations/{}", published.image.id),
                    image_id: published.image.id,
                    width: published.image.width,
                    height: published.image.height,
                    aggregated: published.aggregated,
                }),
                None,
            ),
            Err(e) => (
                None,
                Some(ErrorBody {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            ),
        };

        Self {
            probability: assessment.prediction.probability,
            raw_score: assessment.prediction.raw_score,
            explanation,
            explanation_error,
        }
    }
}

/// Predict and explain one submission
pub async fn assess(
    State(state): State<AppState>,
    Json(req): Json<AssessRequest>,
) -> AppResult<Json<AssessResponse>> {
    let assessment = match (req.features, req.values) {
        (Some(features), None) => {
            run_pipeline(&state.pipeline, move |p| {
                let vector = p.collector().collect(&features)?;
                p.assess(&vector)
            })
            .await?
        }
        (None, Some(values)) => {
            run_pipeline(&state.pipeline, move |p| {
                let vector = p.collector().collect_ordered(&values)?;
                p.assess(&vector)
            })
            .await?
        }
        _ => {
            return Err(AppError::ValidationError(
                "Provide exactly one of 'features' or 'values'".to_string(),
            ))
        }
    };

    Ok(Json(assessment.into()))
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub layout: LayoutInfo,
    pub top_k: usize,
    pub features: Vec<FieldBody>,
}

#[derive(Debug, Serialize)]
pub struct FieldBody {
    #[serde(flatten)]
    pub spec: FeatureSpec,
    pub column: FormColumn,
    pub default: f64,
}

/// Feature layout the API and form expect
pub async fn schema(State(state): State<AppState>) -> Json<SchemaResponse> {
    let schema = state.pipeline.schema();
    let features = schema
        .specs
        .iter()
        .enumerate()
        .map(|(i, spec)| FieldBody {
            spec: *spec,
            column: schema.form_column(i).unwrap_or(FormColumn::Left),
            default: spec.default_value(),
        })
        .collect();

    Json(SchemaResponse {
        layout: schema.layout_info(),
        top_k: state.pipeline.top_k(),
        features,
    })
}
