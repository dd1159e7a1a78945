//! Risk Pipeline - one submission from feature vector to published image
//!
//! Stateless across submissions: every call computes its own prediction,
//! attributions and image. The only shared pieces are the read-only model
//! and the image directory.

use serde::Serialize;

use crate::logic::config::PipelineConfig;
use crate::logic::display::{ImageStore, PublishedImage};
use crate::logic::error::{RiskError, RiskResult};
use crate::logic::explain::{aggregate_top_k, AggregatedExplanation, AttributionEngine};
use crate::logic::features::{FeatureSchema, FeatureVector, InputCollector, MACE_SCHEMA};
use crate::logic::model::{load_model, ModelMetadata};
use crate::logic::render::{render_waterfall, RenderConfig};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    /// P(event) in [0, 1]
    pub probability: f64,
    /// Positive-class margin the attributions add up to
    pub raw_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishedExplanation {
    pub aggregated: AggregatedExplanation,
    pub image: PublishedImage,
}

/// Prediction plus the outcome of explaining it.
/// The explanation can fail on its own without hiding the probability.
#[derive(Debug)]
pub struct Assessment {
    pub prediction: Prediction,
    pub explanation: Result<PublishedExplanation, RiskError>,
}

pub struct RiskPipeline {
    engine: AttributionEngine,
    render: RenderConfig,
    store: ImageStore,
    top_k: usize,
}

impl RiskPipeline {
    pub fn new(
        engine: AttributionEngine,
        render: RenderConfig,
        store: ImageStore,
        top_k: usize,
    ) -> Self {
        Self {
            engine,
            render,
            store,
            top_k,
        }
    }

    /// Load the model and open the image store described by `config`
    pub fn from_config(config: &PipelineConfig) -> RiskResult<Self> {
        let model = load_model(&config.model_path)?;
        let engine = AttributionEngine::new(model, MACE_SCHEMA)?;

        // Fail at startup rather than on the first submission
        config.render.pixel_size()?;

        let store = ImageStore::new(&config.image_dir, config.image_naming())?
            .with_ttl(config.image_ttl);

        Ok(Self::new(engine, config.render, store, config.top_k))
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.engine.schema()
    }

    pub fn collector(&self) -> InputCollector<'_> {
        InputCollector::new(self.engine.schema())
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn model_metadata(&self) -> &ModelMetadata {
        self.engine.predictor().metadata()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn predict(&self, vector: &FeatureVector) -> RiskResult<Prediction> {
        let (probability, raw_score) = self.engine.predict_probability(vector)?;
        Ok(Prediction {
            probability,
            raw_score,
        })
    }

    pub fn explain(&self, vector: &FeatureVector) -> RiskResult<PublishedExplanation> {
        // 1. Additive attributions for the positive class
        let explanation = self.engine.explain(vector)?;

        // 2. Keep the top-K, fold the rest into "Other"
        let aggregated = aggregate_top_k(&explanation, self.top_k);

        // 3. Rasterize
        let image = render_waterfall(&aggregated, &self.render)?;

        // 4. Persist + decode-verify before anything is exposed
        let image = self.store.publish(&image)?;

        Ok(PublishedExplanation { aggregated, image })
    }

    /// Predict, then explain. Only a failed prediction fails the whole call.
    pub fn assess(&self, vector: &FeatureVector) -> RiskResult<Assessment> {
        log::debug!("Assessing {}", vector.to_log_entry(self.schema()));

        let prediction = self.predict(vector)?;
        let explanation = self.explain(vector);

        match &explanation {
            Ok(published) => log::info!(
                "Assessment: p={:.4} raw={:.4} image={}",
                prediction.probability,
                prediction.raw_score,
                published.image.id
            ),
            Err(e) => log::warn!(
                "Assessment: p={:.4} raw={:.4}, explanation failed: {}",
                prediction.probability,
                prediction.raw_score,
                e
            ),
        }

        Ok(Assessment {
            prediction,
            explanation,
        })
    }
}
