use std::sync::Arc;

use ndarray::Array2;

use super::types::{BatchExplanation, Explanation};
use crate::constants::{ADDITIVITY_TOLERANCE, POSITIVE_CLASS};
use crate::logic::error::{RiskError, RiskResult};
use crate::logic::features::{stack_batch, FeatureSchema, FeatureVector};
use crate::logic::model::{AttributionOutput, OutputShape, Predictor};

/// Which attribution set describes the "event occurs" class.
/// Resolved once when the predictor is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassSelector {
    /// Single undifferentiated output
    Direct,
    /// Per-class output, take this class
    Class(usize),
}

pub struct AttributionEngine {
    predictor: Arc<dyn Predictor>,
    schema: FeatureSchema,
    selector: ClassSelector,
}

impl AttributionEngine {
    /// Wrap a fitted predictor. Its feature list must equal the schema.
    pub fn new(predictor: Arc<dyn Predictor>, schema: FeatureSchema) -> RiskResult<Self> {
        schema.validate_names(predictor.feature_names())?;

        let selector = match predictor.output_shape() {
            OutputShape::Single => ClassSelector::Direct,
            OutputShape::PerClass { classes } if classes > POSITIVE_CLASS => {
                ClassSelector::Class(POSITIVE_CLASS)
            }
            OutputShape::PerClass { classes } => {
                return Err(RiskError::Attribution(format!(
                    "per-class model with {} classes has no positive class",
                    classes
                )))
            }
        };

        log::debug!(
            "Attribution engine ready: {} ({:?})",
            predictor.metadata().model_type,
            selector
        );

        Ok(Self {
            predictor,
            schema,
            selector,
        })
    }

    pub fn predictor(&self) -> &Arc<dyn Predictor> {
        &self.predictor
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Positive-class margin for each row
    fn positive_scores(&self, batch: &Array2<f64>) -> RiskResult<Vec<f64>> {
        let scores = self.predictor.raw_scores(batch.view())?;
        let column = match self.selector {
            ClassSelector::Direct => 0,
            ClassSelector::Class(c) => c,
        };
        if column >= scores.ncols() {
            return Err(RiskError::Attribution(format!(
                "model returned {} score columns, expected class {}",
                scores.ncols(),
                column
            )));
        }
        Ok(scores.column(column).to_vec())
    }

    /// Probability of the event class for one vector
    pub fn predict_probability(&self, vector: &FeatureVector) -> RiskResult<(f64, f64)> {
        vector.validate(&self.schema)?;
        let batch = vector.to_batch();
        let proba = self.predictor.predict_proba(batch.view())?;
        let probability = proba.get([0, 1]).copied().ok_or_else(|| {
            RiskError::Attribution(format!(
                "probabilities shaped {:?}, expected (1, 2)",
                proba.dim()
            ))
        })?;
        let raw = self.positive_scores(&batch)?;
        let raw_score = raw
            .first()
            .copied()
            .ok_or_else(|| RiskError::Attribution("empty score result".to_string()))?;
        Ok((probability, raw_score))
    }

    /// Attributions for one vector (batch of one)
    pub fn explain(&self, vector: &FeatureVector) -> RiskResult<Explanation> {
        let batch = self.explain_batch(std::slice::from_ref(vector))?;
        batch
            .row(0)
            .ok_or_else(|| RiskError::Attribution("empty attribution result".to_string()))
    }

    pub fn explain_batch(&self, vectors: &[FeatureVector]) -> RiskResult<BatchExplanation> {
        if vectors.is_empty() {
            return Err(RiskError::Attribution("nothing to explain".to_string()));
        }

        // Layout check happens before the predictor sees anything
        let batch = stack_batch(&self.schema, vectors)?;

        let output = self.predictor.attributions(batch.view())?;
        let (baseline, values) = match (self.selector, output) {
            (ClassSelector::Direct, AttributionOutput::Single { expected_value, values }) => {
                (expected_value, values)
            }
            (
                ClassSelector::Class(c),
                AttributionOutput::PerClass {
                    mut expected_values,
                    mut values,
                },
            ) if c < expected_values.len() && c < values.len() => {
                (expected_values.swap_remove(c), values.swap_remove(c))
            }
            (selector, _) => {
                return Err(RiskError::Attribution(format!(
                    "attribution output does not match model shape ({:?})",
                    selector
                )))
            }
        };

        if values.dim() != batch.dim() {
            return Err(RiskError::Attribution(format!(
                "attributions shaped {:?}, input shaped {:?}",
                values.dim(),
                batch.dim()
            )));
        }

        let raw_scores = self.positive_scores(&batch)?;

        for (r, score) in raw_scores.iter().enumerate() {
            let total = baseline + values.row(r).sum();
            let tolerance = ADDITIVITY_TOLERANCE * score.abs().max(1.0);
            if !total.is_finite() || (total - score).abs() > tolerance {
                return Err(RiskError::Attribution(format!(
                    "attributions are not additive: baseline + contributions = {}, score = {}",
                    total, score
                )));
            }
        }

        Ok(BatchExplanation {
            baseline,
            feature_names: self.schema.names().map(str::to_string).collect(),
            values,
            raw_scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ndarray::ArrayView2;

    use crate::logic::features::{FeatureSpec, MACE_SCHEMA};
    use crate::logic::model::{parse_model, ModelMetadata};

    const PAIR: &[FeatureSpec] = &[
        FeatureSpec::numerical("a", "a"),
        FeatureSpec::numerical("b", "b"),
    ];

    fn pair_schema() -> FeatureSchema {
        FeatureSchema::new(1, PAIR)
    }

    /// Scripted predictor: margin = a + b, attributions chosen per test
    struct ScriptedPredictor {
        names: Vec<String>,
        shape: OutputShape,
        output: AttributionOutput,
        calls: AtomicUsize,
        metadata: ModelMetadata,
        proba_columns: usize,
    }

    impl ScriptedPredictor {
        fn new(shape: OutputShape, output: AttributionOutput) -> Self {
            Self {
                names: vec!["a".into(), "b".into()],
                shape,
                output,
                calls: AtomicUsize::new(0),
                metadata: ModelMetadata::default(),
                proba_columns: 2,
            }
        }
    }

    impl Predictor for ScriptedPredictor {
        fn metadata(&self) -> &ModelMetadata {
            &self.metadata
        }

        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn output_shape(&self) -> OutputShape {
            self.shape
        }

        fn raw_scores(&self, batch: ArrayView2<'_, f64>) -> RiskResult<Array2<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outputs = self.shape.outputs();
            let mut out = Array2::zeros((batch.nrows(), outputs));
            for (r, row) in batch.rows().into_iter().enumerate() {
                out[[r, outputs - 1]] = row.sum();
            }
            Ok(out)
        }

        fn predict_proba(&self, batch: ArrayView2<'_, f64>) -> RiskResult<Array2<f64>> {
            Ok(Array2::from_elem((batch.nrows(), self.proba_columns), 0.5))
        }

        fn attributions(&self, _batch: ArrayView2<'_, f64>) -> RiskResult<AttributionOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    fn pair_vector(a: f64, b: f64) -> FeatureVector {
        FeatureVector::from_values(&pair_schema(), vec![a, b]).unwrap()
    }

    #[test]
    fn test_single_output_used_directly() {
        let predictor = ScriptedPredictor::new(
            OutputShape::Single,
            AttributionOutput::Single {
                expected_value: 1.0,
                values: ndarray::array![[2.0, 0.0]],
            },
        );
        let engine = AttributionEngine::new(Arc::new(predictor), pair_schema()).unwrap();

        let explanation = engine.explain(&pair_vector(1.0, 2.0)).unwrap();
        assert_eq!(explanation.baseline, 1.0);
        assert_eq!(explanation.raw_score, 3.0);
        assert_eq!(explanation.contributions[0].feature_name, "a");
        assert_eq!(explanation.contributions[0].value, 2.0);
    }

    #[test]
    fn test_per_class_selects_positive_class() {
        let predictor = ScriptedPredictor::new(
            OutputShape::PerClass { classes: 2 },
            AttributionOutput::PerClass {
                expected_values: vec![-9.0, 0.5],
                values: vec![ndarray::array![[7.0, 7.0]], ndarray::array![[1.0, 1.5]]],
            },
        );
        let engine = AttributionEngine::new(Arc::new(predictor), pair_schema()).unwrap();

        let explanation = engine.explain(&pair_vector(1.0, 2.0)).unwrap();
        assert_eq!(explanation.baseline, 0.5);
        assert_eq!(explanation.contributions[1].value, 1.5);
        assert!((explanation.total() - explanation.raw_score).abs() < 1e-12);
    }

    #[test]
    fn test_shape_disagreement_is_attribution_error() {
        let predictor = ScriptedPredictor::new(
            OutputShape::Single,
            AttributionOutput::PerClass {
                expected_values: vec![0.0, 0.0],
                values: vec![ndarray::array![[0.0, 0.0]], ndarray::array![[0.0, 0.0]]],
            },
        );
        let engine = AttributionEngine::new(Arc::new(predictor), pair_schema()).unwrap();
        let err = engine.explain(&pair_vector(0.0, 0.0)).unwrap_err();
        assert!(matches!(err, RiskError::Attribution(_)));
    }

    #[test]
    fn test_narrow_probabilities_are_attribution_error() {
        let mut predictor = ScriptedPredictor::new(
            OutputShape::Single,
            AttributionOutput::Single {
                expected_value: 0.0,
                values: ndarray::array![[0.0, 0.0]],
            },
        );
        predictor.proba_columns = 1;
        let engine = AttributionEngine::new(Arc::new(predictor), pair_schema()).unwrap();

        let err = engine.predict_probability(&pair_vector(1.0, 2.0)).unwrap_err();
        assert!(matches!(err, RiskError::Attribution(_)));
        assert!(err.to_string().contains("(1, 1)"));
    }

    #[test]
    fn test_non_additive_output_rejected() {
        let predictor = ScriptedPredictor::new(
            OutputShape::Single,
            AttributionOutput::Single {
                expected_value: 0.0,
                values: ndarray::array![[1.0, 1.0]],
            },
        );
        let engine = AttributionEngine::new(Arc::new(predictor), pair_schema()).unwrap();
        // margin is 5.0, attributions only reach 2.0
        let err = engine.explain(&pair_vector(2.0, 3.0)).unwrap_err();
        assert!(err.to_string().contains("not additive"));
    }

    #[test]
    fn test_schema_mismatch_before_predictor_call() {
        let predictor = Arc::new(ScriptedPredictor::new(
            OutputShape::Single,
            AttributionOutput::Single {
                expected_value: 0.0,
                values: ndarray::array![[0.0, 0.0]],
            },
        ));
        let engine = AttributionEngine::new(predictor.clone(), pair_schema()).unwrap();

        let foreign = FeatureVector::defaults(&MACE_SCHEMA);
        let err = engine.explain(&foreign).unwrap_err();
        assert!(matches!(err, RiskError::SchemaMismatch(_)));
        assert_eq!(predictor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wrap_rejects_foreign_model() {
        let json = r#"{
            "model_type": "logistic_regression",
            "feature_names": ["b", "a"],
            "coefficients": [1.0, 1.0],
            "intercept": 0.0
        }"#;
        let model = parse_model(json.as_bytes(), "inline").unwrap();
        let err = AttributionEngine::new(model, pair_schema()).err();
        assert!(matches!(err, Some(RiskError::SchemaMismatch(_))));
    }

    #[test]
    fn test_single_class_per_class_model_rejected() {
        let predictor = ScriptedPredictor::new(
            OutputShape::PerClass { classes: 1 },
            AttributionOutput::PerClass {
                expected_values: vec![0.0],
                values: vec![ndarray::array![[0.0, 0.0]]],
            },
        );
        let err = AttributionEngine::new(Arc::new(predictor), pair_schema()).err();
        assert!(matches!(err, Some(RiskError::Attribution(_))));
    }

    #[test]
    fn test_bundled_model_additive_through_engine() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("models/mace_xgb.json");
        let model = crate::logic::model::load_model(path).unwrap();
        let engine = AttributionEngine::new(model, MACE_SCHEMA).unwrap();

        let mut values = vec![0.0; MACE_SCHEMA.len()];
        values[0] = 1.0;
        values[2] = 70.0;
        let vector = FeatureVector::from_values(&MACE_SCHEMA, values).unwrap();

        let explanation = engine.explain(&vector).unwrap();
        assert_eq!(explanation.contributions.len(), MACE_SCHEMA.len());
        assert!((explanation.total() - explanation.raw_score).abs() < 1e-6);

        let (probability, raw) = engine.predict_probability(&vector).unwrap();
        assert_eq!(raw, explanation.raw_score);
        assert!((probability - 1.0 / (1.0 + (-raw).exp())).abs() < 1e-12);
    }
}
