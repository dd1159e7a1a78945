//! Gradient boosted tree ensemble with exact TreeSHAP attributions
//!
//! XGBoost-style layout: a split sends `x < threshold` left, missing values
//! follow `default_left`. Scores are summed in margin space on top of
//! `base_score`. Attributions use the path-dependent TreeSHAP recursion with
//! cover-weighted expectations, so for every sample
//! `expected_value + Σ contributions == margin` up to float rounding.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::Deserialize;

use super::inference::{
    check_batch, sigmoid, AttributionOutput, ModelMetadata, OutputShape, Predictor,
};
use crate::logic::error::{RiskError, RiskResult};

// ============================================================================
// ARTIFACT FORMAT
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SplitDef {
    pub feature: usize,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    #[serde(default = "default_true")]
    pub default_left: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDef {
    /// Training weight that reached this node
    pub cover: f64,
    #[serde(default)]
    pub split: Option<SplitDef>,
    #[serde(default)]
    pub leaf: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeDef {
    /// Output the tree adds to (0 for single-output models)
    #[serde(default)]
    pub class: usize,
    pub nodes: Vec<NodeDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeEnsembleDef {
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub base_score: f64,
    #[serde(default = "default_num_class")]
    pub num_class: usize,
    pub trees: Vec<TreeDef>,
}

fn default_true() -> bool {
    true
}

fn default_num_class() -> usize {
    1
}

// ============================================================================
// VALIDATED MODEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct Split {
    feature: usize,
    threshold: f64,
    left: usize,
    right: usize,
    default_left: bool,
}

impl Split {
    fn goes_left(&self, value: f64) -> bool {
        if value.is_nan() {
            self.default_left
        } else {
            value < self.threshold
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeKind {
    Split(Split),
    Leaf(f64),
}

#[derive(Debug, Clone)]
struct Node {
    cover: f64,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct Tree {
    class: usize,
    nodes: Vec<Node>,
    max_depth: usize,
}

#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    metadata: ModelMetadata,
    feature_names: Vec<String>,
    base_score: f64,
    shape: OutputShape,
    trees: Vec<Tree>,
    /// Per-output expected margin (base score included)
    expected: Vec<f64>,
}

impl Tree {
    fn from_def(def: TreeDef, n_features: usize, outputs: usize) -> Result<Self, String> {
        if def.class >= outputs {
            return Err(format!("tree class {} out of range (outputs: {})", def.class, outputs));
        }
        if def.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        let n = def.nodes.len();
        let mut parents = vec![0usize; n];
        let mut nodes = Vec::with_capacity(n);

        for (i, node) in def.nodes.into_iter().enumerate() {
            if !(node.cover.is_finite() && node.cover > 0.0) {
                return Err(format!("node {} has non-positive cover {}", i, node.cover));
            }

            let kind = match (node.split, node.leaf) {
                (Some(s), None) => {
                    if s.feature >= n_features {
                        return Err(format!("node {} splits on unknown feature {}", i, s.feature));
                    }
                    if s.threshold.is_nan() {
                        return Err(format!("node {} has NaN threshold", i));
                    }
                    for child in [s.left, s.right] {
                        if child <= i || child >= n {
                            return Err(format!("node {} has invalid child {}", i, child));
                        }
                        parents[child] += 1;
                    }
                    if s.left == s.right {
                        return Err(format!("node {} has identical children", i));
                    }
                    NodeKind::Split(Split {
                        feature: s.feature,
                        threshold: s.threshold,
                        left: s.left,
                        right: s.right,
                        default_left: s.default_left,
                    })
                }
                (None, Some(value)) if value.is_finite() => NodeKind::Leaf(value),
                (None, Some(value)) => {
                    return Err(format!("node {} has non-finite leaf {}", i, value))
                }
                _ => return Err(format!("node {} must have exactly one of split/leaf", i)),
            };

            nodes.push(Node { cover: node.cover, kind });
        }

        if let Some(orphan) = (1..n).find(|&i| parents[i] != 1) {
            return Err(format!("node {} must have exactly one parent", orphan));
        }

        let mut tree = Self {
            class: def.class,
            nodes,
            max_depth: 0,
        };
        tree.max_depth = tree.depth(0);
        Ok(tree)
    }

    fn depth(&self, node: usize) -> usize {
        match self.nodes[node].kind {
            NodeKind::Leaf(_) => 0,
            NodeKind::Split(s) => 1 + self.depth(s.left).max(self.depth(s.right)),
        }
    }

    fn predict(&self, x: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx].kind {
                NodeKind::Leaf(value) => return value,
                NodeKind::Split(s) => {
                    idx = if s.goes_left(x[s.feature]) { s.left } else { s.right };
                }
            }
        }
    }

    /// Cover-weighted mean leaf value below `node`
    fn expected_value(&self, node: usize) -> f64 {
        match self.nodes[node].kind {
            NodeKind::Leaf(value) => value,
            NodeKind::Split(s) => {
                let (cl, cr) = (self.nodes[s.left].cover, self.nodes[s.right].cover);
                (cl * self.expected_value(s.left) + cr * self.expected_value(s.right)) / (cl + cr)
            }
        }
    }

    /// Add this tree's TreeSHAP values for `x` into `phi`
    fn shap(&self, x: ArrayView1<'_, f64>, phi: &mut [f64]) {
        let path = Vec::with_capacity(self.max_depth + 2);
        self.shap_recurse(0, x, phi, path, 1.0, 1.0, None);
    }

    #[allow(clippy::too_many_arguments)]
    fn shap_recurse(
        &self,
        node: usize,
        x: ArrayView1<'_, f64>,
        phi: &mut [f64],
        mut path: Vec<PathElement>,
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        extend_path(&mut path, zero_fraction, one_fraction, feature);

        match self.nodes[node].kind {
            NodeKind::Leaf(value) => {
                for i in 1..path.len() {
                    let weight = unwound_path_sum(&path, i);
                    let el = path[i];
                    if let Some(f) = el.feature {
                        phi[f] += weight * (el.one_fraction - el.zero_fraction) * value;
                    }
                }
            }
            NodeKind::Split(s) => {
                let (hot, cold) = if s.goes_left(x[s.feature]) {
                    (s.left, s.right)
                } else {
                    (s.right, s.left)
                };
                let hot_cover = self.nodes[hot].cover;
                let cold_cover = self.nodes[cold].cover;
                let total = hot_cover + cold_cover;

                // A feature seen earlier on the path is merged, not duplicated
                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(s.feature)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind_path(&mut path, k);
                }

                self.shap_recurse(
                    hot,
                    x,
                    phi,
                    path.clone(),
                    incoming_zero * hot_cover / total,
                    incoming_one,
                    Some(s.feature),
                );
                self.shap_recurse(
                    cold,
                    x,
                    phi,
                    path,
                    incoming_zero * cold_cover / total,
                    0.0,
                    Some(s.feature),
                );
            }
        }
    }
}

// ============================================================================
// TREESHAP PATH BOOKKEEPING
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });

    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / denom;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / denom;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next_one_portion = path[depth].weight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].weight;
            path[i].weight = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            next_one_portion = tmp - path[i].weight * zero_fraction * (depth - i) as f64 / denom;
        } else {
            path[i].weight = path[i].weight * denom / (zero_fraction * (depth - i) as f64);
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let mut next_one_portion = path[depth].weight;
    let mut total = 0.0;

    if one_fraction != 0.0 {
        for i in (0..depth).rev() {
            let tmp = next_one_portion / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = path[i].weight - tmp * zero_fraction * (depth - i) as f64;
        }
    } else {
        for i in (0..depth).rev() {
            total += path[i].weight / (zero_fraction * (depth - i) as f64);
        }
    }

    total * (depth + 1) as f64
}

// ============================================================================
// ENSEMBLE
// ============================================================================

impl TreeEnsemble {
    pub fn from_def(def: TreeEnsembleDef, mut metadata: ModelMetadata) -> Result<Self, String> {
        if def.feature_names.is_empty() {
            return Err("model declares no features".to_string());
        }
        if !def.base_score.is_finite() {
            return Err("base_score must be finite".to_string());
        }
        let shape = match def.num_class {
            1 => OutputShape::Single,
            2 => OutputShape::PerClass { classes: 2 },
            n => return Err(format!("binary classifier expects num_class 1 or 2, got {}", n)),
        };

        let n_features = def.feature_names.len();
        let outputs = shape.outputs();
        let trees = def
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, t)| Tree::from_def(t, n_features, outputs).map_err(|e| format!("tree {}: {}", i, e)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut expected = vec![def.base_score; outputs];
        for tree in &trees {
            expected[tree.class] += tree.expected_value(0);
        }

        metadata.features = n_features;

        Ok(Self {
            metadata,
            feature_names: def.feature_names,
            base_score: def.base_score,
            shape,
            trees,
            expected,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn margins(&self, x: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut out = vec![self.base_score; self.shape.outputs()];
        for tree in &self.trees {
            out[tree.class] += tree.predict(x);
        }
        out
    }
}

impl Predictor for TreeEnsemble {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn output_shape(&self) -> OutputShape {
        self.shape
    }

    fn raw_scores(&self, batch: ArrayView2<'_, f64>) -> RiskResult<Array2<f64>> {
        check_batch(&batch, self.feature_names.len()).map_err(RiskError::SchemaMismatch)?;

        let outputs = self.shape.outputs();
        let mut scores = Array2::zeros((batch.nrows(), outputs));
        for (r, row) in batch.rows().into_iter().enumerate() {
            for (c, m) in self.margins(row).into_iter().enumerate() {
                scores[[r, c]] = m;
            }
        }
        Ok(scores)
    }

    fn predict_proba(&self, batch: ArrayView2<'_, f64>) -> RiskResult<Array2<f64>> {
        let scores = self.raw_scores(batch)?;
        let mut proba = Array2::zeros((scores.nrows(), 2));

        for (r, row) in scores.rows().into_iter().enumerate() {
            let positive = match self.shape {
                OutputShape::Single => sigmoid(row[0]),
                // Two-class softmax reduces to a sigmoid of the margin gap
                OutputShape::PerClass { .. } => sigmoid(row[1] - row[0]),
            };
            proba[[r, 0]] = 1.0 - positive;
            proba[[r, 1]] = positive;
        }
        Ok(proba)
    }

    fn attributions(&self, batch: ArrayView2<'_, f64>) -> RiskResult<AttributionOutput> {
        check_batch(&batch, self.feature_names.len()).map_err(RiskError::Attribution)?;

        let (n, f) = batch.dim();
        let outputs = self.shape.outputs();
        let mut values = vec![Array2::<f64>::zeros((n, f)); outputs];

        let mut phi = vec![0.0; f];
        for (r, row) in batch.rows().into_iter().enumerate() {
            for class in 0..outputs {
                phi.iter_mut().for_each(|p| *p = 0.0);
                for tree in self.trees.iter().filter(|t| t.class == class) {
                    tree.shap(row, &mut phi);
                }
                for (c, p) in phi.iter().enumerate() {
                    values[class][[r, c]] = *p;
                }
            }
        }

        Ok(match self.shape {
            OutputShape::Single => AttributionOutput::Single {
                expected_value: self.expected[0],
                values: values.remove(0),
            },
            OutputShape::PerClass { .. } => AttributionOutput::PerClass {
                expected_values: self.expected.clone(),
                values,
            },
        })
    }
}
