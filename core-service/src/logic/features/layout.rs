//! Feature Layout - Centralized Feature Definition
//!
//! **CRITICAL: This file controls the feature schema**
//!
//! The order of `MACE_FEATURES` is the contract between the input collector
//! and the model artifact. The model was trained on exactly this order.
//!
//! ## Rules (NEVER break these):
//! 1. Add feature → increment FEATURE_VERSION
//! 2. Change order → increment FEATURE_VERSION
//! 3. Remove feature → increment FEATURE_VERSION

use crc32fast::Hasher;
use serde::Serialize;

use crate::logic::error::{RiskError, RiskResult};

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current feature layout version
/// MUST be incremented when layout changes
pub const FEATURE_VERSION: u8 = 1;

// ============================================================================
// FEATURE SPEC
// ============================================================================

/// Form column a control is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormColumn {
    Left,
    Right,
}

/// One permitted code of a categorical feature and its human label
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoricalOption {
    pub code: i64,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Any finite real; no range validation
    Numerical,
    /// One of a fixed set of codes; the control is pinned to `column`
    Categorical {
        options: &'static [CategoricalOption],
        column: FormColumn,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSpec {
    /// Display name, also the model's column name
    pub name: &'static str,
    /// Stable form/API key
    pub key: &'static str,
    pub kind: FeatureKind,
}

impl FeatureSpec {
    pub const fn numerical(name: &'static str, key: &'static str) -> Self {
        Self {
            name,
            key,
            kind: FeatureKind::Numerical,
        }
    }

    pub const fn categorical(
        name: &'static str,
        key: &'static str,
        options: &'static [CategoricalOption],
        column: FormColumn,
    ) -> Self {
        Self {
            name,
            key,
            kind: FeatureKind::Categorical { options, column },
        }
    }

    /// Value used when the form leaves the field untouched
    pub fn default_value(&self) -> f64 {
        match self.kind {
            FeatureKind::Numerical => 0.0,
            FeatureKind::Categorical { options, .. } => {
                options.first().map(|o| o.code as f64).unwrap_or(0.0)
            }
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, FeatureKind::Categorical { .. })
    }

    pub fn options(&self) -> &'static [CategoricalOption] {
        match self.kind {
            FeatureKind::Numerical => &[],
            FeatureKind::Categorical { options, .. } => options,
        }
    }

    /// Human label for a categorical value (None for numerical features)
    pub fn label_for(&self, value: f64) -> Option<&'static str> {
        self.options()
            .iter()
            .find(|o| o.code as f64 == value)
            .map(|o| o.label)
    }
}

// ============================================================================
// FEATURE LAYOUT (Authoritative source)
// ============================================================================

const SEX_OPTIONS: &[CategoricalOption] = &[
    CategoricalOption { code: 0, label: "Female" },
    CategoricalOption { code: 1, label: "Male" },
];

const YES_NO_OPTIONS: &[CategoricalOption] = &[
    CategoricalOption { code: 0, label: "No" },
    CategoricalOption { code: 1, label: "Yes" },
];

/// Features in exact order the model consumes them
pub const MACE_FEATURES: &[FeatureSpec] = &[
    // === Demographics / history (0-4) ===
    FeatureSpec::categorical("Sex", "sex", SEX_OPTIONS, FormColumn::Left),
    FeatureSpec::categorical(
        "Long-standing illness or disability",
        "long_standing_illness",
        YES_NO_OPTIONS,
        FormColumn::Right,
    ),
    FeatureSpec::numerical("Age", "age"),
    FeatureSpec::numerical("Number of non-cancer illnesses", "non_cancer_illnesses"),
    FeatureSpec::numerical("Number of medications taken", "medications_taken"),

    // === Clinical measurements (5-6) ===
    FeatureSpec::numerical("Systolic Blood Pressure", "systolic_blood_pressure"),
    FeatureSpec::numerical("Cholesterol ratio", "cholesterol_ratio"),

    // === Plasma proteomics (7-18) ===
    FeatureSpec::numerical("Plasma GDF15", "plasma_gdf15"),
    FeatureSpec::numerical("Plasma MMP12", "plasma_mmp12"),
    FeatureSpec::numerical("Plasma NTproBNP", "plasma_ntprobnp"),
    FeatureSpec::numerical("Plasma AGER", "plasma_ager"),
    FeatureSpec::numerical("Plasma PRSS8", "plasma_prss8"),
    FeatureSpec::numerical("Plasma PSPN", "plasma_pspn"),
    FeatureSpec::numerical("Plasma WFDC2", "plasma_wfdc2"),
    FeatureSpec::numerical("Plasma LPA", "plasma_lpa"),
    FeatureSpec::numerical("Plasma CXCL17", "plasma_cxcl17"),
    FeatureSpec::numerical("Plasma GAST", "plasma_gast"),
    FeatureSpec::numerical("Plasma RGMA", "plasma_rgma"),
    FeatureSpec::numerical("Plasma EPHA4", "plasma_epha4"),
];

/// Total number of features
/// IMPORTANT: Must match MACE_FEATURES.len()!
pub const FEATURE_COUNT: usize = 19;

/// The process-wide schema used by the form and the bundled model
pub static MACE_SCHEMA: FeatureSchema = FeatureSchema::new(FEATURE_VERSION, MACE_FEATURES);

// ============================================================================
// SCHEMA
// ============================================================================

/// Ordered, versioned list of feature specs
#[derive(Debug, Clone, Copy)]
pub struct FeatureSchema {
    pub version: u8,
    pub specs: &'static [FeatureSpec],
}

impl FeatureSchema {
    pub const fn new(version: u8, specs: &'static [FeatureSpec]) -> Self {
        Self { version, specs }
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.iter().map(|s| s.name)
    }

    /// Get feature index by name (O(n) but features are few)
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.name == name)
    }

    /// Get feature index by form key or display name
    pub fn index_of_key(&self, key: &str) -> Option<usize> {
        self.specs
            .iter()
            .position(|s| s.key == key)
            .or_else(|| self.feature_index(key))
    }

    /// Get feature name by index
    pub fn feature_name(&self, index: usize) -> Option<&'static str> {
        self.specs.get(index).map(|s| s.name)
    }

    /// Column of the form control for feature `index`.
    /// Numerical fields alternate by index, categorical fields are pinned.
    pub fn form_column(&self, index: usize) -> Option<FormColumn> {
        let spec = self.specs.get(index)?;
        Some(match spec.kind {
            FeatureKind::Categorical { column, .. } => column,
            FeatureKind::Numerical if index % 2 == 0 => FormColumn::Left,
            FeatureKind::Numerical => FormColumn::Right,
        })
    }

    /// CRC32 over version and ordered names
    pub fn layout_hash(&self) -> u32 {
        let mut hasher = Hasher::new();

        // Include version in hash
        hasher.update(&[self.version]);

        for spec in self.specs {
            hasher.update(spec.name.as_bytes());
            hasher.update(&[0]); // Separator
        }

        hasher.finalize()
    }

    /// Validate that a vector stamp matches this schema
    pub fn validate_stamp(&self, version: u8, hash: u32) -> RiskResult<()> {
        let expected = self.layout_hash();
        if version != self.version || hash != expected {
            return Err(RiskError::SchemaMismatch(format!(
                "expected layout v{} (hash: {:08x}), got v{} (hash: {:08x})",
                self.version, expected, version, hash
            )));
        }
        Ok(())
    }

    /// Check that an ordered name list is exactly this schema's names
    pub fn validate_names<S: AsRef<str>>(&self, names: &[S]) -> RiskResult<()> {
        if names.len() != self.len() {
            return Err(RiskError::SchemaMismatch(format!(
                "expected {} features, got {}",
                self.len(),
                names.len()
            )));
        }

        for (i, (spec, name)) in self.specs.iter().zip(names).enumerate() {
            if spec.name != name.as_ref() {
                return Err(RiskError::SchemaMismatch(format!(
                    "feature {} should be '{}', got '{}'",
                    i,
                    spec.name,
                    name.as_ref()
                )));
            }
        }

        Ok(())
    }

    pub fn layout_info(&self) -> LayoutInfo {
        LayoutInfo {
            version: self.version,
            hash: self.layout_hash(),
            feature_count: self.len(),
            feature_names: self.names().map(str::to_string).collect(),
        }
    }
}

// ============================================================================
// LAYOUT INFO
// ============================================================================

/// Complete layout information for serialization/logging
#[derive(Debug, Clone, Serialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
}

impl LayoutInfo {
    pub fn current() -> Self {
        MACE_SCHEMA.layout_info()
    }
}

impl Default for LayoutInfo {
    fn default() -> Self {
        Self::current()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_count() {
        assert_eq!(MACE_FEATURES.len(), FEATURE_COUNT);
        assert_eq!(MACE_SCHEMA.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<_> = MACE_FEATURES.iter().map(|s| s.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_layout_hash_consistency() {
        let hash1 = MACE_SCHEMA.layout_hash();
        let hash2 = MACE_SCHEMA.layout_hash();
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, 0);
    }

    #[test]
    fn test_layout_hash_depends_on_order() {
        const SWAPPED: &[FeatureSpec] = &[
            FeatureSpec::numerical("Age", "age"),
            FeatureSpec::categorical("Sex", "sex", SEX_OPTIONS, FormColumn::Left),
        ];
        const ORIGINAL: &[FeatureSpec] = &[
            FeatureSpec::categorical("Sex", "sex", SEX_OPTIONS, FormColumn::Left),
            FeatureSpec::numerical("Age", "age"),
        ];
        let a = FeatureSchema::new(1, ORIGINAL);
        let b = FeatureSchema::new(1, SWAPPED);
        assert_ne!(a.layout_hash(), b.layout_hash());
    }

    #[test]
    fn test_validate_stamp() {
        let hash = MACE_SCHEMA.layout_hash();
        assert!(MACE_SCHEMA.validate_stamp(FEATURE_VERSION, hash).is_ok());
        assert!(MACE_SCHEMA.validate_stamp(FEATURE_VERSION + 1, hash).is_err());
        assert!(matches!(
            MACE_SCHEMA.validate_stamp(FEATURE_VERSION, hash.wrapping_add(1)),
            Err(RiskError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_validate_names() {
        let names: Vec<&str> = MACE_SCHEMA.names().collect();
        assert!(MACE_SCHEMA.validate_names(&names).is_ok());

        let mut swapped = names.clone();
        swapped.swap(0, 2);
        assert!(MACE_SCHEMA.validate_names(&swapped).is_err());
        assert!(MACE_SCHEMA.validate_names(&names[..10]).is_err());
    }

    #[test]
    fn test_feature_index() {
        assert_eq!(MACE_SCHEMA.feature_index("Sex"), Some(0));
        assert_eq!(MACE_SCHEMA.feature_index("Age"), Some(2));
        assert_eq!(MACE_SCHEMA.feature_index("Plasma EPHA4"), Some(18));
        assert_eq!(MACE_SCHEMA.feature_index("nonexistent"), None);
        assert_eq!(MACE_SCHEMA.index_of_key("plasma_ntprobnp"), Some(9));
        assert_eq!(MACE_SCHEMA.index_of_key("Plasma NTproBNP"), Some(9));
    }

    #[test]
    fn test_form_columns() {
        // Categorical fields are pinned
        assert_eq!(MACE_SCHEMA.form_column(0), Some(FormColumn::Left));
        assert_eq!(MACE_SCHEMA.form_column(1), Some(FormColumn::Right));
        // Numerical fields alternate by index
        assert_eq!(MACE_SCHEMA.form_column(2), Some(FormColumn::Left));
        assert_eq!(MACE_SCHEMA.form_column(3), Some(FormColumn::Right));
        assert_eq!(MACE_SCHEMA.form_column(18), Some(FormColumn::Left));
        assert_eq!(MACE_SCHEMA.form_column(19), None);
    }

    #[test]
    fn test_defaults_and_labels() {
        let sex = &MACE_FEATURES[0];
        assert_eq!(sex.default_value(), 0.0);
        assert_eq!(sex.label_for(1.0), Some("Male"));
        assert_eq!(sex.label_for(2.0), None);

        let age = &MACE_FEATURES[2];
        assert_eq!(age.default_value(), 0.0);
        assert_eq!(age.label_for(0.0), None);
    }

    #[test]
    fn test_layout_info() {
        let info = LayoutInfo::current();
        assert_eq!(info.version, FEATURE_VERSION);
        assert_eq!(info.feature_count, FEATURE_COUNT);
        assert_eq!(info.feature_names[1], "Long-standing illness or disability");
    }
}
