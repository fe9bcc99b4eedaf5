use std::collections::HashSet;
use std::path::{Path, PathBuf};

use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::product::SeedProduct;

/// Sample dataset written by the seed routine unless another one is configured.
const BUILTIN_V1: &str = include_str!("../fixtures/products.v1.yaml");

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse dataset YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Failed to decode dataset: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Dataset schema could not be compiled: {0}")]
    Schema(String),
    #[error("Dataset is malformed: {0}")]
    Malformed(String),
    #[error("Dataset entry {index} is invalid: {reason}")]
    InvalidEntry { index: usize, reason: String },
    #[error("Duplicate productId in dataset: {0}")]
    Duplicate(String),
}

/// A versioned list of products to seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub version: String,
    pub products: Vec<SeedProduct>,
    /// BLAKE3 hex digest of the dataset's JSON encoding, so formatting and
    /// comments in the source YAML do not affect it.
    #[serde(skip)]
    pub fingerprint: String,
}

impl Dataset {
    pub fn builtin() -> Result<Self, FixtureError> {
        Self::from_yaml(BUILTIN_V1)
    }

    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, FixtureError> {
        let document: Value = serde_yaml::from_str(raw)?;
        validate(&document)?;
        let dataset: Dataset = serde_json::from_value(document)?;
        dataset.fingerprinted()
    }

    /// Builds a dataset in code, fingerprinted over its JSON encoding.
    pub fn new(version: &str, products: Vec<SeedProduct>) -> Result<Self, FixtureError> {
        let mut dataset = Dataset {
            version: version.to_string(),
            products,
            fingerprint: String::new(),
        };
        validate(&serde_json::to_value(&dataset)?)?;
        dataset.fingerprinted()
    }

    fn fingerprinted(mut self) -> Result<Self, FixtureError> {
        self.fingerprint = digest(&serde_json::to_vec(&self)?);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.products.iter().map(|p| p.product_id.as_str())
    }
}

fn digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn envelope_schema() -> Value {
    json!({
        "type": "object",
        "required": ["version", "products"],
        "properties": {
            "version": { "type": "string", "minLength": 1 },
            "products": { "type": "array" }
        }
    })
}

// Presence only; specifications stay free-form.
fn entry_schema() -> Value {
    json!({
        "type": "object",
        "required": ["productId", "productName", "category", "brand", "specifications"],
        "properties": {
            "productId": { "type": "string", "minLength": 1 },
            "productName": { "type": "string" },
            "category": { "type": "string" },
            "brand": { "type": "string" },
            "specifications": { "type": "object" }
        }
    })
}

fn compile(schema: &Value) -> Result<Validator, FixtureError> {
    jsonschema::validator_for(schema).map_err(|e| FixtureError::Schema(e.to_string()))
}

fn describe(validator: &Validator, instance: &Value) -> Option<String> {
    let problems: Vec<String> = validator.iter_errors(instance).map(|e| e.to_string()).collect();
    if problems.is_empty() {
        None
    } else {
        Some(problems.join("; "))
    }
}

fn validate(document: &Value) -> Result<(), FixtureError> {
    let envelope = compile(&envelope_schema())?;
    if let Some(reason) = describe(&envelope, document) {
        return Err(FixtureError::Malformed(reason));
    }

    let entry = compile(&entry_schema())?;
    let mut seen = HashSet::new();
    let products = document["products"].as_array().into_iter().flatten();
    for (index, product) in products.enumerate() {
        if let Some(reason) = describe(&entry, product) {
            return Err(FixtureError::InvalidEntry { index, reason });
        }
        let id = product["productId"].as_str().unwrap_or_default();
        if !seen.insert(id.to_string()) {
            return Err(FixtureError::Duplicate(id.to_string()));
        }
    }
    Ok(())
}
