//! Protocol load helpers with schema + invariant validation.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use jsonschema::Validator;
use serde_json::Value;

use crate::core::invariants::validate_invariants;
use crate::protocol::TaskSpec;

pub const PROTOCOL_SCHEMA: &str = include_str!("../../schemas/protocol/v1.schema.json");

static VALIDATOR: LazyLock<std::result::Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(PROTOCOL_SCHEMA).map_err(|err| err.to_string())?;
    jsonschema::validator_for(&schema).map_err(|err| err.to_string())
});

/// Load and validate a protocol document from disk (schema + invariants).
pub fn load_protocol(path: &Path) -> Result<TaskSpec> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read protocol {}", path.display()))?;
    parse_protocol(&contents).with_context(|| format!("load protocol {}", path.display()))
}

/// Validate and deserialize a protocol document.
pub fn parse_protocol(contents: &str) -> Result<TaskSpec> {
    let value: Value = serde_json::from_str(contents).context("parse protocol json")?;
    validate_schema(&value)?;
    let spec: TaskSpec = serde_json::from_value(value).context("deserialize protocol")?;
    validate_protocol_invariants(&spec)?;
    Ok(spec)
}

fn validate_schema(document: &Value) -> Result<()> {
    let validator = VALIDATOR
        .as_ref()
        .map_err(|err| anyhow!("invalid bundled schema: {err}"))?;
    if !validator.is_valid(document) {
        let messages = validator
            .iter_errors(document)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "protocol schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn validate_protocol_invariants(spec: &TaskSpec) -> Result<()> {
    let errors = validate_invariants(spec);
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("protocol invariants failed: {}", errors.join("; ")))
}
