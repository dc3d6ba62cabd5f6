//! Patch synthesis.
//!
//! Mutation rules emit `add` operations in rule order. The synthesizer checks
//! that the list applies cleanly to the submitted document and wraps it into
//! one JSON Patch.

use json_patch::{AddOperation, Patch, PatchOperation};
use serde_json::Value;

use crate::error::{Error, Result};

use super::address::Address;

/// `add` operation at `address`
pub fn add(address: &Address, value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation {
        path: address.pointer(),
        value,
    })
}

/// Combine rule output into a single patch.
///
/// Returns `None` when there is nothing to change. The operations are applied
/// to a copy of `source`; an operation whose parent does not exist (or any
/// other apply failure) is reported as [`Error::PatchConflict`].
pub fn synthesize(source: &Value, ops: Vec<PatchOperation>) -> Result<Option<Patch>> {
    if ops.is_empty() {
        return Ok(None);
    }

    let mut scratch = source.clone();
    json_patch::patch(&mut scratch, &ops).map_err(|e| Error::PatchConflict(e.to_string()))?;

    Ok(Some(Patch(ops)))
}
