//! # Domain Services
//!
//! Pure functions for key resolution and value encoding.
//! Deterministic, no I/O.

use crate::domain::entities::{CONTRACT_CODE_KEY, RESERVED_KEY_PREFIX};
use crate::domain::invariants::limits;
use crate::domain::value_objects::{Namespace, NamespacedKey, Value};
use crate::errors::ContractError;

// =============================================================================
// KEY RESOLUTION
// =============================================================================

/// Resolves a script-supplied key against the executing contract's namespace.
///
/// Keys are relative to `own`. A key whose text before `/` is `own` is
/// qualified and accepted. A key qualified with any other contract id, or
/// naming a host-reserved key, is a namespace violation. Every other
/// malformed key is a script error.
pub fn resolve_script_key(
    own: &Namespace,
    raw: &str,
    max_len: usize,
) -> Result<NamespacedKey, ContractError> {
    let relative = match raw.split_once(Namespace::SEPARATOR) {
        Some((ns, rest)) if ns == own.as_str() => rest,
        Some((ns, _)) if is_contract_namespace(ns) => {
            return Err(ContractError::NamespaceViolation {
                namespace: own.clone(),
                key: raw.to_string(),
            });
        }
        Some(_) => {
            return Err(ContractError::script(format!(
                "invalid state key {raw:?}: `{}` is reserved for contract ids",
                Namespace::SEPARATOR
            )));
        }
        None => raw,
    };

    if relative.starts_with(RESERVED_KEY_PREFIX) {
        return Err(ContractError::NamespaceViolation {
            namespace: own.clone(),
            key: raw.to_string(),
        });
    }
    if relative.is_empty() {
        return Err(ContractError::script("state key must not be empty"));
    }
    if relative.len() > max_len {
        return Err(ContractError::script(format!(
            "state key too long: {} bytes, max is {max_len}",
            relative.len()
        )));
    }

    Ok(own.key(relative))
}

/// True if `ns` has the form of a contract namespace: 64 lowercase hex digits.
fn is_contract_namespace(ns: &str) -> bool {
    ns.len() == 64 && ns.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Location of the deployed code record for a contract namespace.
#[must_use]
pub fn code_record_key(namespace: &Namespace) -> NamespacedKey {
    namespace.key(CONTRACT_CODE_KEY)
}

// =============================================================================
// VALUE ENCODING
// =============================================================================

/// Rejects values nested deeper than [`limits::MAX_VALUE_DEPTH`].
pub fn check_value_depth(value: &Value, context: &str) -> Result<(), ContractError> {
    let depth = value.depth();
    if depth > limits::MAX_VALUE_DEPTH {
        return Err(ContractError::script(format!(
            "{context}: value nested {depth} levels deep, max is {}",
            limits::MAX_VALUE_DEPTH
        )));
    }
    Ok(())
}

/// Encodes a value for storage as canonical JSON, enforcing the size and
/// depth limits. Anything this accepts decodes back to the same value.
pub fn encode_state_value(value: &Value, max_size: usize) -> Result<Vec<u8>, ContractError> {
    check_value_depth(value, "state value")?;
    let bytes = value.to_canonical_json().into_bytes();
    if bytes.len() > max_size {
        return Err(ContractError::script(format!(
            "state value too large: {} bytes, max is {max_size}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Decodes a stored value.
pub fn decode_state_value(key: &NamespacedKey, bytes: &[u8]) -> Result<Value, ContractError> {
    let text = std::str::from_utf8(bytes).map_err(|e| corrupted(key, &e))?;
    Value::from_json(text).map_err(|e| corrupted(key, &e))
}

fn corrupted(key: &NamespacedKey, reason: &dyn std::fmt::Display) -> ContractError {
    crate::errors::StateError::Corrupted {
        key: key.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
