//! Translation from [`KernelError`] to the wire's JSON-RPC error codes.

use crate::error::KernelError;

use super::types::JsonRpcError;

/// Every kernel error already carries a `json_rpc_code`; this wraps that
/// mapping into the full `{code, message}` shape the wire expects.
#[must_use]
pub fn to_json_rpc_error(err: &KernelError) -> JsonRpcError {
    JsonRpcError::new(err.json_rpc_code(), err.to_string())
}
