//! FFI interface for C/C++ hosts
//!
//! Bodies are passed as raw bytes, specs and results as JSON strings. The
//! filter registry is built once on first use and shared by every call.

use std::ffi::{c_char, CStr, CString};
use std::ptr;
use std::sync::LazyLock;

use crate::error::RegistryError;
use crate::extractors::{Evaluator, PageKind};
use crate::filters::FilterRegistry;
use crate::spec::SpecNode;

static REGISTRY: LazyLock<Result<FilterRegistry, RegistryError>> = LazyLock::new(FilterRegistry::builtin);

/// Result struct returned to the host
/// Both pointers are owned by Rust and must be freed via free_pipe_result
#[repr(C)]
pub struct PipeResultFFI {
    /// JSON-serialized value (null-terminated), or null on failure
    pub json_ptr: *mut c_char,
    /// Error message (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

/// Evaluate a spec against one document body.
///
/// # Arguments
/// * `body_ptr` - Pointer to the body bytes (not necessarily null-terminated)
/// * `body_len` - Length of the body in bytes
/// * `page_kind` - `html`, `json` or `text` (null-terminated)
/// * `spec_json` - JSON-serialized spec tree (null-terminated)
///
/// # Safety
/// - `body_ptr` must point to valid memory of at least `body_len` bytes
/// - `page_kind` and `spec_json` must be valid null-terminated C strings
/// - Caller must free the result via `free_pipe_result`
#[no_mangle]
pub unsafe extern "C" fn pipe_bytes_ffi(
    body_ptr: *const c_char,
    body_len: usize,
    page_kind: *const c_char,
    spec_json: *const c_char,
) -> PipeResultFFI {
    let body: &[u8] = if body_ptr.is_null() || body_len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(body_ptr as *const u8, body_len)
    };

    let kind = match c_str(page_kind, "page kind") {
        Ok(s) => s,
        Err(msg) => return make_error_result(&msg),
    };
    let kind: PageKind = match kind.parse() {
        Ok(k) => k,
        Err(e) => return make_error_result(&e.to_string()),
    };

    let spec = match c_str(spec_json, "spec JSON").and_then(|s| SpecNode::from_json_str(s).map_err(|e| e.to_string())) {
        Ok(spec) => spec,
        Err(msg) => return make_error_result(&msg),
    };

    let registry = match REGISTRY.as_ref() {
        Ok(r) => r,
        Err(e) => return make_error_result(&format!("filter registry unavailable: {}", e)),
    };

    match Evaluator::new(registry).pipe_bytes(&spec, body, kind) {
        Ok(value) => make_json_result(&value.to_json()),
        Err(e) => {
            tracing::debug!(error = %e, "pipe failed");
            make_error_result(&e.to_string())
        }
    }
}

/// List the built-in filters as a JSON array of `{name, description, usage}`
#[no_mangle]
pub extern "C" fn list_filters_ffi() -> PipeResultFFI {
    match REGISTRY.as_ref() {
        Ok(registry) => match serde_json::to_value(registry.describe()) {
            Ok(json) => make_json_result(&json),
            Err(e) => make_error_result(&format!("Failed to serialize filters: {}", e)),
        },
        Err(e) => make_error_result(&format!("filter registry unavailable: {}", e)),
    }
}

/// Free a PipeResultFFI
///
/// # Safety
/// - `result` must have been returned by a function of this module
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn free_pipe_result(result: PipeResultFFI) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

unsafe fn c_str<'a>(raw: *const c_char, what: &str) -> Result<&'a str, String> {
    if raw.is_null() {
        return Err(format!("{} is null", what));
    }
    CStr::from_ptr(raw)
        .to_str()
        .map_err(|_| format!("Invalid UTF-8 in {}", what))
}

fn make_json_result(json: &serde_json::Value) -> PipeResultFFI {
    match CString::new(json.to_string()) {
        Ok(cstr) => PipeResultFFI {
            json_ptr: cstr.into_raw(),
            error_ptr: ptr::null_mut(),
        },
        Err(_) => make_error_result("Result JSON contains null bytes"),
    }
}

fn make_error_result(msg: &str) -> PipeResultFFI {
    let error = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    PipeResultFFI {
        json_ptr: ptr::null_mut(),
        error_ptr: error.into_raw(),
    }
}
