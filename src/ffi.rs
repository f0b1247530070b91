//! FFI bindings for Conversion Flux
//!
//! This module provides C-compatible functions for embedding the tracker in a
//! browser shell, webview or wasm host. Pages, signals and configs cross the
//! boundary as JSON. Queued deliveries are pulled with
//! `ciq_tracker_drain_outbox`; returned strings must be freed with
//! `ciq_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::TrackerConfig;
use crate::delivery::OutboxTransport;
use crate::engine::Tracker;
use crate::page::PageSnapshot;
use crate::signal::Signal;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn timestamp(now_ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(now_ms).single()
}

// ============================================================================
// Tracker API
// ============================================================================

/// Opaque handle to a tracker, the page it observes and its outbox
pub struct TrackerHandle {
    tracker: Tracker,
    page: PageSnapshot,
    outbox: OutboxTransport,
}

/// Create a tracker from a JSON config.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Must be freed with `ciq_tracker_free`.
/// - Returns NULL on error (including a missing API key); call
///   `ciq_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ciq_tracker_new(config_json: *const c_char) -> *mut TrackerHandle {
    clear_last_error();

    let json_str = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    let config = match TrackerConfig::from_json(&json_str) {
        Ok(config) => config,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let outbox = OutboxTransport::new();
    match Tracker::new(config, Box::new(outbox.clone())) {
        Ok(tracker) => Box::into_raw(Box::new(TrackerHandle {
            tracker,
            page: PageSnapshot::default(),
            outbox,
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a tracker.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ciq_tracker_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ciq_tracker_free(handle: *mut TrackerHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Replace the page snapshot the tracker queries.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ciq_tracker_new`.
/// - `page_json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn ciq_tracker_set_page(
    handle: *mut TrackerHandle,
    page_json: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }
    let handle = &mut *handle;

    let json_str = match cstr_to_string(page_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid page string pointer");
            return -1;
        }
    };

    match serde_json::from_str::<PageSnapshot>(&json_str) {
        Ok(page) => {
            handle.page = page;
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Dispatch one JSON-encoded signal at `now_ms` (Unix milliseconds).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ciq_tracker_new`.
/// - `signal_json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn ciq_tracker_handle(
    handle: *mut TrackerHandle,
    signal_json: *const c_char,
    now_ms: i64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }
    let handle = &mut *handle;

    let json_str = match cstr_to_string(signal_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid signal string pointer");
            return -1;
        }
    };

    let signal = match Signal::from_json(&json_str) {
        Ok(signal) => signal,
        Err(e) => {
            set_last_error(&e.to_string());
            return -1;
        }
    };

    let Some(now) = timestamp(now_ms) else {
        set_last_error("Invalid timestamp");
        return -1;
    };

    handle.tracker.handle(signal, &handle.page, now);
    0
}

/// Run every timer due at or before `now_ms`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ciq_tracker_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn ciq_tracker_advance(handle: *mut TrackerHandle, now_ms: i64) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }
    let handle = &mut *handle;

    let Some(now) = timestamp(now_ms) else {
        set_last_error("Invalid timestamp");
        return -1;
    };

    handle.tracker.advance(&handle.page, now);
    0
}

/// Take every queued delivery as a JSON array.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ciq_tracker_new`.
/// - Returns a newly allocated string that must be freed with `ciq_free_string`.
/// - Returns NULL on error; call `ciq_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ciq_tracker_drain_outbox(handle: *mut TrackerHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &*handle;

    match serde_json::to_string(&handle.outbox.drain()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a `ciq_` function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a `ciq_` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ciq_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `ciq_` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn ciq_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn ciq_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    const T: i64 = 1_705_327_200_000;

    fn config() -> CString {
        CString::new(r#"{"api_key": "key-123", "site_domain": "shop.test"}"#).unwrap()
    }

    unsafe fn drain(handle: *mut TrackerHandle) -> Vec<serde_json::Value> {
        let raw = ciq_tracker_drain_outbox(handle);
        assert!(!raw.is_null());
        let json = CStr::from_ptr(raw).to_str().unwrap().to_string();
        ciq_free_string(raw);
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_ffi_tracker_lifecycle() {
        unsafe {
            let handle = ciq_tracker_new(config().as_ptr());
            assert!(!handle.is_null());

            let page = CString::new(r#"{"path": "/checkout", "title": "Checkout"}"#).unwrap();
            assert_eq!(ciq_tracker_set_page(handle, page.as_ptr()), 0);

            let load = CString::new(r#"{"type": "load"}"#).unwrap();
            assert_eq!(ciq_tracker_handle(handle, load.as_ptr(), T), 0);

            let queued = drain(handle);
            assert_eq!(queued.len(), 2);
            assert_eq!(queued[0]["kind"], "post");
            let body: serde_json::Value =
                serde_json::from_str(queued[0]["body"].as_str().unwrap()).unwrap();
            assert_eq!(body["eventType"], "checkout_activate");

            let thanks = CString::new(r#"{"path": "/thank-you"}"#).unwrap();
            assert_eq!(ciq_tracker_set_page(handle, thanks.as_ptr()), 0);
            assert_eq!(ciq_tracker_advance(handle, T + 500), 0);

            let queued = drain(handle);
            assert_eq!(queued.len(), 1);
            assert!(drain(handle).is_empty());

            ciq_tracker_free(handle);
        }
    }

    #[test]
    fn test_ffi_missing_api_key() {
        unsafe {
            let empty = CString::new("{}").unwrap();
            let handle = ciq_tracker_new(empty.as_ptr());
            assert!(handle.is_null());

            let error = CStr::from_ptr(ciq_last_error()).to_str().unwrap();
            assert!(error.contains("API key"));
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let handle = ciq_tracker_new(config().as_ptr());

            let bogus = CString::new(r#"{"type": "resize"}"#).unwrap();
            assert_ne!(ciq_tracker_handle(handle, bogus.as_ptr(), T), 0);
            let error = ciq_last_error();
            assert!(!error.is_null());
            assert!(!CStr::from_ptr(error).to_str().unwrap().is_empty());

            assert_ne!(ciq_tracker_handle(ptr::null_mut(), bogus.as_ptr(), T), 0);
            assert_ne!(ciq_tracker_advance(handle, i64::MAX), 0);

            ciq_tracker_free(handle);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = ciq_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
