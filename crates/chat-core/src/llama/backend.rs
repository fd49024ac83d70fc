//! Process-wide llama.cpp backend setup.

use std::ffi::CStr;
use std::sync::Once;

use tracing::info;

static BACKEND_INIT: Once = Once::new();

/// Initialize the llama.cpp backend and route its logs into `tracing`.
/// Later calls are no-ops. The backend lives until process exit.
pub(crate) fn init() {
    BACKEND_INIT.call_once(|| {
        unsafe {
            llama_sys::llama_backend_init();
            llama_sys::llama_log_set(Some(log_bridge), std::ptr::null_mut());
        }
        info!("llama.cpp backend initialized");
    });
}

unsafe extern "C" fn log_bridge(
    level: llama_sys::ggml_log_level,
    text: *const std::ffi::c_char,
    _user_data: *mut std::ffi::c_void,
) {
    if text.is_null() {
        return;
    }
    let msg = unsafe { CStr::from_ptr(text) }.to_string_lossy();
    let msg = msg.trim();
    if msg.is_empty() {
        return;
    }
    // ggml_log_level: DEBUG=1, INFO=2, WARN=3, ERROR=4
    match level {
        4 => tracing::error!(target: "llama.cpp", "{msg}"),
        3 => tracing::warn!(target: "llama.cpp", "{msg}"),
        // Load-time chatter is noisy at info.
        _ => tracing::debug!(target: "llama.cpp", "{msg}"),
    }
}

pub fn system_info() -> String {
    init();
    unsafe {
        CStr::from_ptr(llama_sys::llama_print_system_info())
            .to_string_lossy()
            .into_owned()
    }
}
