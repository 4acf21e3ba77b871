use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;
use crate::host::{Caller, RequestContext, StaticRegistry};
use crate::render::ShortcodeAttrs;
use crate::sanitize::sanitize;
use crate::store::FileStore;
use crate::{ItemId, NoteService};

/// Result type for FFI functions
#[repr(C)]
pub struct FfiResult {
    success: bool,
    error_message: *mut c_char,
}

impl FfiResult {
    fn success() -> Self {
        FfiResult {
            success: true,
            error_message: ptr::null_mut(),
        }
    }

    fn error(msg: &str) -> Self {
        let error_message = CString::new(msg.replace('\0', "")).unwrap_or_default();
        FfiResult {
            success: false,
            error_message: error_message.into_raw(),
        }
    }
}

fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c_str) => c_str.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

unsafe fn from_c_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}

/// Frees a string allocated by Rust
#[no_mangle]
pub extern "C" fn postnotes_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    unsafe {
        let _ = CString::from_raw(s);
    }
}

/// Opens a service backed by the JSON store at `store_path`
#[no_mangle]
pub extern "C" fn postnotes_service_new(
    store_path: *const c_char,
    secret: *const c_char,
) -> *mut NoteService {
    let (path, secret) = unsafe {
        match (from_c_str(store_path), from_c_str(secret)) {
            (Some(path), Some(secret)) if !secret.is_empty() => (path, secret),
            _ => return ptr::null_mut(),
        }
    };

    match FileStore::open(path) {
        Ok(store) => {
            let service = NoteService::new(
                Arc::new(store),
                Arc::new(StaticRegistry::default()),
                secret.as_bytes(),
            );
            Box::into_raw(Box::new(service))
        }
        Err(e) => {
            tracing::error!("Failed to open note store: {}", e);
            ptr::null_mut()
        }
    }
}

/// Frees a service
#[no_mangle]
pub extern "C" fn postnotes_service_free(service: *mut NoteService) {
    if service.is_null() {
        return;
    }
    unsafe {
        let _ = Box::from_raw(service);
    }
}

/// Sanitizes text; the caller frees the result
#[no_mangle]
pub extern "C" fn postnotes_sanitize(raw: *const c_char) -> *mut c_char {
    match unsafe { from_c_str(raw) } {
        Some(raw) => to_c_string(sanitize(raw)),
        None => ptr::null_mut(),
    }
}

/// Gets the note text of an item
#[no_mangle]
pub extern "C" fn postnotes_get_note(service: *const NoteService, item_id: u64) -> *mut c_char {
    if service.is_null() {
        return ptr::null_mut();
    }
    let service = unsafe { &*service };

    let item_id = match ItemId::new(item_id) {
        Ok(id) => id,
        Err(_) => return ptr::null_mut(),
    };

    match service.repository().get(item_id) {
        Ok(note) => to_c_string(note),
        Err(_) => ptr::null_mut(),
    }
}

/// Renders the note column cell of an item
#[no_mangle]
pub extern "C" fn postnotes_render_column(service: *const NoteService, item_id: u64) -> *mut c_char {
    if service.is_null() {
        return ptr::null_mut();
    }
    let service = unsafe { &*service };

    let item_id = match ItemId::new(item_id) {
        Ok(id) => id,
        Err(_) => return ptr::null_mut(),
    };

    match service.render_column(item_id) {
        Ok(html) => to_c_string(html),
        Err(_) => ptr::null_mut(),
    }
}

/// Renders a shortcode. `attributes` may be null; `current_item` is 0 when
/// no item is being displayed.
#[no_mangle]
pub extern "C" fn postnotes_render_shortcode(
    service: *const NoteService,
    attributes: *const c_char,
    current_item: u64,
) -> *mut c_char {
    if service.is_null() {
        return ptr::null_mut();
    }
    let service = unsafe { &*service };

    let attrs = unsafe { from_c_str(attributes) }
        .map(ShortcodeAttrs::parse)
        .unwrap_or_default();
    let mut ctx = RequestContext::new(Caller::anonymous(""));
    ctx.current_item = ItemId::new(current_item).ok();

    match service.render_shortcode(&ctx, &attrs) {
        Ok(html) => to_c_string(html),
        Err(_) => ptr::null_mut(),
    }
}

/// Installs default settings if none exist
#[no_mangle]
pub extern "C" fn postnotes_activate(service: *const NoteService) -> FfiResult {
    if service.is_null() {
        return FfiResult::error("Invalid service");
    }
    let service = unsafe { &*service };

    match service.config().activate() {
        Ok(_) => FfiResult::success(),
        Err(e) => FfiResult::error(&e.to_string()),
    }
}

/// Removes the persisted settings
#[no_mangle]
pub extern "C" fn postnotes_uninstall(service: *const NoteService) -> FfiResult {
    if service.is_null() {
        return FfiResult::error("Invalid service");
    }
    let service = unsafe { &*service };

    match service.config().uninstall() {
        Ok(_) => FfiResult::success(),
        Err(e) => FfiResult::error(&e.to_string()),
    }
}
