//! GLX platform support.
//!
//! Everything here talks to one X server connection per device, owned by
//! the device's [`SharedResource`]. The libGL entry points are dlopened
//! once per process; the per-display state lives behind the shared
//! resource registry.

use std::ffi::{self, CString};
use std::ops::Deref;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use glutin_glx_sys::{glx, glx_extra};
use libloading::Library;
use once_cell::sync::Lazy;
use x11_dl::xlib::{self, Xlib};

use crate::bootstrap::BootstrapThread;
use crate::error::{Error, ErrorKind, Result};
use crate::lock::ToolkitLock;
use crate::registry::SharedRegistry;

pub(crate) mod config;
pub mod context;
pub mod display;
pub(crate) mod resources;
pub mod surface;

use resources::SharedResource;

/// The loaded GLX entry points.
///
/// The generated table holds raw pointers, hence the manual `Sync`.
pub(crate) struct Glx(glx::Glx);

unsafe impl Send for Glx {}
unsafe impl Sync for Glx {}

impl Deref for Glx {
    type Target = glx::Glx;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The loaded extension entry points.
pub(crate) struct GlxExtra(glx_extra::Glx);

unsafe impl Send for GlxExtra {}
unsafe impl Sync for GlxExtra {}

impl Deref for GlxExtra {
    type Target = glx_extra::Glx;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The GLX entry points out of libGL. The library stays loaded for the
/// lifetime of the process.
pub(crate) static GLX: Lazy<Option<Glx>> = Lazy::new(|| {
    let paths = ["libGL.so.1", "libGL.so"];
    let lib = paths.iter().find_map(|path| unsafe { Library::new(path).ok() })?;
    let lib: &'static Library = Box::leak(Box::new(lib));

    let glx = glx::Glx::load_with(|symbol| {
        let symbol = CString::new(symbol.as_bytes()).unwrap();
        unsafe {
            lib.get::<*const ffi::c_void>(symbol.as_bytes_with_nul())
                .map(|symbol| *symbol)
                .unwrap_or(std::ptr::null())
        }
    });

    if glx.QueryVersion.is_loaded() && glx.GetProcAddress.is_loaded() {
        Some(Glx(glx))
    } else {
        None
    }
});

/// The extension entry points, resolved through `glXGetProcAddress`.
pub(crate) static GLX_EXTRA: Lazy<Option<GlxExtra>> = Lazy::new(|| {
    let glx = GLX.as_ref()?;
    Some(GlxExtra(glx_extra::Glx::load_with(|symbol| {
        let symbol = CString::new(symbol.as_bytes()).unwrap();
        unsafe { glx.GetProcAddress(symbol.as_ptr() as *const _) as *const _ }
    })))
});

/// The Xlib entry points used next to GLX.
pub(crate) static XLIB: Lazy<Option<Xlib>> = Lazy::new(|| Xlib::open().ok());

/// First X protocol error code belonging to the GLX extension, stored at
/// display initialization.
pub(crate) static GLX_BASE_ERROR: AtomicI32 = AtomicI32::new(0);

/// One shared resource per X server connection string and screen.
static SHARED_RESOURCES: Lazy<SharedRegistry<DeviceKey, SharedResource>> =
    Lazy::new(SharedRegistry::new);

/// The thread all probe resources are created and destroyed on.
static BOOTSTRAP: Lazy<BootstrapThread> = Lazy::new(|| BootstrapThread::spawn("glx bootstrap"));

/// Identity of one rendering device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DeviceKey {
    /// The X server connection string, as reported by `XDisplayString`.
    pub(crate) connection: String,
    pub(crate) screen: i32,
}

/// The shared resource for `key`, bootstrapping it on the dedicated
/// thread when this is the device's first use.
pub(crate) fn shared_resource(key: &DeviceKey) -> Result<Arc<SharedResource>> {
    SHARED_RESOURCES.get_or_create(key, || {
        let key = key.clone();
        BOOTSTRAP.execute(move || SharedResource::bootstrap(&key))
    })
}

/// Drop the registry's reference for `key`. Idempotent; the native
/// teardown runs once the last display using the device goes away.
pub(crate) fn purge_shared_resource(key: &DeviceKey) {
    SHARED_RESOURCES.remove(key);
}

/// X error captured by the active error trap.
static LAST_X_ERROR: Mutex<Option<Error>> = Mutex::new(None);

unsafe extern "C" fn error_trap_handler(
    _display: *mut xlib::Display,
    event: *mut xlib::XErrorEvent,
) -> ffi::c_int {
    let event = unsafe { &*event };
    let code = event.error_code as i32;

    let base = GLX_BASE_ERROR.load(Ordering::Relaxed);
    let kind = match code - base {
        _ if base == 0 || code < base => ErrorKind::Misc,
        0 => ErrorKind::BadContext,         // GLXBadContext
        2 => ErrorKind::BadSurface,         // GLXBadDrawable
        3 => ErrorKind::BadPixmap,          // GLXBadPixmap
        9 => ErrorKind::BadConfig,          // GLXBadFBConfig
        10 => ErrorKind::BadPbuffer,        // GLXBadPbuffer
        12 => ErrorKind::BadNativeWindow,   // GLXBadWindow
        _ => ErrorKind::Misc,
    };

    let message = format!(
        "X protocol error {} on request {}.{}",
        code, event.request_code, event.minor_code
    );
    *LAST_X_ERROR.lock().unwrap() = Some(Error::new(Some(code as i64), Some(message), kind));

    0
}

/// Run `callback` with an X error trap installed, turning any error the
/// server reports for it into a [`Result`].
///
/// The round trip through `XSync` is what flushes the error out before
/// the previous handler is restored. Runs under the toolkit lock, since
/// the error handler is connection-global state.
pub(crate) fn last_x_error<T>(
    xlib: &Xlib,
    display: *mut xlib::Display,
    callback: impl FnOnce() -> T,
) -> Result<T> {
    let _guard = ToolkitLock::global().lock();
    unsafe {
        *LAST_X_ERROR.lock().unwrap() = None;
        let previous = (xlib.XSetErrorHandler)(Some(error_trap_handler));
        let result = callback();
        (xlib.XSync)(display, xlib::False);
        (xlib.XSetErrorHandler)(previous);

        match LAST_X_ERROR.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(result),
        }
    }
}
