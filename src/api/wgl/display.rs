//! WGL object creation.

use std::ffi::{self, CStr};
use std::fmt;
use std::io::Error as IoError;
use std::sync::Arc;

use glutin_wgl_sys::wgl;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use windows_sys::Win32::Foundation::HWND;
use windows_sys::Win32::Graphics::Gdi::{GetDC, ReleaseDC};
use windows_sys::Win32::System::LibraryLoader as dll_loader;

use crate::config::{GraphicsConfiguration, Resolved};
use crate::context::{negotiate, ContextAttributes, Negotiated};
use crate::display::{DisplayFeatures, GlDisplay};
use crate::error::{ErrorKind, Result};
use crate::private::Sealed;
use crate::surface::{PbufferSurface, WindowSurface};

use super::config::HdcDevice;
use super::context::{ContextInner, NativeOps, NotCurrentContext, PossiblyCurrentContext};
use super::resources::{HiddenWindow, SharedResource};
use super::surface::{self, Surface};
use super::{purge_shared_resource, shared_resource};

/// A wrapper around the WGL state of the process.
#[derive(Clone)]
pub struct Display {
    pub(crate) inner: Arc<DisplayInner>,
}

pub(crate) struct DisplayInner {
    pub(crate) shared: Arc<SharedResource>,
}

impl Display {
    /// Create a WGL display.
    ///
    /// The driver is bootstrapped through a hidden probe window on first
    /// use and its outcome shared with every other display of the
    /// process.
    ///
    /// # Safety
    ///
    /// The `display` handle must be a Windows display handle.
    pub(crate) unsafe fn new(display: RawDisplayHandle) -> Result<Self> {
        if !matches!(display, RawDisplayHandle::Windows(..)) {
            return Err(ErrorKind::NotSupported("provided native display isn't Windows").into());
        }

        let shared = shared_resource()?;
        Ok(Self { inner: Arc::new(DisplayInner { shared }) })
    }

    fn window_hwnd(window: RawWindowHandle) -> Result<HWND> {
        match window {
            RawWindowHandle::Win32(window_handle) => Ok(window_handle.hwnd.get() as HWND),
            _ => {
                Err(ErrorKind::NotSupported("provided native window is not supported").into())
            },
        }
    }
}

impl GlDisplay for Display {
    type NotCurrentContext = NotCurrentContext;
    type PbufferSurface = Surface<PbufferSurface>;
    type PossiblyCurrentContext = PossiblyCurrentContext;
    type WindowSurface = Surface<WindowSurface>;

    fn features(&self) -> DisplayFeatures {
        self.inner.shared.features()
    }

    fn version_string(&self) -> String {
        self.inner.shared.version_string()
    }

    fn supports_extension(&self, extension: &str) -> bool {
        self.inner.shared.supports_extension(extension)
    }

    fn resolve_early(&self, _config: &GraphicsConfiguration) -> Result<Resolved> {
        // On Win32 the pixel format belongs to a window's device
        // context, so nothing can be picked before a window exists.
        Err(ErrorKind::NotSupported("wgl resolves pixel formats against an existing window")
            .into())
    }

    fn resolve_late(
        &self,
        config: &GraphicsConfiguration,
        window: RawWindowHandle,
    ) -> Result<Resolved> {
        let hwnd = Self::window_hwnd(window)?;
        let hdc = unsafe { GetDC(hwnd) };
        if hdc == 0 {
            return Err(IoError::last_os_error().into());
        }

        // A configuration resolved against another window reuses its
        // outcome, but this window's device context still has to receive
        // the format before anything renders against it.
        let device = HdcDevice::new(&self.inner.shared, hdc);
        let resolved = config.apply_to(&device);
        unsafe { ReleaseDC(hwnd, hdc) };

        resolved
    }

    fn create_window_surface(
        &self,
        config: &GraphicsConfiguration,
        window: RawWindowHandle,
    ) -> Result<Surface<WindowSurface>> {
        self.resolve_late(config, window)?;
        surface::create_window_surface(self.inner.shared.clone(), window)
    }

    fn create_pbuffer_surface(
        &self,
        _config: &GraphicsConfiguration,
        _width: u32,
        _height: u32,
    ) -> Result<Surface<PbufferSurface>> {
        Err(ErrorKind::NotSupported("pbuffers aren't supported with wgl").into())
    }

    fn create_context(
        &self,
        config: &GraphicsConfiguration,
        attributes: &ContextAttributes,
        share: Option<&PossiblyCurrentContext>,
    ) -> Result<NotCurrentContext> {
        // WGL contexts belong to a pixel format rather than a window, so
        // the negotiation runs against a hidden window carrying the
        // configuration's format. The context can later be made current
        // on any surface of that format.
        let window = HiddenWindow::new()?;
        let device = HdcDevice::new(&self.inner.shared, window.hdc);
        config.apply_to(&device)?;

        let ops = NativeOps::new(&self.inner.shared, window.hdc);
        let share = share.map(|share| Negotiated::from_parts(share.raw(), share.is_modern()));

        let negotiated = negotiate(&ops, attributes, share.as_ref())?;
        let raw = *negotiated.raw().ok_or(ErrorKind::BadContext)?;
        let modern = negotiated.is_modern();

        let inner = ContextInner {
            shared: self.inner.shared.clone(),
            window: Some(window),
            raw,
            modern,
        };
        Ok(NotCurrentContext::new(inner))
    }

    fn get_proc_address(&self, addr: &CStr) -> *const ffi::c_void {
        unsafe {
            let addr = addr.as_ptr();
            let fn_ptr = wgl::GetProcAddress(addr);
            if !fn_ptr.is_null() {
                fn_ptr.cast()
            } else {
                dll_loader::GetProcAddress(self.inner.shared.lib_opengl32, addr.cast())
                    .map_or(std::ptr::null(), |fn_ptr| fn_ptr as *const _)
            }
        }
    }

    fn purge_shared_resources(&self) {
        purge_shared_resource();
    }
}

impl Sealed for Display {}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display").field("features", &self.inner.shared.features()).finish()
    }
}
