//! WGL context handling.

use std::ffi::c_int;
use std::fmt;
use std::io::Error as IoError;
use std::marker::PhantomData;
use std::sync::Arc;

use glutin_wgl_sys::{wgl, wgl_extra};
use windows_sys::Win32::Graphics::Gdi::HDC;

use crate::context::{ContextOps, GlProfile, ModernRequest};
use crate::display::DisplayFeatures;
use crate::error::{ErrorKind, Result};
use crate::surface::SurfaceTypeTrait;

use super::resources::{HiddenWindow, SharedResource};
use super::surface::Surface;
use super::HGLRC;

/// Raw WGL context which is valid to pass between threads while not
/// current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WglContext(pub(crate) HGLRC);

unsafe impl Send for WglContext {}

/// The native operations context negotiation runs against one device
/// context whose pixel format is already applied.
pub(crate) struct NativeOps<'a> {
    shared: &'a SharedResource,
    hdc: HDC,
}

impl<'a> NativeOps<'a> {
    pub(crate) fn new(shared: &'a SharedResource, hdc: HDC) -> Self {
        Self { shared, hdc }
    }
}

impl ContextOps for NativeOps<'_> {
    type Raw = WglContext;

    fn create_legacy(&self, share: Option<&WglContext>) -> Result<WglContext> {
        unsafe {
            let raw = wgl::CreateContext(self.hdc as *const _);
            if raw.is_null() {
                return Err(IoError::last_os_error().into());
            }

            // A context that silently doesn't share corrupts every
            // consumer of the shared objects, so this error is final.
            if let Some(share) = share {
                if wgl::ShareLists(share.0, raw) == 0 {
                    let err = IoError::last_os_error();
                    wgl::DeleteContext(raw);
                    return Err(err.into());
                }
            }

            Ok(WglContext(raw))
        }
    }

    fn make_current_probe(&self, context: &WglContext) -> Result<()> {
        unsafe {
            if wgl::MakeCurrent(self.hdc as *const _, context.0) == 0 {
                return Err(IoError::last_os_error().into());
            }
        }
        Ok(())
    }

    fn has_arb_create(&self) -> bool {
        self.shared.features().contains(DisplayFeatures::CONTEXT_CREATION_ARB)
    }

    fn create_arb(&self, request: &ModernRequest, share: Option<&WglContext>) -> Result<WglContext> {
        let extra = self
            .shared
            .wgl_extra
            .ok_or(ErrorKind::NotSupported("the context creation extension is missing"))?;

        let mut attrs = Vec::<c_int>::with_capacity(9);

        if let Some(version) = request.version {
            attrs.push(wgl_extra::CONTEXT_MAJOR_VERSION_ARB as c_int);
            attrs.push(version.major as c_int);
            attrs.push(wgl_extra::CONTEXT_MINOR_VERSION_ARB as c_int);
            attrs.push(version.minor as c_int);
        }

        if self.shared.supports_extension("WGL_ARB_create_context_profile") {
            let profile = match request.profile {
                GlProfile::Core => wgl_extra::CONTEXT_CORE_PROFILE_BIT_ARB,
                GlProfile::Compatibility => wgl_extra::CONTEXT_COMPATIBILITY_PROFILE_BIT_ARB,
            };
            attrs.push(wgl_extra::CONTEXT_PROFILE_MASK_ARB as c_int);
            attrs.push(profile as c_int);
        }

        // Flags only exist for 3.0 and up; an unpinned version means the
        // driver's newest, which is always recent enough for them.
        let flaggable = request.version.map_or(true, |version| version.major >= 3);
        if flaggable {
            let mut flags = 0;
            if request.debug {
                flags |= wgl_extra::CONTEXT_DEBUG_BIT_ARB as c_int;
            }
            if request.forward_compatible {
                flags |= wgl_extra::CONTEXT_FORWARD_COMPATIBLE_BIT_ARB as c_int;
            }
            if flags != 0 {
                attrs.push(wgl_extra::CONTEXT_FLAGS_ARB as c_int);
                attrs.push(flags);
            }
        }

        attrs.push(0);

        let share = share.map_or(std::ptr::null(), |share| share.0);
        unsafe {
            let raw = extra.CreateContextAttribsARB(self.hdc as *const _, share, attrs.as_ptr());
            if raw.is_null() {
                return Err(IoError::last_os_error().into());
            }
            Ok(WglContext(raw))
        }
    }

    fn clear_current(&self) {
        unsafe {
            wgl::MakeCurrent(std::ptr::null(), std::ptr::null());
        }
    }

    fn destroy(&self, context: WglContext) {
        unsafe {
            wgl::DeleteContext(context.0);
        }
    }
}

/// A context known not to be current on any thread.
pub struct NotCurrentContext {
    inner: ContextInner,
}

impl NotCurrentContext {
    pub(crate) fn new(inner: ContextInner) -> Self {
        Self { inner }
    }

    /// Make the context current with `surface` on the calling thread.
    pub fn make_current<T: SurfaceTypeTrait>(
        self,
        surface: &Surface<T>,
    ) -> Result<PossiblyCurrentContext> {
        self.inner.make_current(surface.hdc())?;
        Ok(PossiblyCurrentContext { inner: self.inner, _nosendsync: PhantomData })
    }

    /// Treat the context as possibly current without making it so.
    pub fn treat_as_possibly_current(self) -> PossiblyCurrentContext {
        PossiblyCurrentContext { inner: self.inner, _nosendsync: PhantomData }
    }

    pub fn is_modern(&self) -> bool {
        self.inner.modern
    }
}

/// A context that may be current on the calling thread.
pub struct PossiblyCurrentContext {
    inner: ContextInner,
    _nosendsync: PhantomData<*mut ()>,
}

impl PossiblyCurrentContext {
    pub fn is_current(&self) -> bool {
        unsafe { wgl::GetCurrentContext() == self.inner.raw.0 }
    }

    pub fn make_current<T: SurfaceTypeTrait>(&self, surface: &Surface<T>) -> Result<()> {
        self.inner.make_current(surface.hdc())
    }

    /// Separate draw and read drawables need `WGL_ARB_make_current_read`
    /// entry points this crate doesn't load, so this always fails.
    pub fn make_current_draw_read<T: SurfaceTypeTrait, U: SurfaceTypeTrait>(
        &self,
        _draw: &Surface<T>,
        _read: &Surface<U>,
    ) -> Result<()> {
        Err(ErrorKind::NotSupported("separate draw and read drawables aren't supported with wgl")
            .into())
    }

    /// Release the context from the calling thread.
    pub fn make_not_current(self) -> Result<NotCurrentContext> {
        if self.is_current() {
            unsafe {
                if wgl::MakeCurrent(std::ptr::null(), std::ptr::null()) == 0 {
                    return Err(IoError::last_os_error().into());
                }
            }
        }
        Ok(NotCurrentContext { inner: self.inner })
    }

    pub fn is_modern(&self) -> bool {
        self.inner.modern
    }

    pub(crate) fn raw(&self) -> WglContext {
        self.inner.raw
    }
}

/// The state shared by both context typestates.
pub(crate) struct ContextInner {
    pub(crate) shared: Arc<SharedResource>,
    /// Keeps the window the context was negotiated through alive for as
    /// long as the context can still be made current through it.
    pub(crate) window: Option<HiddenWindow>,
    pub(crate) raw: WglContext,
    pub(crate) modern: bool,
}

impl ContextInner {
    fn make_current(&self, hdc: HDC) -> Result<()> {
        unsafe {
            if wgl::MakeCurrent(hdc as *const _, self.raw.0) == 0 {
                return Err(IoError::last_os_error().into());
            }
        }
        Ok(())
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        unsafe {
            if wgl::GetCurrentContext() == self.raw.0 {
                wgl::MakeCurrent(std::ptr::null(), std::ptr::null());
            }
            wgl::DeleteContext(self.raw.0);
        }
    }
}

impl fmt::Debug for NotCurrentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotCurrentContext")
            .field("raw", &self.inner.raw.0)
            .field("modern", &self.inner.modern)
            .finish()
    }
}

impl fmt::Debug for PossiblyCurrentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PossiblyCurrentContext")
            .field("raw", &self.inner.raw.0)
            .field("modern", &self.inner.modern)
            .field("current", &self.is_current())
            .finish()
    }
}
