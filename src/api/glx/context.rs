//! GLX context handling.

use std::ffi::c_int;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use glutin_glx_sys::glx::types::{GLXContext, GLXFBConfig};
use glutin_glx_sys::{glx, glx_extra};

use crate::context::{ContextOps, ModernRequest};
use crate::display::DisplayFeatures;
use crate::error::{ErrorKind, Result};
use crate::lock::ToolkitLock;
use crate::surface::SurfaceTypeTrait;

use super::resources::SharedResource;
use super::surface::Surface;

/// Raw GLX context which is valid to pass between threads while not
/// current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GlxContext(pub(crate) GLXContext);

unsafe impl Send for GlxContext {}

impl Deref for GlxContext {
    type Target = GLXContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The native operations context negotiation runs against one fbconfig.
pub(crate) struct NativeOps<'a> {
    shared: &'a SharedResource,
    config: GLXFBConfig,
    render_type: c_int,
}

impl<'a> NativeOps<'a> {
    pub(crate) fn new(shared: &'a SharedResource, config: GLXFBConfig, float_pixels: bool) -> Self {
        let render_type = if float_pixels {
            glx_extra::RGBA_FLOAT_TYPE_ARB as c_int
        } else {
            glx::RGBA_TYPE as c_int
        };
        Self { shared, config, render_type }
    }
}

impl ContextOps for NativeOps<'_> {
    type Raw = GlxContext;

    fn create_legacy(&self, share: Option<&GlxContext>) -> Result<GlxContext> {
        let share = share.map_or(std::ptr::null(), |share| share.0);
        let context = self.shared.trap(|| unsafe {
            self.shared.glx.CreateNewContext(
                *self.shared.display,
                self.config,
                self.render_type,
                share,
                1,
            )
        })?;

        if context.is_null() {
            return Err(ErrorKind::BadContext.into());
        }
        Ok(GlxContext(context))
    }

    fn make_current_probe(&self, context: &GlxContext) -> Result<()> {
        let probe = self.shared.probe();
        let pbuffer = match probe.as_ref() {
            Some(probe) => probe.pbuffer,
            None => return Err(ErrorKind::InitializationFailed.into()),
        };

        let bound = self.shared.trap(|| unsafe {
            self.shared.glx.MakeContextCurrent(*self.shared.display, pbuffer, pbuffer, context.0)
        })?;

        if bound == 0 {
            return Err(ErrorKind::BadAccess.into());
        }
        Ok(())
    }

    fn has_arb_create(&self) -> bool {
        self.shared.features().contains(DisplayFeatures::CONTEXT_CREATION_ARB)
    }

    fn create_arb(&self, request: &ModernRequest, share: Option<&GlxContext>) -> Result<GlxContext> {
        let extra = self
            .shared
            .glx_extra
            .ok_or(ErrorKind::NotSupported("the context creation extension is missing"))?;

        let mut attrs = Vec::<c_int>::with_capacity(9);

        if let Some(version) = request.version {
            attrs.push(glx_extra::CONTEXT_MAJOR_VERSION_ARB as c_int);
            attrs.push(version.major as c_int);
            attrs.push(glx_extra::CONTEXT_MINOR_VERSION_ARB as c_int);
            attrs.push(version.minor as c_int);
        }

        if self.shared.supports_extension("GLX_ARB_create_context_profile") {
            let profile = match request.profile {
                crate::context::GlProfile::Core => glx_extra::CONTEXT_CORE_PROFILE_BIT_ARB,
                crate::context::GlProfile::Compatibility => {
                    glx_extra::CONTEXT_COMPATIBILITY_PROFILE_BIT_ARB
                },
            };
            attrs.push(glx_extra::CONTEXT_PROFILE_MASK_ARB as c_int);
            attrs.push(profile as c_int);
        }

        // Flags only exist for 3.0 and up; an unpinned version means the
        // driver's newest, which is always recent enough for them.
        let flaggable = request.version.map_or(true, |version| version.major >= 3);
        if flaggable {
            let mut flags = 0;
            if request.debug {
                flags |= glx_extra::CONTEXT_DEBUG_BIT_ARB as c_int;
            }
            if request.forward_compatible {
                flags |= glx_extra::CONTEXT_FORWARD_COMPATIBLE_BIT_ARB as c_int;
            }
            if flags != 0 {
                attrs.push(glx_extra::CONTEXT_FLAGS_ARB as c_int);
                attrs.push(flags);
            }
        }

        attrs.push(0);

        let share = share.map_or(std::ptr::null(), |share| share.0);
        let context = self.shared.trap(|| unsafe {
            extra.CreateContextAttribsARB(
                *self.shared.display as *mut _,
                self.config as *const _,
                share,
                1,
                attrs.as_ptr(),
            )
        })?;

        if context.is_null() {
            return Err(ErrorKind::BadContext.into());
        }
        Ok(GlxContext(context))
    }

    fn clear_current(&self) {
        let _guard = ToolkitLock::global().lock();
        unsafe {
            self.shared.glx.MakeContextCurrent(*self.shared.display, 0, 0, std::ptr::null());
        }
    }

    fn destroy(&self, context: GlxContext) {
        let result = self.shared.trap(|| unsafe {
            self.shared.glx.DestroyContext(*self.shared.display, context.0);
        });
        if let Err(err) = result {
            log::warn!("destroying a glx context reported: {err}");
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
        self.inner.make_current(surface.raw(), surface.raw())?;
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
        unsafe { self.inner.shared.glx.GetCurrentContext() == self.inner.raw.0 }
    }

    pub fn make_current<T: SurfaceTypeTrait>(&self, surface: &Surface<T>) -> Result<()> {
        self.inner.make_current(surface.raw(), surface.raw())
    }

    pub fn make_current_draw_read<T: SurfaceTypeTrait, U: SurfaceTypeTrait>(
        &self,
        draw: &Surface<T>,
        read: &Surface<U>,
    ) -> Result<()> {
        if !self.inner.shared.features().contains(DisplayFeatures::READ_DRAWABLE) {
            return Err(ErrorKind::NotSupported(
                "separate draw and read drawables aren't supported",
            )
            .into());
        }
        self.inner.make_current(draw.raw(), read.raw())
    }

    /// Release the context from the calling thread.
    pub fn make_not_current(self) -> Result<NotCurrentContext> {
        if self.is_current() {
            let released = self.inner.shared.trap(|| unsafe {
                self.inner.shared.glx.MakeContextCurrent(
                    *self.inner.shared.display,
                    0,
                    0,
                    std::ptr::null(),
                )
            })?;
            if released == 0 {
                return Err(ErrorKind::BadAccess.into());
            }
        }
        Ok(NotCurrentContext { inner: self.inner })
    }

    pub fn is_modern(&self) -> bool {
        self.inner.modern
    }

    pub(crate) fn raw(&self) -> GlxContext {
        self.inner.raw
    }
}

/// The state shared by both context typestates.
pub(crate) struct ContextInner {
    pub(crate) shared: Arc<SharedResource>,
    pub(crate) raw: GlxContext,
    pub(crate) modern: bool,
}

impl ContextInner {
    fn make_current(
        &self,
        draw: glx::types::GLXDrawable,
        read: glx::types::GLXDrawable,
    ) -> Result<()> {
        let bound = self.shared.trap(|| unsafe {
            self.shared.glx.MakeContextCurrent(*self.shared.display, draw, read, self.raw.0)
        })?;

        if bound == 0 {
            return Err(ErrorKind::BadAccess.into());
        }
        Ok(())
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let result = self.shared.trap(|| unsafe {
            if self.shared.glx.GetCurrentContext() == self.raw.0 {
                self.shared.glx.MakeContextCurrent(*self.shared.display, 0, 0, std::ptr::null());
            }
            self.shared.glx.DestroyContext(*self.shared.display, self.raw.0);
        });
        if let Err(err) = result {
            log::warn!("destroying a glx context reported: {err}");
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
