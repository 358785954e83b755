//! GLX object creation.

use std::cell::Cell;
use std::ffi::{self, CStr};
use std::fmt;
use std::sync::Arc;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::caps::Capabilities;
use crate::config::{GraphicsConfiguration, Resolved, VisualSource};
use crate::context::{negotiate, ContextAttributes, Negotiated};
use crate::display::{DisplayFeatures, GlDisplay};
use crate::error::{ErrorKind, Result};
use crate::private::Sealed;
use crate::surface::{PbufferSurface, SurfaceKind, WindowSurface};

use super::config::{enumerate_candidates, find_fbconfig};
use super::context::{ContextInner, NativeOps, NotCurrentContext, PossiblyCurrentContext};
use super::resources::SharedResource;
use super::surface::{self, Surface};
use super::{purge_shared_resource, shared_resource, DeviceKey, XLIB};

/// A wrapper around the GLX state of one X server connection and screen.
#[derive(Clone)]
pub struct Display {
    pub(crate) inner: Arc<DisplayInner>,
}

pub(crate) struct DisplayInner {
    pub(crate) shared: Arc<SharedResource>,
    key: DeviceKey,
}

impl Display {
    /// Create a GLX display for an Xlib display handle.
    ///
    /// The device behind the handle is bootstrapped on first use and its
    /// outcome shared with every other display opened on the same
    /// connection string and screen.
    ///
    /// # Safety
    ///
    /// The `display` handle must point to a valid Xlib display.
    pub(crate) unsafe fn new(display: RawDisplayHandle) -> Result<Self> {
        let handle = match display {
            RawDisplayHandle::Xlib(handle) => handle,
            _ => {
                return Err(ErrorKind::NotSupported("provided native display isn't Xlib").into())
            },
        };

        // The fbconfigs of this crate live on the shared resource's own
        // connection, so all that is taken from the caller's is the
        // connection string identifying the device.
        let connection = match handle.display {
            Some(display) => {
                let xlib =
                    XLIB.as_ref().ok_or(ErrorKind::NotSupported("Xlib couldn't be loaded"))?;
                let name =
                    unsafe { (xlib.XDisplayString)(display.as_ptr() as *mut _) };
                if name.is_null() {
                    return Err(ErrorKind::BadDisplay.into());
                }
                unsafe { CStr::from_ptr(name) }
                    .to_str()
                    .map_err(|_| ErrorKind::BadDisplay)?
                    .to_owned()
            },
            None => String::new(),
        };

        let key = DeviceKey { connection, screen: handle.screen };
        let shared = shared_resource(&key)?;

        Ok(Self { inner: Arc::new(DisplayInner { shared, key }) })
    }
}

/// The drawable kind a set of desired capabilities is headed for.
fn surface_kind_for(caps: &Capabilities) -> SurfaceKind {
    if caps.pbuffer() {
        SurfaceKind::Pbuffer
    } else if caps.onscreen() {
        SurfaceKind::Window
    } else {
        SurfaceKind::Pixmap
    }
}

/// The screen's fbconfigs presented as a visual source.
///
/// `glXChooseFBConfig` hands out the candidates and the recommendation in
/// one round trip, so the recommendation observed while enumerating is
/// kept for [`VisualSource::platform_recommended`].
struct ScreenVisuals<'a> {
    shared: &'a SharedResource,
    screen: i32,
    kind: SurfaceKind,
    recommended: Cell<Option<i64>>,
}

impl VisualSource for ScreenVisuals<'_> {
    fn enumerate(&self, desired: &Capabilities) -> Result<Vec<(i64, Option<Capabilities>)>> {
        let (candidates, recommended) = enumerate_candidates(
            self.shared.glx,
            self.shared.xlib,
            *self.shared.display,
            self.screen,
            desired,
            self.shared.features(),
            self.kind,
        )?;
        self.recommended.set(recommended);
        Ok(candidates)
    }

    fn platform_recommended(&self, _desired: &Capabilities) -> Option<i64> {
        self.recommended.get()
    }
}

impl Display {
    fn resolved_fbconfig(
        &self,
        config: &GraphicsConfiguration,
    ) -> Result<(Resolved, glutin_glx_sys::glx::types::GLXFBConfig)> {
        let resolved = GlDisplay::resolve_early(self, config)?;
        let fbconfig = find_fbconfig(
            self.inner.shared.glx,
            self.inner.shared.xlib,
            *self.inner.shared.display,
            config.screen(),
            resolved.native_id(),
        )?;
        Ok((resolved, fbconfig))
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

    fn resolve_early(&self, config: &GraphicsConfiguration) -> Result<Resolved> {
        let visuals = ScreenVisuals {
            shared: &self.inner.shared,
            screen: config.screen(),
            kind: surface_kind_for(config.desired_capabilities()),
            recommended: Cell::new(None),
        };
        config.resolve_early(&visuals, &self.inner.shared.format_cache)
    }

    fn resolve_late(
        &self,
        _config: &GraphicsConfiguration,
        _window: RawWindowHandle,
    ) -> Result<Resolved> {
        // On X11 the visual is part of window creation, so there is
        // nothing left to negotiate once the window exists.
        Err(ErrorKind::NotSupported("glx resolves pixel formats ahead of window creation").into())
    }

    fn create_window_surface(
        &self,
        config: &GraphicsConfiguration,
        window: RawWindowHandle,
    ) -> Result<Surface<WindowSurface>> {
        let (_, fbconfig) = self.resolved_fbconfig(config)?;
        surface::create_window_surface(self.inner.shared.clone(), fbconfig, window)
    }

    fn create_pbuffer_surface(
        &self,
        config: &GraphicsConfiguration,
        width: u32,
        height: u32,
    ) -> Result<Surface<PbufferSurface>> {
        if !self.features().contains(DisplayFeatures::PBUFFER_SURFACES) {
            return Err(ErrorKind::NotSupported("pbuffers aren't supported").into());
        }

        let (_, fbconfig) = self.resolved_fbconfig(config)?;
        surface::create_pbuffer_surface(self.inner.shared.clone(), fbconfig, width, height)
    }

    fn create_context(
        &self,
        config: &GraphicsConfiguration,
        attributes: &ContextAttributes,
        share: Option<&PossiblyCurrentContext>,
    ) -> Result<NotCurrentContext> {
        let (resolved, fbconfig) = self.resolved_fbconfig(config)?;

        let ops = NativeOps::new(
            &self.inner.shared,
            fbconfig,
            resolved.capabilities().float_pixels(),
        );
        let share = share.map(|share| Negotiated::from_parts(share.raw(), share.is_modern()));

        let negotiated = negotiate(&ops, attributes, share.as_ref())?;
        let raw = *negotiated.raw().ok_or(ErrorKind::BadContext)?;
        let modern = negotiated.is_modern();

        let inner = ContextInner { shared: self.inner.shared.clone(), raw, modern };
        Ok(NotCurrentContext::new(inner))
    }

    fn get_proc_address(&self, addr: &CStr) -> *const ffi::c_void {
        unsafe { self.inner.shared.glx.GetProcAddress(addr.as_ptr() as *const _) as *const _ }
    }

    fn purge_shared_resources(&self) {
        purge_shared_resource(&self.inner.key);
    }
}

impl Sealed for Display {}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("connection", &self.inner.key.connection)
            .field("screen", &self.inner.key.screen)
            .field("features", &self.inner.shared.features())
            .finish()
    }
}
