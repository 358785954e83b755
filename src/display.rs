//! The platform display and what it can do.

use std::ffi::{self, CStr};
use std::fmt;

use bitflags::bitflags;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::config::{GraphicsConfiguration, Resolved};
use crate::context::{ContextAttributes, NotCurrentContext, PossiblyCurrentContext};
use crate::error::{ErrorKind, Result};
use crate::private::{gl_api_dispatch, Sealed};
use crate::surface::{PbufferSurface, Surface, WindowSurface};

bitflags! {
    /// What the display's driver was discovered to support at bootstrap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DisplayFeatures: u32 {
        /// Pixel formats with multisample buffers can be requested.
        const MULTISAMPLING_PIXEL_FORMATS = 0b0000_0001;

        /// Pixel formats with floating point color can be requested.
        const FLOAT_PIXEL_FORMAT          = 0b0000_0010;

        /// Pbuffer surfaces can be created.
        const PBUFFER_SURFACES            = 0b0000_0100;

        /// A context can be made current with separate draw and read
        /// drawables.
        const READ_DRAWABLE               = 0b0000_1000;

        /// Contexts can be created through the ARB entry point.
        const CONTEXT_CREATION_ARB        = 0b0001_0000;

        /// Pixel formats can be negotiated through the extension path
        /// rather than the legacy descriptors.
        const PIXEL_FORMAT_ARB            = 0b0010_0000;
    }
}

/// The operations every platform display supports.
pub trait GlDisplay: Sealed {
    /// The window surface type of the backend.
    type WindowSurface;
    /// The pbuffer surface type of the backend.
    type PbufferSurface;
    /// The context type handed out by creation.
    type NotCurrentContext;
    /// The context type creation can share namespaces with.
    type PossiblyCurrentContext;

    /// What the display's driver supports.
    fn features(&self) -> DisplayFeatures;

    /// A human readable platform version, like `GLX 1.4`.
    fn version_string(&self) -> String;

    /// Whether the platform advertises the given client extension.
    fn supports_extension(&self, extension: &str) -> bool;

    /// Resolve `config` by picking a native visual ahead of window
    /// creation.
    fn resolve_early(&self, config: &GraphicsConfiguration) -> Result<Resolved>;

    /// Resolve `config` against an already created native window.
    fn resolve_late(
        &self,
        config: &GraphicsConfiguration,
        window: RawWindowHandle,
    ) -> Result<Resolved>;

    /// Wrap an existing native window in a surface of `config`.
    fn create_window_surface(
        &self,
        config: &GraphicsConfiguration,
        window: RawWindowHandle,
    ) -> Result<Self::WindowSurface>;

    /// Create an offscreen pbuffer surface of the given size.
    fn create_pbuffer_surface(
        &self,
        config: &GraphicsConfiguration,
        width: u32,
        height: u32,
    ) -> Result<Self::PbufferSurface>;

    /// Create a context for `config`, negotiating the best version the
    /// driver will give for `attributes`, optionally sharing object
    /// namespaces with `share`.
    fn create_context(
        &self,
        config: &GraphicsConfiguration,
        attributes: &ContextAttributes,
        share: Option<&Self::PossiblyCurrentContext>,
    ) -> Result<Self::NotCurrentContext>;

    /// Look an OpenGL entry point up by name.
    fn get_proc_address(&self, addr: &CStr) -> *const ffi::c_void;

    /// Drop the process wide shared resources of this display's device.
    /// Idempotent; the native teardown runs once the last user goes away.
    fn purge_shared_resources(&self);
}

/// The platform display backing every other object of this crate.
#[derive(Debug, Clone)]
pub enum Display {
    /// The GLX display.
    #[cfg(glx_backend)]
    Glx(crate::api::glx::display::Display),
    /// The WGL display.
    #[cfg(wgl_backend)]
    Wgl(crate::api::wgl::display::Display),
}

impl Display {
    /// Create a display from a raw native display handle.
    ///
    /// # Safety
    ///
    /// The `display` handle must be valid for the lifetime of the
    /// returned display and everything created from it.
    pub unsafe fn new(display: RawDisplayHandle) -> Result<Self> {
        match display {
            #[cfg(glx_backend)]
            RawDisplayHandle::Xlib(_) => {
                unsafe { crate::api::glx::display::Display::new(display).map(Self::Glx) }
            },
            #[cfg(wgl_backend)]
            RawDisplayHandle::Windows(_) => {
                unsafe { crate::api::wgl::display::Display::new(display).map(Self::Wgl) }
            },
            _ => Err(ErrorKind::NotSupported("provided native display isn't supported").into()),
        }
    }
}

impl GlDisplay for Display {
    type NotCurrentContext = NotCurrentContext;
    type PbufferSurface = Surface<PbufferSurface>;
    type PossiblyCurrentContext = PossiblyCurrentContext;
    type WindowSurface = Surface<WindowSurface>;

    fn features(&self) -> DisplayFeatures {
        gl_api_dispatch!(self; Self(display) => display.features())
    }

    fn version_string(&self) -> String {
        gl_api_dispatch!(self; Self(display) => display.version_string())
    }

    fn supports_extension(&self, extension: &str) -> bool {
        gl_api_dispatch!(self; Self(display) => display.supports_extension(extension))
    }

    fn resolve_early(&self, config: &GraphicsConfiguration) -> Result<Resolved> {
        gl_api_dispatch!(self; Self(display) => display.resolve_early(config))
    }

    fn resolve_late(
        &self,
        config: &GraphicsConfiguration,
        window: RawWindowHandle,
    ) -> Result<Resolved> {
        gl_api_dispatch!(self; Self(display) => display.resolve_late(config, window))
    }

    fn create_window_surface(
        &self,
        config: &GraphicsConfiguration,
        window: RawWindowHandle,
    ) -> Result<Surface<WindowSurface>> {
        match self {
            #[cfg(glx_backend)]
            Self::Glx(display) => {
                display.create_window_surface(config, window).map(Surface::Glx)
            },
            #[cfg(wgl_backend)]
            Self::Wgl(display) => {
                display.create_window_surface(config, window).map(Surface::Wgl)
            },
        }
    }

    fn create_pbuffer_surface(
        &self,
        config: &GraphicsConfiguration,
        width: u32,
        height: u32,
    ) -> Result<Surface<PbufferSurface>> {
        match self {
            #[cfg(glx_backend)]
            Self::Glx(display) => {
                display.create_pbuffer_surface(config, width, height).map(Surface::Glx)
            },
            #[cfg(wgl_backend)]
            Self::Wgl(display) => {
                display.create_pbuffer_surface(config, width, height).map(Surface::Wgl)
            },
        }
    }

    fn create_context(
        &self,
        config: &GraphicsConfiguration,
        attributes: &ContextAttributes,
        share: Option<&PossiblyCurrentContext>,
    ) -> Result<NotCurrentContext> {
        match self {
            #[cfg(glx_backend)]
            Self::Glx(display) => {
                let share = match share {
                    Some(PossiblyCurrentContext::Glx(share)) => Some(share),
                    #[allow(unreachable_patterns)]
                    Some(_) => return Err(ErrorKind::BadMatch.into()),
                    None => None,
                };
                display.create_context(config, attributes, share).map(NotCurrentContext::Glx)
            },
            #[cfg(wgl_backend)]
            Self::Wgl(display) => {
                let share = match share {
                    Some(PossiblyCurrentContext::Wgl(share)) => Some(share),
                    #[allow(unreachable_patterns)]
                    Some(_) => return Err(ErrorKind::BadMatch.into()),
                    None => None,
                };
                display.create_context(config, attributes, share).map(NotCurrentContext::Wgl)
            },
        }
    }

    fn get_proc_address(&self, addr: &CStr) -> *const ffi::c_void {
        gl_api_dispatch!(self; Self(display) => display.get_proc_address(addr))
    }

    fn purge_shared_resources(&self) {
        gl_api_dispatch!(self; Self(display) => display.purge_shared_resources())
    }
}

impl Sealed for Display {}

impl fmt::Display for DisplayFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
