//! The typed surfaces a context can be made current against.

use std::fmt;

use crate::private::{gl_api_dispatch, Sealed};

/// The kind of drawable a surface or a capability set is intended for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// An onscreen window.
    Window,
    /// An offscreen pbuffer.
    Pbuffer,
    /// An offscreen native pixmap.
    Pixmap,
}

/// Trait for the surface marker types.
pub trait SurfaceTypeTrait: Sealed + Sized {
    /// The kind of the surface.
    fn surface_kind() -> SurfaceKind;
}

/// Marker for window surfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowSurface;

/// Marker for pbuffer surfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct PbufferSurface;

/// Marker for pixmap surfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct PixmapSurface;

impl SurfaceTypeTrait for WindowSurface {
    fn surface_kind() -> SurfaceKind {
        SurfaceKind::Window
    }
}

impl SurfaceTypeTrait for PbufferSurface {
    fn surface_kind() -> SurfaceKind {
        SurfaceKind::Pbuffer
    }
}

impl SurfaceTypeTrait for PixmapSurface {
    fn surface_kind() -> SurfaceKind {
        SurfaceKind::Pixmap
    }
}

impl Sealed for WindowSurface {}
impl Sealed for PbufferSurface {}
impl Sealed for PixmapSurface {}

/// A surface tied to the backend it was created by.
pub enum Surface<T: SurfaceTypeTrait> {
    /// The GLX surface.
    #[cfg(glx_backend)]
    Glx(crate::api::glx::surface::Surface<T>),
    /// The WGL surface.
    #[cfg(wgl_backend)]
    Wgl(crate::api::wgl::surface::Surface<T>),
}

impl<T: SurfaceTypeTrait> Surface<T> {
    /// The kind of the surface.
    pub fn kind(&self) -> SurfaceKind {
        T::surface_kind()
    }

    /// The surface dimensions in pixels, when the platform can report
    /// them.
    pub fn size(&self) -> Option<(u32, u32)> {
        gl_api_dispatch!(self; Self(surface) => surface.size())
    }
}

impl<T: SurfaceTypeTrait> fmt::Debug for Surface<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        gl_api_dispatch!(self; Self(surface) => surface.fmt(f))
    }
}

impl<T: SurfaceTypeTrait> Sealed for Surface<T> {}
