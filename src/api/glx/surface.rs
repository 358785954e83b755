//! Everything related to the GLX drawables.

use std::ffi::{c_int, c_uint};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use glutin_glx_sys::glx;
use glutin_glx_sys::glx::types::{GLXDrawable, GLXFBConfig};
use raw_window_handle::RawWindowHandle;

use crate::error::{ErrorKind, Result};
use crate::lock::ToolkitLock;
use crate::surface::{SurfaceKind, SurfaceTypeTrait};

use super::resources::SharedResource;

/// Hint for the attributes array.
const ATTR_SIZE_HINT: usize = 8;

/// A wrapper around one GLX drawable.
pub struct Surface<T: SurfaceTypeTrait> {
    shared: Arc<SharedResource>,
    pub(crate) raw: GLXDrawable,
    _nosendsync: PhantomData<*const std::ffi::c_void>,
    _ty: PhantomData<T>,
}

impl<T: SurfaceTypeTrait> Surface<T> {
    pub(crate) fn raw(&self) -> GLXDrawable {
        self.raw
    }

    /// The drawable's current size as the server reports it.
    pub fn size(&self) -> Option<(u32, u32)> {
        let width = self.raw_attribute(glx::WIDTH as c_int)?;
        let height = self.raw_attribute(glx::HEIGHT as c_int)?;
        Some((width as u32, height as u32))
    }

    fn raw_attribute(&self, attr: c_int) -> Option<c_uint> {
        let _guard = ToolkitLock::global().lock();
        unsafe {
            let mut value = 0;
            self.shared.glx.QueryDrawable(*self.shared.display, self.raw, attr, &mut value);
            // A destroyed or bogus drawable reads back as zero.
            (value != 0).then_some(value)
        }
    }
}

pub(crate) fn create_window_surface<T: SurfaceTypeTrait>(
    shared: Arc<SharedResource>,
    config: GLXFBConfig,
    window: RawWindowHandle,
) -> Result<Surface<T>> {
    let window = match window {
        RawWindowHandle::Xlib(window_handle) => {
            if window_handle.window == 0 {
                return Err(ErrorKind::BadNativeWindow.into());
            }

            window_handle.window
        },
        _ => return Err(ErrorKind::NotSupported("provided native window is not supported").into()),
    };

    let mut attrs = Vec::<c_int>::with_capacity(ATTR_SIZE_HINT);

    // Push X11 `None` to terminate the list.
    attrs.push(0);

    let raw = shared.trap(|| unsafe {
        shared.glx.CreateWindow(*shared.display, config, window, attrs.as_ptr())
    })?;

    if raw == 0 {
        return Err(ErrorKind::BadNativeWindow.into());
    }

    Ok(Surface { shared, raw, _nosendsync: PhantomData, _ty: PhantomData })
}

pub(crate) fn create_pbuffer_surface<T: SurfaceTypeTrait>(
    shared: Arc<SharedResource>,
    config: GLXFBConfig,
    width: u32,
    height: u32,
) -> Result<Surface<T>> {
    let mut attrs = Vec::<c_int>::with_capacity(ATTR_SIZE_HINT);

    attrs.push(glx::PBUFFER_WIDTH as c_int);
    attrs.push(width as c_int);
    attrs.push(glx::PBUFFER_HEIGHT as c_int);
    attrs.push(height as c_int);
    attrs.push(glx::LARGEST_PBUFFER as c_int);
    attrs.push(0);

    // Push X11 `None` to terminate the list.
    attrs.push(0);

    let raw = shared
        .trap(|| unsafe { shared.glx.CreatePbuffer(*shared.display, config, attrs.as_ptr()) })?;

    if raw == 0 {
        return Err(ErrorKind::BadPbuffer.into());
    }

    Ok(Surface { shared, raw, _nosendsync: PhantomData, _ty: PhantomData })
}

impl<T: SurfaceTypeTrait> Drop for Surface<T> {
    fn drop(&mut self) {
        let _ = self.shared.trap(|| unsafe {
            match T::surface_kind() {
                SurfaceKind::Pbuffer => {
                    self.shared.glx.DestroyPbuffer(*self.shared.display, self.raw);
                },
                SurfaceKind::Window => {
                    self.shared.glx.DestroyWindow(*self.shared.display, self.raw);
                },
                SurfaceKind::Pixmap => {
                    self.shared.glx.DestroyPixmap(*self.shared.display, self.raw);
                },
            }
        });
    }
}

impl<T: SurfaceTypeTrait> fmt::Debug for Surface<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("raw", &self.raw)
            .field("kind", &T::surface_kind())
            .finish()
    }
}
