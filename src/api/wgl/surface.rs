//! Everything related to the WGL drawables.

use std::fmt;
use std::io::Error as IoError;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use raw_window_handle::RawWindowHandle;
use windows_sys::Win32::Foundation::{HWND, RECT};
use windows_sys::Win32::Graphics::Gdi::{GetDC, ReleaseDC, HDC};
use windows_sys::Win32::UI::WindowsAndMessaging::GetClientRect;

use crate::error::{ErrorKind, Result};
use crate::surface::SurfaceTypeTrait;

use super::resources::SharedResource;

/// A wrapper around a window's device context.
pub struct Surface<T: SurfaceTypeTrait> {
    _shared: Arc<SharedResource>,
    hwnd: HWND,
    hdc: HDC,
    _nosendsync: PhantomData<*const std::ffi::c_void>,
    _ty: PhantomData<T>,
}

impl<T: SurfaceTypeTrait> Surface<T> {
    pub(crate) fn hdc(&self) -> HDC {
        self.hdc
    }

    /// The drawable's current client area size.
    pub fn size(&self) -> Option<(u32, u32)> {
        unsafe {
            let mut rect: RECT = mem::zeroed();
            if GetClientRect(self.hwnd, &mut rect) == 0 {
                return None;
            }
            let width = (rect.right - rect.left) as u32;
            let height = (rect.bottom - rect.top) as u32;
            Some((width, height))
        }
    }
}

pub(crate) fn create_window_surface<T: SurfaceTypeTrait>(
    shared: Arc<SharedResource>,
    window: RawWindowHandle,
) -> Result<Surface<T>> {
    let hwnd = match window {
        RawWindowHandle::Win32(window_handle) => window_handle.hwnd.get() as HWND,
        _ => return Err(ErrorKind::NotSupported("provided native window is not supported").into()),
    };

    let hdc = unsafe { GetDC(hwnd) };
    if hdc == 0 {
        return Err(IoError::last_os_error().into());
    }

    Ok(Surface { _shared: shared, hwnd, hdc, _nosendsync: PhantomData, _ty: PhantomData })
}

impl<T: SurfaceTypeTrait> Drop for Surface<T> {
    fn drop(&mut self) {
        unsafe {
            ReleaseDC(self.hwnd, self.hdc);
        }
    }
}

impl<T: SurfaceTypeTrait> fmt::Debug for Surface<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("hwnd", &self.hwnd)
            .field("hdc", &self.hdc)
            .field("kind", &T::surface_kind())
            .finish()
    }
}
