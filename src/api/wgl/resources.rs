//! Process wide state shared by every WGL display.

use std::collections::HashSet;
use std::ffi::{CStr, CString, OsStr};
use std::fmt;
use std::io::Error as IoError;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::sync::Mutex;

use glutin_wgl_sys::{wgl, wgl_extra};
use once_cell::sync::OnceCell;
use windows_sys::Win32::Foundation::{HMODULE, HWND};
use windows_sys::Win32::Graphics::Gdi::{GetDC, ReleaseDC, HDC};
use windows_sys::Win32::Graphics::OpenGL as gl;
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleW, LoadLibraryW};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, RegisterClassExW, CW_USEDEFAULT,
    WNDCLASSEXW, WS_CLIPCHILDREN, WS_CLIPSIBLINGS, WS_EX_APPWINDOW, WS_POPUP,
};

use crate::display::DisplayFeatures;
use crate::error::{ErrorKind, Result};
use crate::registry::FormatCache;

use super::{WglExtra, HGLRC};

/// Side of the hidden window the driver is probed through.
const PROBE_SIZE: i32 = 16;

/// A hidden window and its device context.
pub(crate) struct HiddenWindow {
    pub(crate) hwnd: HWND,
    pub(crate) hdc: HDC,
}

unsafe impl Send for HiddenWindow {}

impl HiddenWindow {
    /// Create a popup window that is never shown.
    pub(crate) fn new() -> Result<Self> {
        unsafe {
            let class_name = wide("glcaps probe class");
            let mut class: WNDCLASSEXW = mem::zeroed();
            class.cbSize = mem::size_of::<WNDCLASSEXW>() as u32;
            class.lpfnWndProc = Some(DefWindowProcW);
            class.hInstance = GetModuleHandleW(std::ptr::null());
            class.lpszClassName = class_name.as_ptr();

            // Re-registering across windows reports an error we don't
            // care about.
            RegisterClassExW(&class);

            let title = wide("glcaps probe");
            let hwnd = CreateWindowExW(
                WS_EX_APPWINDOW,
                class_name.as_ptr(),
                title.as_ptr(),
                WS_POPUP | WS_CLIPSIBLINGS | WS_CLIPCHILDREN,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                PROBE_SIZE,
                PROBE_SIZE,
                0,
                0,
                GetModuleHandleW(std::ptr::null()),
                std::ptr::null(),
            );
            if hwnd == 0 {
                return Err(IoError::last_os_error().into());
            }

            let hdc = GetDC(hwnd);
            if hdc == 0 {
                DestroyWindow(hwnd);
                return Err(IoError::last_os_error().into());
            }

            Ok(Self { hwnd, hdc })
        }
    }
}

impl Drop for HiddenWindow {
    fn drop(&mut self) {
        unsafe {
            ReleaseDC(self.hwnd, self.hdc);
            DestroyWindow(self.hwnd);
        }
    }
}

/// The retained probe context. Its window carries the pixel format the
/// extension entry points were loaded with.
pub(crate) struct Probe {
    pub(crate) window: HiddenWindow,
    pub(crate) context: HGLRC,
}

unsafe impl Send for Probe {}

/// Everything about the driver that is discovered once per process.
pub(crate) struct SharedResource {
    pub(crate) lib_opengl32: HMODULE,
    pub(crate) wgl_extra: Option<&'static WglExtra>,

    extensions: HashSet<String>,
    features: DisplayFeatures,

    /// Decoded formats, keyed by screen (always zero on WGL) and pixel
    /// format index.
    pub(crate) format_cache: FormatCache,

    probe: Mutex<Option<Probe>>,
}

impl SharedResource {
    /// Bring the driver up. Runs on the bootstrap thread.
    ///
    /// The extension entry points only exist while a context is current,
    /// so a hidden window gets a stock pixel format and a legacy context
    /// made current just to interrogate the driver.
    pub(crate) fn bootstrap() -> Result<Self> {
        let name = wide("opengl32.dll");
        let lib_opengl32 = unsafe { LoadLibraryW(name.as_ptr()) };
        if lib_opengl32 == 0 {
            return Err(ErrorKind::NotFound.into());
        }

        let window = HiddenWindow::new()?;
        unsafe {
            let descriptor = probe_pixel_format_descriptor();
            let format = gl::ChoosePixelFormat(window.hdc, &descriptor);
            if format == 0 {
                return Err(IoError::last_os_error().into());
            }
            if gl::SetPixelFormat(window.hdc, format, &descriptor) == 0 {
                return Err(IoError::last_os_error().into());
            }

            let context = wgl::CreateContext(window.hdc as *const _);
            if context.is_null() {
                return Err(IoError::last_os_error().into());
            }
            if wgl::MakeCurrent(window.hdc as *const _, context) == 0 {
                wgl::DeleteContext(context);
                return Err(IoError::last_os_error().into());
            }

            // Resolved once per process; a bootstrap retried after a purge
            // reuses the table instead of loading another copy.
            static WGL_EXTRA: OnceCell<WglExtra> = OnceCell::new();
            let wgl_extra: &'static WglExtra = WGL_EXTRA.get_or_init(|| {
                WglExtra::new(wgl_extra::Wgl::load_with(|addr| {
                    let addr = CString::new(addr.as_bytes()).unwrap();
                    wgl::GetProcAddress(addr.as_ptr()) as *const _
                }))
            });

            let extensions = load_extensions(window.hdc, wgl_extra);
            let features = extract_display_features(&extensions, wgl_extra);

            wgl::MakeCurrent(std::ptr::null(), std::ptr::null());

            log::debug!("bootstrapped wgl: features {features:?}");

            Ok(Self {
                lib_opengl32,
                wgl_extra: Some(wgl_extra),
                extensions,
                features,
                format_cache: FormatCache::new(),
                probe: Mutex::new(Some(Probe { window, context })),
            })
        }
    }

    pub(crate) fn version_string(&self) -> String {
        String::from("WGL 1.0")
    }

    pub(crate) fn features(&self) -> DisplayFeatures {
        self.features
    }

    pub(crate) fn supports_extension(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }
}

impl Drop for SharedResource {
    fn drop(&mut self) {
        // Context first, then its window.
        if let Some(probe) = self.probe.lock().unwrap().take() {
            unsafe {
                if wgl::GetCurrentContext() == probe.context {
                    wgl::MakeCurrent(std::ptr::null(), std::ptr::null());
                }
                wgl::DeleteContext(probe.context);
            }
            drop(probe.window);
        }
    }
}

impl fmt::Debug for SharedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedResource")
            .field("features", &self.features)
            .field("extensions", &self.extensions)
            .finish()
    }
}

/// The stock descriptor the probe window is brought up with.
fn probe_pixel_format_descriptor() -> gl::PIXELFORMATDESCRIPTOR {
    gl::PIXELFORMATDESCRIPTOR {
        nSize: mem::size_of::<gl::PIXELFORMATDESCRIPTOR>() as u16,
        nVersion: 1,
        dwFlags: gl::PFD_DRAW_TO_WINDOW | gl::PFD_SUPPORT_OPENGL | gl::PFD_DOUBLEBUFFER,
        iPixelType: gl::PFD_TYPE_RGBA,
        cColorBits: 24,
        cRedBits: 0,
        cRedShift: 0,
        cGreenBits: 0,
        cGreenShift: 0,
        cBlueBits: 0,
        cBlueShift: 0,
        cAlphaBits: 8,
        cAlphaShift: 0,
        cAccumBits: 0,
        cAccumRedBits: 0,
        cAccumGreenBits: 0,
        cAccumBlueBits: 0,
        cAccumAlphaBits: 0,
        cDepthBits: 24,
        cStencilBits: 8,
        cAuxBuffers: 0,
        iLayerType: gl::PFD_MAIN_PLANE,
        bReserved: 0,
        dwLayerMask: 0,
        dwVisibleMask: 0,
        dwDamageMask: 0,
    }
}

fn load_extensions(hdc: HDC, wgl_extra: &WglExtra) -> HashSet<String> {
    let extensions = unsafe {
        if wgl_extra.GetExtensionsStringARB.is_loaded() {
            CStr::from_ptr(wgl_extra.GetExtensionsStringARB(hdc as *const _))
        } else if wgl_extra.GetExtensionsStringEXT.is_loaded() {
            CStr::from_ptr(wgl_extra.GetExtensionsStringEXT())
        } else {
            return HashSet::new();
        }
    };

    if let Ok(extensions) = extensions.to_str() {
        extensions.split(' ').map(String::from).collect()
    } else {
        HashSet::new()
    }
}

fn extract_display_features(
    extensions: &HashSet<String>,
    wgl_extra: &WglExtra,
) -> DisplayFeatures {
    let mut features = DisplayFeatures::empty();

    if extensions.contains("WGL_ARB_pixel_format")
        && wgl_extra.ChoosePixelFormatARB.is_loaded()
        && wgl_extra.GetPixelFormatAttribivARB.is_loaded()
    {
        features |= DisplayFeatures::PIXEL_FORMAT_ARB;
    }

    if extensions.contains("WGL_ARB_multisample") {
        features |= DisplayFeatures::MULTISAMPLING_PIXEL_FORMATS;
    }

    if extensions.contains("WGL_ARB_pixel_format_float") {
        features |= DisplayFeatures::FLOAT_PIXEL_FORMAT;
    }

    if extensions.contains("WGL_ARB_create_context")
        && wgl_extra.CreateContextAttribsARB.is_loaded()
    {
        features |= DisplayFeatures::CONTEXT_CREATION_ARB;
    }

    // Pbuffers and separate read drawables need entry points the loader
    // doesn't carry, so they stay off and the display reports them as
    // unsupported.

    features
}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(Some(0)).collect()
}
