//! Per device state shared by every display opened on the device.

use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};

use glutin_glx_sys::glx;
use glutin_glx_sys::glx::types::{Display as GLXDisplay, GLXContext, GLXPbuffer};
use x11_dl::xlib::Xlib;

use crate::caps::CapabilitiesBuilder;
use crate::display::DisplayFeatures;
use crate::error::{ErrorKind, Result};
use crate::lock::ToolkitLock;
use crate::registry::FormatCache;
use crate::surface::SurfaceKind;

use super::config::{enumerate_candidates, find_fbconfig};
use super::{last_x_error, DeviceKey, Glx, GlxExtra, GLX, GLX_BASE_ERROR, GLX_EXTRA, XLIB};

/// Side of the throwaway pbuffer the device is probed against.
const PROBE_SIZE: u32 = 16;

/// Raw X connection which is valid to pass between threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GlxDisplay(pub(crate) *mut GLXDisplay);

unsafe impl Send for GlxDisplay {}
unsafe impl Sync for GlxDisplay {}

impl Deref for GlxDisplay {
    type Target = *mut GLXDisplay;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The probe context and its drawable, kept alive so later context
/// negotiation has something to make temporary contexts current against.
pub(crate) struct Probe {
    pub(crate) context: GLXContext,
    pub(crate) pbuffer: GLXPbuffer,
    pub(crate) fbconfig_id: i64,
}

unsafe impl Send for Probe {}

/// Everything about one device that is discovered once and then shared
/// by every display opened on it.
pub(crate) struct SharedResource {
    key: DeviceKey,

    /// The device's own X connection. The fbconfigs this crate passes
    /// around are only meaningful on this connection, so every native
    /// call goes through it.
    pub(crate) display: GlxDisplay,

    pub(crate) glx: &'static Glx,
    pub(crate) glx_extra: Option<&'static GlxExtra>,
    pub(crate) xlib: &'static Xlib,

    version: (i32, i32),
    extensions: HashSet<String>,
    features: DisplayFeatures,

    /// Decoded formats of this device, keyed by screen and native id.
    pub(crate) format_cache: FormatCache,

    probe: Mutex<Option<Probe>>,
}

impl SharedResource {
    /// Bring the device up. Runs on the bootstrap thread, which also
    /// owns the probe context from then on.
    pub(crate) fn bootstrap(key: &DeviceKey) -> Result<Self> {
        let glx = GLX
            .as_ref()
            .ok_or(ErrorKind::NotSupported("libGL couldn't be loaded"))?;
        let glx_extra = GLX_EXTRA.as_ref();
        let xlib = XLIB
            .as_ref()
            .ok_or(ErrorKind::NotSupported("Xlib couldn't be loaded"))?;

        let connection = CString::new(key.connection.as_str())
            .map_err(|_| ErrorKind::BadDisplay)?;
        let display = {
            let _guard = ToolkitLock::global().lock();
            unsafe { (xlib.XOpenDisplay)(connection.as_ptr()) }
        };
        if display.is_null() {
            return Err(ErrorKind::BadDisplay.into());
        }
        let display = GlxDisplay(display as *mut GLXDisplay);

        let mut this = match Self::bootstrap_on(key, display, glx, glx_extra, xlib) {
            Ok(this) => this,
            Err(err) => {
                let _guard = ToolkitLock::global().lock();
                unsafe { (xlib.XCloseDisplay)(*display as *mut _) };
                return Err(err);
            },
        };

        if let Err(err) = this.create_probe() {
            log::debug!("device probe failed on {}: {err}", this.key.connection);
            let _guard = ToolkitLock::global().lock();
            unsafe { (xlib.XCloseDisplay)(*this.display as *mut _) };
            // Leave nothing for Drop to close twice.
            this.display = GlxDisplay(std::ptr::null_mut());
            return Err(err);
        }

        log::debug!(
            "bootstrapped {} screen {}: GLX {}.{}, features {:?}",
            this.key.connection,
            this.key.screen,
            this.version.0,
            this.version.1,
            this.features,
        );

        Ok(this)
    }

    fn bootstrap_on(
        key: &DeviceKey,
        display: GlxDisplay,
        glx: &'static Glx,
        glx_extra: Option<&'static GlxExtra>,
        xlib: &'static Xlib,
    ) -> Result<Self> {
        let _guard = ToolkitLock::global().lock();
        unsafe {
            let (mut error_base, mut event_base) = (0, 0);
            if glx.QueryExtension(*display, &mut error_base, &mut event_base) == 0 {
                return Err(ErrorKind::InitializationFailed.into());
            }
            GLX_BASE_ERROR.store(error_base, Ordering::Relaxed);

            let (mut major, mut minor) = (0, 0);
            if glx.QueryVersion(*display, &mut major, &mut minor) == 0 {
                return Err(ErrorKind::InitializationFailed.into());
            }
            if (major, minor) < (1, 3) {
                return Err(ErrorKind::NotSupported(
                    "glx versions lower than 1.3 aren't supported",
                )
                .into());
            }

            let extensions = get_extensions(glx, *display, key.screen);
            let features =
                extract_display_features((major, minor), &extensions, glx_extra);

            Ok(Self {
                key: key.clone(),
                display,
                glx,
                glx_extra,
                xlib,
                version: (major, minor),
                extensions,
                features,
                format_cache: FormatCache::new(),
                probe: Mutex::new(None),
            })
        }
    }

    /// Create the probe pbuffer and a legacy context, make them current
    /// once to prove the device renders at all, then release.
    fn create_probe(&self) -> Result<()> {
        let caps = CapabilitiesBuilder::new()
            .with_depth_size(0)
            .with_stencil_size(0)
            .with_pbuffer(true)
            .build();

        let (candidates, recommended) = enumerate_candidates(
            self.glx,
            self.xlib,
            *self.display,
            self.key.screen,
            &caps,
            self.features,
            SurfaceKind::Pbuffer,
        )?;
        let fbconfig_id = recommended
            .or_else(|| candidates.iter().find(|(_, caps)| caps.is_some()).map(|&(id, _)| id))
            .ok_or(ErrorKind::SelectionExhausted)?;
        let config =
            find_fbconfig(self.glx, self.xlib, *self.display, self.key.screen, fbconfig_id)?;

        let probe = self.trap(|| -> Result<Probe> {
            unsafe {
                let attrs = [
                    glx::PBUFFER_WIDTH as i32,
                    PROBE_SIZE as i32,
                    glx::PBUFFER_HEIGHT as i32,
                    PROBE_SIZE as i32,
                    glx::LARGEST_PBUFFER as i32,
                    0,
                    0,
                ];
                let pbuffer = self.glx.CreatePbuffer(*self.display, config, attrs.as_ptr());
                if pbuffer == 0 {
                    return Err(ErrorKind::BadPbuffer.into());
                }

                let context = self.glx.CreateNewContext(
                    *self.display,
                    config,
                    glx::RGBA_TYPE as i32,
                    std::ptr::null(),
                    1,
                );
                if context.is_null() {
                    self.glx.DestroyPbuffer(*self.display, pbuffer);
                    return Err(ErrorKind::BadContext.into());
                }

                if self.glx.MakeContextCurrent(*self.display, pbuffer, pbuffer, context) == 0 {
                    self.glx.DestroyContext(*self.display, context);
                    self.glx.DestroyPbuffer(*self.display, pbuffer);
                    return Err(ErrorKind::BadAccess.into());
                }
                self.glx.MakeContextCurrent(*self.display, 0, 0, std::ptr::null());

                Ok(Probe { context, pbuffer, fbconfig_id })
            }
        })??;

        *self.probe.lock().unwrap() = Some(probe);
        Ok(())
    }

    pub(crate) fn screen(&self) -> i32 {
        self.key.screen
    }

    pub(crate) fn version(&self) -> (i32, i32) {
        self.version
    }

    pub(crate) fn version_string(&self) -> String {
        format!("GLX {}.{}", self.version.0, self.version.1)
    }

    pub(crate) fn features(&self) -> DisplayFeatures {
        self.features
    }

    pub(crate) fn supports_extension(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }

    /// The retained probe resources, if the device bootstrapped.
    pub(crate) fn probe(&self) -> MutexGuard<'_, Option<Probe>> {
        self.probe.lock().unwrap()
    }

    /// Run `callback` with the X error trap armed on this connection.
    pub(crate) fn trap<T>(&self, callback: impl FnOnce() -> T) -> Result<T> {
        last_x_error(self.xlib, *self.display as *mut _, callback)
    }
}

impl Drop for SharedResource {
    fn drop(&mut self) {
        if self.display.is_null() {
            return;
        }

        // Context first, then its drawable, then the connection.
        if let Some(probe) = self.probe.lock().unwrap().take() {
            let result = self.trap(|| unsafe {
                if self.glx.GetCurrentContext() == probe.context {
                    self.glx.MakeContextCurrent(*self.display, 0, 0, std::ptr::null());
                }
                self.glx.DestroyContext(*self.display, probe.context);
                self.glx.DestroyPbuffer(*self.display, probe.pbuffer);
            });
            if let Err(err) = result {
                log::warn!("probe teardown on {} reported: {err}", self.key.connection);
            }
        }

        let _guard = ToolkitLock::global().lock();
        unsafe { (self.xlib.XCloseDisplay)(*self.display as *mut _) };
    }
}

impl fmt::Debug for SharedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedResource")
            .field("connection", &self.key.connection)
            .field("screen", &self.key.screen)
            .field("version", &self.version)
            .field("features", &self.features)
            .finish()
    }
}

fn get_extensions(glx: &Glx, display: *mut GLXDisplay, screen: i32) -> HashSet<String> {
    unsafe {
        let extensions = glx.QueryExtensionsString(display, screen);
        if extensions.is_null() {
            return HashSet::new();
        }
        if let Ok(extensions) = CStr::from_ptr(extensions).to_str() {
            extensions.split(' ').map(String::from).collect()
        } else {
            HashSet::new()
        }
    }
}

fn extract_display_features(
    version: (i32, i32),
    extensions: &HashSet<String>,
    glx_extra: Option<&GlxExtra>,
) -> DisplayFeatures {
    let mut features = DisplayFeatures::empty();

    // The fbconfig path, pbuffers and separate draw and read drawables
    // are all core since 1.3, which bootstrap requires.
    features |= DisplayFeatures::PIXEL_FORMAT_ARB;
    features |= DisplayFeatures::PBUFFER_SURFACES;
    features |= DisplayFeatures::READ_DRAWABLE;

    if version >= (1, 4) || extensions.contains("GLX_ARB_multisample") {
        features |= DisplayFeatures::MULTISAMPLING_PIXEL_FORMATS;
    }

    if extensions.contains("GLX_ARB_fbconfig_float") {
        features |= DisplayFeatures::FLOAT_PIXEL_FORMAT;
    }

    let arb_loaded = glx_extra
        .map_or(false, |extra| extra.CreateContextAttribsARB.is_loaded());
    if arb_loaded && extensions.contains("GLX_ARB_create_context") {
        features |= DisplayFeatures::CONTEXT_CREATION_ARB;
    }

    features
}
