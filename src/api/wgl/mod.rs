//! WGL platform support.
//!
//! The extension entry points only resolve while a context is current,
//! so the process bootstraps them once through a hidden probe window and
//! a throwaway legacy context, and shares the outcome afterwards.

use std::ops::Deref;
use std::sync::Arc;

use glutin_wgl_sys::{wgl, wgl_extra};
use once_cell::sync::Lazy;

use crate::bootstrap::BootstrapThread;
use crate::error::Result;
use crate::registry::SharedRegistry;

pub(crate) mod config;
pub mod context;
pub mod display;
pub(crate) mod resources;
pub mod surface;

use resources::SharedResource;

/// The loaded extension entry points.
///
/// The generated table holds raw pointers, hence the manual `Sync`.
pub(crate) struct WglExtra(wgl_extra::Wgl);

unsafe impl Send for WglExtra {}
unsafe impl Sync for WglExtra {}

impl WglExtra {
    pub(crate) fn new(inner: wgl_extra::Wgl) -> Self {
        Self(inner)
    }
}

impl Deref for WglExtra {
    type Target = wgl_extra::Wgl;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// WGL talks to whatever driver sits behind the process, so there is one
/// device per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DeviceKey;

static SHARED_RESOURCES: Lazy<SharedRegistry<DeviceKey, SharedResource>> =
    Lazy::new(SharedRegistry::new);

/// The thread the probe window and its context live on.
static BOOTSTRAP: Lazy<BootstrapThread> = Lazy::new(|| BootstrapThread::spawn("wgl bootstrap"));

/// The process' shared resource, bootstrapping it on the dedicated
/// thread on first use.
pub(crate) fn shared_resource() -> Result<Arc<SharedResource>> {
    SHARED_RESOURCES.get_or_create(&DeviceKey, || BOOTSTRAP.execute(SharedResource::bootstrap))
}

/// Drop the registry's reference. Idempotent; the native teardown runs
/// once the last display goes away.
pub(crate) fn purge_shared_resource() {
    SHARED_RESOURCES.remove(&DeviceKey);
}

pub(crate) use wgl::types::HGLRC;
