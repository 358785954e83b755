//! The platform backends.

#[cfg(glx_backend)]
pub mod glx;

#[cfg(wgl_backend)]
pub mod wgl;
