//! Low level OpenGL platform negotiation.
//!
//! The crate picks the native pixel format closest to the capabilities
//! an application asks for, wraps native windows and pbuffers in
//! surfaces of that format, and negotiates the most capable context
//! version the driver will hand out, falling back from the ARB
//! creation path to the legacy one where it must.
//!
//! The entry point is [`Display::new`], which probes the device behind
//! a raw display handle once per process and shares the outcome
//! between every display opened on that device.
//!
//! [`Display::new`]: crate::display::Display::new

#![deny(rust_2018_idioms)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod api;
pub(crate) mod bootstrap;
pub(crate) mod lock;
pub(crate) mod registry;

pub mod caps;
pub mod chooser;
pub mod config;
pub mod context;
pub mod display;
pub mod error;
pub mod surface;

pub(crate) mod private {
    /// Prevent traits from being implemented downstream.
    pub trait Sealed {}

    /// Dispatch a method call to the active backend of an api enum.
    macro_rules! gl_api_dispatch {
        ($self:ident; $enum:ident ( $var:ident ) => $expr:expr; as $enum2:ident ) => {
            match $self {
                #[cfg(glx_backend)]
                $enum::Glx($var) => $enum2::Glx($expr),
                #[cfg(wgl_backend)]
                $enum::Wgl($var) => $enum2::Wgl($expr),
            }
        };
        ($self:ident; $enum:ident ( $var:ident ) => $expr:expr) => {
            match $self {
                #[cfg(glx_backend)]
                $enum::Glx($var) => $expr,
                #[cfg(wgl_backend)]
                $enum::Wgl($var) => $expr,
            }
        };
    }

    pub(crate) use gl_api_dispatch;
}
