//! Translation between [`Capabilities`] and GLX attribute lists, plus the
//! fbconfig enumeration built on it.
//!
//! The wire format is the GLX one: a flat list of `(key, value)` pairs of
//! `c_int`, terminated by `0`. Encoding and decoding are pure functions
//! over that shape; the native glue at the bottom only shovels attribute
//! values in and out of the server.

use std::ffi::c_int;

use glutin_glx_sys::glx::types::{Display as GLXDisplay, GLXFBConfig};
use glutin_glx_sys::{glx, glx_extra};

use crate::caps::Capabilities;
use crate::display::DisplayFeatures;
use crate::error::{ErrorKind, Result};
use crate::lock::ToolkitLock;
use crate::surface::SurfaceKind;

use super::Glx;

/// 5-6-5 is the shallowest color layout worth asking a desktop GL driver
/// for; anything below is a palettized or otherwise degenerate format.
const MIN_COLOR_BITS: u32 = 15;

/// How [`decode_attrs`] treats keys it doesn't recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeMode {
    /// Unknown keys are an error.
    Strict,
    /// Unknown keys are skipped.
    Permissive,
}

fn drawable_bits(kind: SurfaceKind) -> c_int {
    match kind {
        SurfaceKind::Window => glx::WINDOW_BIT as c_int,
        SurfaceKind::Pbuffer => glx::PBUFFER_BIT as c_int,
        SurfaceKind::Pixmap => glx::PIXMAP_BIT as c_int,
    }
}

/// Encode the desired capabilities as a `glXChooseFBConfig` attribute
/// list.
///
/// # Errors
///
/// [`ErrorKind::NotSupported`] when less than 15 bits of color are asked
/// for, or when float pixels are requested on a display without
/// `GLX_ARB_fbconfig_float`.
pub(crate) fn encode_attrs(
    caps: &Capabilities,
    features: DisplayFeatures,
    kind: SurfaceKind,
) -> Result<Vec<c_int>> {
    if caps.color_bits() < MIN_COLOR_BITS {
        return Err(ErrorKind::NotSupported("at least 15 bits of color are required").into());
    }

    let render_type = if caps.float_pixels() {
        if !features.contains(DisplayFeatures::FLOAT_PIXEL_FORMAT) {
            return Err(
                ErrorKind::NotSupported("float pixel formats require GLX_ARB_fbconfig_float")
                    .into(),
            );
        }
        glx_extra::RGBA_FLOAT_BIT_ARB as c_int
    } else {
        glx::RGBA_BIT as c_int
    };

    let mut attrs = Vec::<c_int>::with_capacity(40);
    let mut push = |key: c_int, value: c_int| attrs.extend_from_slice(&[key, value]);

    push(glx::DRAWABLE_TYPE as c_int, drawable_bits(kind));
    push(glx::RENDER_TYPE as c_int, render_type);
    if kind == SurfaceKind::Window {
        push(glx::X_RENDERABLE as c_int, 1);
    }

    push(glx::DOUBLEBUFFER as c_int, caps.double_buffered as c_int);
    push(glx::STEREO as c_int, caps.stereo as c_int);

    push(glx::RED_SIZE as c_int, caps.red_size as c_int);
    push(glx::GREEN_SIZE as c_int, caps.green_size as c_int);
    push(glx::BLUE_SIZE as c_int, caps.blue_size as c_int);
    push(glx::ALPHA_SIZE as c_int, caps.alpha_size as c_int);

    push(glx::DEPTH_SIZE as c_int, caps.depth_size as c_int);
    push(glx::STENCIL_SIZE as c_int, caps.stencil_size as c_int);

    if caps.has_accum() {
        push(glx::ACCUM_RED_SIZE as c_int, caps.accum_red_size as c_int);
        push(glx::ACCUM_GREEN_SIZE as c_int, caps.accum_green_size as c_int);
        push(glx::ACCUM_BLUE_SIZE as c_int, caps.accum_blue_size as c_int);
        push(glx::ACCUM_ALPHA_SIZE as c_int, caps.accum_alpha_size as c_int);
    }

    if caps.sample_buffers && features.contains(DisplayFeatures::MULTISAMPLING_PIXEL_FORMATS) {
        push(glx::SAMPLE_BUFFERS as c_int, 1);
        push(glx::SAMPLES as c_int, caps.num_samples as c_int);
    }

    if let Some(hardware_accelerated) = caps.hardware_accelerated {
        let caveat =
            if hardware_accelerated { glx::NONE as c_int } else { glx::SLOW_CONFIG as c_int };
        push(glx::CONFIG_CAVEAT as c_int, caveat);
    }

    if !caps.background_opaque {
        push(glx::TRANSPARENT_TYPE as c_int, glx::TRANSPARENT_RGB as c_int);
        push(glx::TRANSPARENT_RED_VALUE as c_int, caps.transparent_red_value as c_int);
        push(glx::TRANSPARENT_GREEN_VALUE as c_int, caps.transparent_green_value as c_int);
        push(glx::TRANSPARENT_BLUE_VALUE as c_int, caps.transparent_blue_value as c_int);
        push(glx::TRANSPARENT_ALPHA_VALUE as c_int, caps.transparent_alpha_value as c_int);
    }

    attrs.push(0);
    Ok(attrs)
}

/// Decode `(key, value)` pairs read back from an fbconfig.
///
/// `Ok(None)` means the format is valid but doesn't serve drawables of the
/// requested kind; such a candidate stays in the enumeration, unusable,
/// so indices keep lining up with the platform's.
pub(crate) fn decode_attrs(
    pairs: &[(c_int, c_int)],
    mode: DecodeMode,
    kind: SurfaceKind,
) -> Result<Option<Capabilities>> {
    let mut caps = Capabilities::default();
    let mut drawable_type = None;

    for &(key, value) in pairs {
        match key as u32 {
            glx::RED_SIZE => caps.red_size = value as u8,
            glx::GREEN_SIZE => caps.green_size = value as u8,
            glx::BLUE_SIZE => caps.blue_size = value as u8,
            glx::ALPHA_SIZE => caps.alpha_size = value as u8,
            glx::DEPTH_SIZE => caps.depth_size = value as u8,
            glx::STENCIL_SIZE => caps.stencil_size = value as u8,
            glx::ACCUM_RED_SIZE => caps.accum_red_size = value as u8,
            glx::ACCUM_GREEN_SIZE => caps.accum_green_size = value as u8,
            glx::ACCUM_BLUE_SIZE => caps.accum_blue_size = value as u8,
            glx::ACCUM_ALPHA_SIZE => caps.accum_alpha_size = value as u8,
            glx::DOUBLEBUFFER => caps.double_buffered = value != 0,
            glx::STEREO => caps.stereo = value != 0,
            glx::SAMPLE_BUFFERS => caps.sample_buffers = value != 0,
            glx::SAMPLES => caps.num_samples = value as u8,
            glx::RENDER_TYPE => {
                caps.float_pixels = value & glx_extra::RGBA_FLOAT_BIT_ARB as c_int != 0
            },
            glx::DRAWABLE_TYPE => drawable_type = Some(value),
            glx::CONFIG_CAVEAT => {
                caps.hardware_accelerated = Some(value != glx::SLOW_CONFIG as c_int)
            },
            glx::TRANSPARENT_TYPE => caps.background_opaque = value == glx::NONE as c_int,
            glx::TRANSPARENT_RED_VALUE => caps.transparent_red_value = value,
            glx::TRANSPARENT_GREEN_VALUE => caps.transparent_green_value = value,
            glx::TRANSPARENT_BLUE_VALUE => caps.transparent_blue_value = value,
            glx::TRANSPARENT_ALPHA_VALUE => caps.transparent_alpha_value = value,
            // Identity, not a capability.
            glx::FBCONFIG_ID | glx::X_RENDERABLE => (),
            _ if mode == DecodeMode::Permissive => (),
            _ => return Err(ErrorKind::BadAttribute.into()),
        }
    }

    if let Some(drawable_type) = drawable_type {
        caps.onscreen = drawable_type & glx::WINDOW_BIT as c_int != 0;
        caps.pbuffer = drawable_type & glx::PBUFFER_BIT as c_int != 0;
        if drawable_type & drawable_bits(kind) == 0 {
            return Ok(None);
        }
    }

    Ok(Some(caps))
}

/// Attribute keys read back from every fbconfig during enumeration.
const DECODE_KEYS: &[u32] = &[
    glx::DRAWABLE_TYPE,
    glx::RENDER_TYPE,
    glx::DOUBLEBUFFER,
    glx::STEREO,
    glx::RED_SIZE,
    glx::GREEN_SIZE,
    glx::BLUE_SIZE,
    glx::ALPHA_SIZE,
    glx::DEPTH_SIZE,
    glx::STENCIL_SIZE,
    glx::ACCUM_RED_SIZE,
    glx::ACCUM_GREEN_SIZE,
    glx::ACCUM_BLUE_SIZE,
    glx::ACCUM_ALPHA_SIZE,
    glx::SAMPLE_BUFFERS,
    glx::SAMPLES,
    glx::CONFIG_CAVEAT,
    glx::TRANSPARENT_TYPE,
    glx::TRANSPARENT_RED_VALUE,
    glx::TRANSPARENT_GREEN_VALUE,
    glx::TRANSPARENT_BLUE_VALUE,
    glx::TRANSPARENT_ALPHA_VALUE,
];

/// One attribute of an fbconfig.
pub(crate) fn raw_attribute(
    glx: &Glx,
    display: *mut GLXDisplay,
    config: GLXFBConfig,
    attribute: u32,
) -> Option<c_int> {
    let _guard = ToolkitLock::global().lock();
    unsafe {
        let mut value = 0;
        if glx.GetFBConfigAttrib(display, config, attribute as c_int, &mut value) == 0 {
            Some(value)
        } else {
            None
        }
    }
}

/// Read an fbconfig back into [`Capabilities`].
pub(crate) fn decode_fbconfig(
    glx: &Glx,
    display: *mut GLXDisplay,
    config: GLXFBConfig,
    kind: SurfaceKind,
) -> Result<Option<Capabilities>> {
    let pairs: Vec<_> = DECODE_KEYS
        .iter()
        .filter_map(|&key| raw_attribute(glx, display, config, key).map(|value| (key as c_int, value)))
        .collect();
    decode_attrs(&pairs, DecodeMode::Permissive, kind)
}

/// The `GLXFBConfig` id of `config`.
pub(crate) fn fbconfig_id(glx: &Glx, display: *mut GLXDisplay, config: GLXFBConfig) -> Option<i64> {
    raw_attribute(glx, display, config, glx::FBCONFIG_ID).map(|id| id as i64)
}

/// Every candidate of the screen, with the platform's own recommendation.
///
/// The candidate list is always the full `glXGetFBConfigs` enumeration, so
/// a chooser sees every format the screen has. `glXChooseFBConfig` hands
/// back the formats it considers matches, best first; the head of a
/// non-empty result only serves as the recommendation.
pub(crate) fn enumerate_candidates(
    glx: &Glx,
    xlib: &x11_dl::xlib::Xlib,
    display: *mut GLXDisplay,
    screen: i32,
    desired: &Capabilities,
    features: DisplayFeatures,
    kind: SurfaceKind,
) -> Result<(Vec<(i64, Option<Capabilities>)>, Option<i64>)> {
    let attrs = encode_attrs(desired, features, kind)?;
    let _guard = ToolkitLock::global().lock();

    unsafe {
        let mut matched = 0;
        let chosen = glx.ChooseFBConfig(display, screen, attrs.as_ptr(), &mut matched);
        let mut recommended = None;
        if !chosen.is_null() {
            if matched > 0 {
                recommended = fbconfig_id(glx, display, *chosen);
            }
            (xlib.XFree)(chosen as *mut _);
        }

        let mut count = 0;
        let configs = glx.GetFBConfigs(display, screen, &mut count);
        if configs.is_null() || count == 0 {
            return Err(ErrorKind::SelectionExhausted.into());
        }

        // Copy out before XFree so the server memory never outlives this
        // scope.
        let raw_configs: Vec<GLXFBConfig> =
            std::slice::from_raw_parts(configs, count as usize).to_vec();
        (xlib.XFree)(configs as *mut _);

        let candidates: Vec<(i64, Option<Capabilities>)> = raw_configs
            .iter()
            .map(|&config| {
                let id = fbconfig_id(glx, display, config).unwrap_or(0);
                let caps = decode_fbconfig(glx, display, config, kind).unwrap_or(None);
                (id, caps)
            })
            .collect();

        Ok((candidates, recommended))
    }
}

/// Look an fbconfig up by its id.
pub(crate) fn find_fbconfig(
    glx: &Glx,
    xlib: &x11_dl::xlib::Xlib,
    display: *mut GLXDisplay,
    screen: i32,
    id: i64,
) -> Result<GLXFBConfig> {
    let attrs = [glx::FBCONFIG_ID as c_int, id as c_int, 0];
    let _guard = ToolkitLock::global().lock();
    unsafe {
        let mut count = 0;
        let configs = glx.ChooseFBConfig(display, screen, attrs.as_ptr(), &mut count);
        if configs.is_null() || count == 0 {
            return Err(ErrorKind::BadConfig.into());
        }
        let config = *configs;
        (xlib.XFree)(configs as *mut _);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CapabilitiesBuilder;

    fn all_features() -> DisplayFeatures {
        DisplayFeatures::MULTISAMPLING_PIXEL_FORMATS | DisplayFeatures::FLOAT_PIXEL_FORMAT
    }

    fn pairs_of(attrs: &[c_int]) -> Vec<(c_int, c_int)> {
        assert_eq!(attrs.last(), Some(&0), "attribute list must be 0-terminated");
        let body = &attrs[..attrs.len() - 1];
        assert_eq!(body.len() % 2, 0);
        body.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
    }

    #[test]
    fn every_encoded_key_decodes() {
        let caps = CapabilitiesBuilder::new()
            .with_color_sizes(8, 8, 8)
            .with_alpha_size(8)
            .with_accum_sizes(16, 16, 16, 0)
            .with_multisampling(4)
            .with_float_pixels(true)
            .with_background_opaque(false)
            .with_transparent_values(255, 0, 255, 0)
            .prefer_hardware_accelerated(Some(true))
            .build();

        let attrs = encode_attrs(&caps, all_features(), SurfaceKind::Window).unwrap();
        let decoded =
            decode_attrs(&pairs_of(&attrs), DecodeMode::Strict, SurfaceKind::Window).unwrap();
        let decoded = decoded.expect("window bit was encoded, so the kind matches");

        assert_eq!(decoded, caps);
    }

    #[test]
    fn modest_set_round_trips() {
        let caps = CapabilitiesBuilder::new()
            .with_color_sizes(5, 6, 5)
            .with_alpha_size(0)
            .with_depth_size(16)
            .with_stencil_size(0)
            .with_double_buffering(false)
            .build();

        let attrs = encode_attrs(&caps, DisplayFeatures::empty(), SurfaceKind::Window).unwrap();
        let decoded =
            decode_attrs(&pairs_of(&attrs), DecodeMode::Strict, SurfaceKind::Window).unwrap();
        assert_eq!(decoded, Some(caps));
    }

    #[test]
    fn shallow_color_is_rejected() {
        let caps = CapabilitiesBuilder::new().with_color_sizes(4, 4, 4).build();
        let err = encode_attrs(&caps, all_features(), SurfaceKind::Window).unwrap_err();
        assert!(err.not_supported());
    }

    #[test]
    fn float_pixels_need_the_extension() {
        let caps = CapabilitiesBuilder::new().with_float_pixels(true).build();
        let err = encode_attrs(&caps, DisplayFeatures::empty(), SurfaceKind::Window).unwrap_err();
        assert!(err.not_supported());

        assert!(encode_attrs(&caps, all_features(), SurfaceKind::Window).is_ok());
    }

    #[test]
    fn multisampling_is_omitted_without_the_feature() {
        let caps = CapabilitiesBuilder::new().with_multisampling(4).build();
        let attrs = encode_attrs(&caps, DisplayFeatures::empty(), SurfaceKind::Window).unwrap();
        assert!(!attrs.contains(&(glx::SAMPLE_BUFFERS as c_int)));

        let attrs = encode_attrs(&caps, all_features(), SurfaceKind::Window).unwrap();
        assert!(attrs.contains(&(glx::SAMPLE_BUFFERS as c_int)));
    }

    #[test]
    fn accum_is_only_encoded_when_requested() {
        let caps = CapabilitiesBuilder::new().build();
        let attrs = encode_attrs(&caps, all_features(), SurfaceKind::Window).unwrap();
        assert!(!attrs.contains(&(glx::ACCUM_RED_SIZE as c_int)));
    }

    #[test]
    fn unknown_key_errors_only_in_strict_mode() {
        let pairs = [(0x7fff_0000, 1), (glx::RED_SIZE as c_int, 8)];

        let err = decode_attrs(&pairs, DecodeMode::Strict, SurfaceKind::Window).unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::BadAttribute);

        let decoded =
            decode_attrs(&pairs, DecodeMode::Permissive, SurfaceKind::Window).unwrap().unwrap();
        assert_eq!(decoded.red_size(), 8);
    }

    #[test]
    fn drawable_kind_mismatch_nulls_the_candidate() {
        let pairs = [(glx::DRAWABLE_TYPE as c_int, glx::PBUFFER_BIT as c_int)];

        let as_window = decode_attrs(&pairs, DecodeMode::Strict, SurfaceKind::Window).unwrap();
        assert!(as_window.is_none());

        let as_pbuffer =
            decode_attrs(&pairs, DecodeMode::Strict, SurfaceKind::Pbuffer).unwrap().unwrap();
        assert!(as_pbuffer.pbuffer());
        assert!(!as_pbuffer.onscreen());
    }

    #[test]
    fn transparency_is_only_encoded_when_translucent() {
        let opaque = CapabilitiesBuilder::new().build();
        let attrs = encode_attrs(&opaque, all_features(), SurfaceKind::Window).unwrap();
        assert!(!attrs.contains(&(glx::TRANSPARENT_TYPE as c_int)));

        let translucent = CapabilitiesBuilder::new().with_background_opaque(false).build();
        let attrs = encode_attrs(&translucent, all_features(), SurfaceKind::Window).unwrap();
        assert!(attrs.contains(&(glx::TRANSPARENT_TYPE as c_int)));
    }
}
