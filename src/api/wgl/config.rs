//! Handling of PIXELFORMATDESCRIPTOR and the ARB pixel format path.

use std::cell::Cell;
use std::ffi::c_int;
use std::io::Error as IoError;
use std::mem::{self, MaybeUninit};

use glutin_wgl_sys::wgl_extra;
use windows_sys::Win32::Graphics::Gdi::HDC;
use windows_sys::Win32::Graphics::OpenGL as gl;

use crate::caps::Capabilities;
use crate::config::{FormatDevice, Resolved, ResolutionMethod};
use crate::display::DisplayFeatures;
use crate::error::{ErrorKind, Result};
use crate::surface::SurfaceKind;

use super::resources::SharedResource;

/// The maximum amount of formats to query.
const MAX_QUERY_CONFIGS: usize = 256;

/// Formats with less color than this are ancient palette setups nothing
/// renders into on purpose.
const MIN_COLOR_BITS: u32 = 15;

/// How strictly [`decode_attrs`] treats attributes it doesn't know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeMode {
    /// Unknown attributes are an error.
    Strict,
    /// Unknown attributes are skipped.
    Permissive,
}

/// Encode `caps` as a `wglChoosePixelFormatARB` attribute list.
///
/// Fails when the request asks for less than 15 bits of color, when
/// float pixels are requested without `WGL_ARB_pixel_format_float`, or
/// when the drawable kind has no WGL rendition.
pub(crate) fn encode_attrs(
    caps: &Capabilities,
    features: DisplayFeatures,
    kind: SurfaceKind,
) -> Result<Vec<c_int>> {
    if caps.color_bits() < MIN_COLOR_BITS {
        return Err(ErrorKind::NotSupported("at least 15 bits of color are required").into());
    }

    let pixel_type = if caps.float_pixels() {
        if !features.contains(DisplayFeatures::FLOAT_PIXEL_FORMAT) {
            return Err(ErrorKind::NotSupported(
                "float pixel formats require WGL_ARB_pixel_format_float",
            )
            .into());
        }
        wgl_extra::TYPE_RGBA_FLOAT_ARB
    } else {
        wgl_extra::TYPE_RGBA_ARB
    };

    let mut attrs = Vec::<c_int>::with_capacity(32);

    attrs.push(wgl_extra::SUPPORT_OPENGL_ARB as c_int);
    attrs.push(1);

    match kind {
        SurfaceKind::Window => {
            attrs.push(wgl_extra::DRAW_TO_WINDOW_ARB as c_int);
            attrs.push(1);
        },
        SurfaceKind::Pixmap => {
            attrs.push(wgl_extra::DRAW_TO_BITMAP_ARB as c_int);
            attrs.push(1);
        },
        SurfaceKind::Pbuffer => {
            return Err(ErrorKind::NotSupported("pbuffers aren't supported with wgl").into())
        },
    }

    attrs.push(wgl_extra::PIXEL_TYPE_ARB as c_int);
    attrs.push(pixel_type as c_int);

    attrs.push(wgl_extra::DOUBLE_BUFFER_ARB as c_int);
    attrs.push(caps.double_buffered as c_int);

    attrs.push(wgl_extra::STEREO_ARB as c_int);
    attrs.push(caps.stereo as c_int);

    attrs.push(wgl_extra::RED_BITS_ARB as c_int);
    attrs.push(caps.red_size as c_int);
    attrs.push(wgl_extra::GREEN_BITS_ARB as c_int);
    attrs.push(caps.green_size as c_int);
    attrs.push(wgl_extra::BLUE_BITS_ARB as c_int);
    attrs.push(caps.blue_size as c_int);
    attrs.push(wgl_extra::ALPHA_BITS_ARB as c_int);
    attrs.push(caps.alpha_size as c_int);

    attrs.push(wgl_extra::DEPTH_BITS_ARB as c_int);
    attrs.push(caps.depth_size as c_int);
    attrs.push(wgl_extra::STENCIL_BITS_ARB as c_int);
    attrs.push(caps.stencil_size as c_int);

    if caps.has_accum() {
        attrs.push(wgl_extra::ACCUM_RED_BITS_ARB as c_int);
        attrs.push(caps.accum_red_size as c_int);
        attrs.push(wgl_extra::ACCUM_GREEN_BITS_ARB as c_int);
        attrs.push(caps.accum_green_size as c_int);
        attrs.push(wgl_extra::ACCUM_BLUE_BITS_ARB as c_int);
        attrs.push(caps.accum_blue_size as c_int);
        attrs.push(wgl_extra::ACCUM_ALPHA_BITS_ARB as c_int);
        attrs.push(caps.accum_alpha_size as c_int);
    }

    if features.contains(DisplayFeatures::MULTISAMPLING_PIXEL_FORMATS) && caps.num_samples > 0 {
        attrs.push(wgl_extra::SAMPLE_BUFFERS_ARB as c_int);
        attrs.push(1);
        attrs.push(wgl_extra::SAMPLES_ARB as c_int);
        attrs.push(caps.num_samples as c_int);
    }

    if let Some(hardware_accelerated) = caps.hardware_accelerated {
        attrs.push(wgl_extra::ACCELERATION_ARB as c_int);
        if hardware_accelerated {
            attrs.push(wgl_extra::FULL_ACCELERATION_ARB as c_int);
        } else {
            attrs.push(wgl_extra::NO_ACCELERATION_ARB as c_int);
        }
    }

    if !caps.background_opaque {
        attrs.push(wgl_extra::TRANSPARENT_ARB as c_int);
        attrs.push(1);
    }

    // Terminate the list with zero.
    attrs.push(0);

    Ok(attrs)
}

/// Decode the `(attribute, value)` pairs of one pixel format back into
/// [`Capabilities`].
///
/// A format that can't render to the requested drawable kind decodes to
/// `Ok(None)` so it stays in the candidate list without ever winning.
pub(crate) fn decode_attrs(
    pairs: &[(c_int, c_int)],
    mode: DecodeMode,
    kind: SurfaceKind,
) -> Result<Option<Capabilities>> {
    let mut caps = Capabilities::default();
    let mut draw_to_window = false;
    let mut draw_to_bitmap = false;

    for &(key, value) in pairs {
        match key as u32 {
            wgl_extra::RED_BITS_ARB => caps.red_size = value as u8,
            wgl_extra::GREEN_BITS_ARB => caps.green_size = value as u8,
            wgl_extra::BLUE_BITS_ARB => caps.blue_size = value as u8,
            wgl_extra::ALPHA_BITS_ARB => caps.alpha_size = value as u8,
            wgl_extra::DEPTH_BITS_ARB => caps.depth_size = value as u8,
            wgl_extra::STENCIL_BITS_ARB => caps.stencil_size = value as u8,
            wgl_extra::ACCUM_RED_BITS_ARB => caps.accum_red_size = value as u8,
            wgl_extra::ACCUM_GREEN_BITS_ARB => caps.accum_green_size = value as u8,
            wgl_extra::ACCUM_BLUE_BITS_ARB => caps.accum_blue_size = value as u8,
            wgl_extra::ACCUM_ALPHA_BITS_ARB => caps.accum_alpha_size = value as u8,
            wgl_extra::DOUBLE_BUFFER_ARB => caps.double_buffered = value != 0,
            wgl_extra::STEREO_ARB => caps.stereo = value != 0,
            wgl_extra::SAMPLE_BUFFERS_ARB => caps.sample_buffers = value != 0,
            wgl_extra::SAMPLES_ARB => caps.num_samples = value as u8,
            wgl_extra::PIXEL_TYPE_ARB => {
                caps.float_pixels = value == wgl_extra::TYPE_RGBA_FLOAT_ARB as c_int;
            },
            wgl_extra::DRAW_TO_WINDOW_ARB => draw_to_window = value != 0,
            wgl_extra::DRAW_TO_BITMAP_ARB => draw_to_bitmap = value != 0,
            wgl_extra::ACCELERATION_ARB => {
                caps.hardware_accelerated =
                    Some(value != wgl_extra::NO_ACCELERATION_ARB as c_int);
            },
            wgl_extra::TRANSPARENT_ARB => caps.background_opaque = value == 0,
            wgl_extra::SUPPORT_OPENGL_ARB => (),
            _ if mode == DecodeMode::Permissive => (),
            _ => return Err(ErrorKind::BadAttribute.into()),
        }
    }

    caps.onscreen = draw_to_window;
    caps.pbuffer = false;

    let usable = match kind {
        SurfaceKind::Window => draw_to_window,
        SurfaceKind::Pixmap => draw_to_bitmap,
        SurfaceKind::Pbuffer => false,
    };

    Ok(usable.then_some(caps))
}

/// The attributes [`decode_attrs`] wants read back for a format.
pub(crate) const DECODE_KEYS: [u32; 19] = [
    wgl_extra::RED_BITS_ARB,
    wgl_extra::GREEN_BITS_ARB,
    wgl_extra::BLUE_BITS_ARB,
    wgl_extra::ALPHA_BITS_ARB,
    wgl_extra::DEPTH_BITS_ARB,
    wgl_extra::STENCIL_BITS_ARB,
    wgl_extra::ACCUM_RED_BITS_ARB,
    wgl_extra::ACCUM_GREEN_BITS_ARB,
    wgl_extra::ACCUM_BLUE_BITS_ARB,
    wgl_extra::ACCUM_ALPHA_BITS_ARB,
    wgl_extra::DOUBLE_BUFFER_ARB,
    wgl_extra::STEREO_ARB,
    wgl_extra::SAMPLE_BUFFERS_ARB,
    wgl_extra::SAMPLES_ARB,
    wgl_extra::PIXEL_TYPE_ARB,
    wgl_extra::DRAW_TO_WINDOW_ARB,
    wgl_extra::DRAW_TO_BITMAP_ARB,
    wgl_extra::ACCELERATION_ARB,
    wgl_extra::TRANSPARENT_ARB,
];

/// Encode `caps` as a legacy descriptor for `ChoosePixelFormat`.
pub(crate) fn encode_descriptor(caps: &Capabilities) -> gl::PIXELFORMATDESCRIPTOR {
    let mut dw_flags = gl::PFD_SUPPORT_OPENGL | gl::PFD_DRAW_TO_WINDOW;
    if caps.double_buffered {
        dw_flags |= gl::PFD_DOUBLEBUFFER;
    }
    if caps.stereo {
        dw_flags |= gl::PFD_STEREO;
    }
    match caps.hardware_accelerated {
        Some(true) => dw_flags |= gl::PFD_GENERIC_ACCELERATED,
        Some(false) => dw_flags |= gl::PFD_GENERIC_FORMAT,
        None => (),
    }

    gl::PIXELFORMATDESCRIPTOR {
        nSize: mem::size_of::<gl::PIXELFORMATDESCRIPTOR>() as u16,
        // Should be one according to the docs.
        nVersion: 1,
        dwFlags: dw_flags,
        iPixelType: gl::PFD_TYPE_RGBA,
        // The descriptor field is a single byte while the summed channel
        // sizes need not fit in one.
        cColorBits: caps.color_bits().min(u8::MAX as u32) as u8,
        cRedBits: caps.red_size,
        cRedShift: 0,
        cGreenBits: caps.green_size,
        cGreenShift: 0,
        cBlueBits: caps.blue_size,
        cBlueShift: 0,
        cAlphaBits: caps.alpha_size,
        cAlphaShift: 0,
        cAccumBits: 0,
        cAccumRedBits: caps.accum_red_size,
        cAccumGreenBits: caps.accum_green_size,
        cAccumBlueBits: caps.accum_blue_size,
        cAccumAlphaBits: caps.accum_alpha_size,
        cDepthBits: caps.depth_size,
        cStencilBits: caps.stencil_size,
        cAuxBuffers: 0,
        iLayerType: gl::PFD_MAIN_PLANE,
        bReserved: 0,
        dwLayerMask: 0,
        dwVisibleMask: 0,
        dwDamageMask: 0,
    }
}

/// Read a legacy descriptor back into [`Capabilities`].
///
/// A non-RGBA or non-OpenGL format decodes to `None`.
pub(crate) fn decode_descriptor(descriptor: &gl::PIXELFORMATDESCRIPTOR) -> Option<Capabilities> {
    if descriptor.iPixelType != gl::PFD_TYPE_RGBA
        || descriptor.dwFlags & gl::PFD_SUPPORT_OPENGL == 0
    {
        return None;
    }

    Some(Capabilities {
        red_size: descriptor.cRedBits,
        green_size: descriptor.cGreenBits,
        blue_size: descriptor.cBlueBits,
        alpha_size: descriptor.cAlphaBits,
        accum_red_size: descriptor.cAccumRedBits,
        accum_green_size: descriptor.cAccumGreenBits,
        accum_blue_size: descriptor.cAccumBlueBits,
        accum_alpha_size: descriptor.cAccumAlphaBits,
        depth_size: descriptor.cDepthBits,
        stencil_size: descriptor.cStencilBits,
        double_buffered: descriptor.dwFlags & gl::PFD_DOUBLEBUFFER != 0,
        stereo: descriptor.dwFlags & gl::PFD_STEREO != 0,
        onscreen: descriptor.dwFlags & gl::PFD_DRAW_TO_WINDOW != 0,
        pbuffer: false,
        // Generic formats without the accelerated bit run on the software
        // rasterizer.
        hardware_accelerated: Some(
            descriptor.dwFlags & gl::PFD_GENERIC_FORMAT == 0
                || descriptor.dwFlags & gl::PFD_GENERIC_ACCELERATED != 0,
        ),
        ..Capabilities::default()
    })
}

/// A window's device context presented as a format device for late
/// resolution.
///
/// `wglChoosePixelFormatARB` hands out candidates best first, so the
/// recommendation observed while enumerating is kept for
/// [`FormatDevice::platform_recommended`].
pub(crate) struct HdcDevice<'a> {
    shared: &'a SharedResource,
    hdc: HDC,
    recommended: Cell<Option<i64>>,
}

impl<'a> HdcDevice<'a> {
    pub(crate) fn new(shared: &'a SharedResource, hdc: HDC) -> Self {
        Self { shared, hdc, recommended: Cell::new(None) }
    }

    fn describe(&self, index: c_int) -> Result<gl::PIXELFORMATDESCRIPTOR> {
        unsafe {
            let mut descriptor = MaybeUninit::<gl::PIXELFORMATDESCRIPTOR>::uninit();
            if gl::DescribePixelFormat(
                self.hdc,
                index as _,
                mem::size_of::<gl::PIXELFORMATDESCRIPTOR>() as _,
                descriptor.as_mut_ptr(),
            ) == 0
            {
                return Err(IoError::last_os_error().into());
            }
            Ok(descriptor.assume_init())
        }
    }

    fn decode_arb_format(&self, index: c_int) -> Option<Capabilities> {
        let wgl_extra = self.shared.wgl_extra?;
        let pairs: Vec<(c_int, c_int)> = DECODE_KEYS
            .iter()
            .filter_map(|&key| unsafe {
                let attr = key as c_int;
                let mut value = 0;
                let queried = wgl_extra.GetPixelFormatAttribivARB(
                    self.hdc as *const _,
                    index,
                    gl::PFD_MAIN_PLANE as _,
                    1,
                    &attr,
                    &mut value,
                );
                (queried != 0).then_some((attr, value))
            })
            .collect();

        decode_attrs(&pairs, DecodeMode::Permissive, SurfaceKind::Window).unwrap_or(None)
    }
}

impl FormatDevice for HdcDevice<'_> {
    fn current_format(&self) -> Result<Option<Resolved>> {
        let index = unsafe { gl::GetPixelFormat(self.hdc) };
        if index == 0 {
            return Ok(None);
        }

        if self.shared.features().contains(DisplayFeatures::PIXEL_FORMAT_ARB) {
            if let Some(caps) = self.decode_arb_format(index) {
                return Ok(Some(Resolved {
                    caps,
                    native_id: index as i64,
                    method: ResolutionMethod::Extension,
                }));
            }
        }

        let caps = decode_descriptor(&self.describe(index)?).ok_or(ErrorKind::BadConfig)?;
        Ok(Some(Resolved {
            caps,
            native_id: index as i64,
            method: ResolutionMethod::LegacyDescriptor,
        }))
    }

    fn enumerate_extended(
        &self,
        desired: &Capabilities,
    ) -> Result<Option<Vec<(i64, Option<Capabilities>)>>> {
        if !self.shared.features().contains(DisplayFeatures::PIXEL_FORMAT_ARB) {
            return Ok(None);
        }
        let wgl_extra = match self.shared.wgl_extra {
            Some(wgl_extra) => wgl_extra,
            None => return Ok(None),
        };

        let attrs = encode_attrs(desired, self.shared.features(), SurfaceKind::Window)?;

        unsafe {
            let mut num_configs = 0;
            let mut configs = Vec::<c_int>::with_capacity(MAX_QUERY_CONFIGS);

            if wgl_extra.ChoosePixelFormatARB(
                self.hdc as *const _,
                attrs.as_ptr().cast(),
                std::ptr::null(),
                configs.capacity() as _,
                configs.as_mut_ptr().cast(),
                &mut num_configs,
            ) == 0
            {
                return Err(IoError::last_os_error().into());
            }
            configs.set_len(num_configs as _);

            if configs.is_empty() {
                return Err(ErrorKind::SelectionExhausted.into());
            }

            self.recommended.set(Some(configs[0] as i64));

            Ok(Some(
                configs
                    .into_iter()
                    .map(|index| (index as i64, self.decode_arb_format(index)))
                    .collect(),
            ))
        }
    }

    fn enumerate_legacy(&self, desired: &Capabilities) -> Result<Vec<(i64, Option<Capabilities>)>> {
        let descriptor = encode_descriptor(desired);

        unsafe {
            let recommended = gl::ChoosePixelFormat(self.hdc, &descriptor);
            self.recommended.set((recommended != 0).then_some(recommended as i64));

            // DescribePixelFormat with a null descriptor reports how many
            // formats the device has.
            let count = gl::DescribePixelFormat(self.hdc, 1, 0, std::ptr::null_mut());
            if count == 0 {
                return Err(ErrorKind::SelectionExhausted.into());
            }

            let candidates = (1..=count)
                .map(|index| {
                    let caps =
                        self.describe(index as c_int).ok().and_then(|d| decode_descriptor(&d));
                    (index as i64, caps)
                })
                .collect();
            Ok(candidates)
        }
    }

    fn platform_recommended(&self, _desired: &Capabilities) -> Option<i64> {
        self.recommended.get()
    }

    fn set_format(&self, native_id: i64) -> Result<()> {
        let descriptor = self.describe(native_id as c_int)?;
        unsafe {
            if gl::SetPixelFormat(self.hdc, native_id as c_int, &descriptor) == 0 {
                return Err(IoError::last_os_error().into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CapabilitiesBuilder;

    fn all_features() -> DisplayFeatures {
        DisplayFeatures::PIXEL_FORMAT_ARB
            | DisplayFeatures::MULTISAMPLING_PIXEL_FORMATS
            | DisplayFeatures::FLOAT_PIXEL_FORMAT
            | DisplayFeatures::CONTEXT_CREATION_ARB
    }

    fn pairs_of(attrs: &[c_int]) -> Vec<(c_int, c_int)> {
        assert_eq!(attrs.last(), Some(&0), "attribute list must be zero terminated");
        attrs[..attrs.len() - 1].chunks(2).map(|pair| (pair[0], pair[1])).collect()
    }

    #[test]
    fn encoded_attrs_decode_back() {
        let caps = CapabilitiesBuilder::new()
            .with_color_sizes(8, 8, 8)
            .with_alpha_size(8)
            .with_depth_size(24)
            .with_stencil_size(8)
            .with_multisampling(4)
            .prefer_hardware_accelerated(Some(true))
            .build();

        let attrs = encode_attrs(&caps, all_features(), SurfaceKind::Window).unwrap();
        let decoded = decode_attrs(&pairs_of(&attrs), DecodeMode::Strict, SurfaceKind::Window)
            .unwrap()
            .unwrap();

        assert_eq!(decoded.red_size(), 8);
        assert_eq!(decoded.alpha_size(), 8);
        assert_eq!(decoded.depth_size(), 24);
        assert_eq!(decoded.num_samples(), 4);
        assert_eq!(decoded.hardware_accelerated, Some(true));
    }

    #[test]
    fn pbuffers_are_rejected() {
        let caps = CapabilitiesBuilder::new().with_pbuffer(true).build();
        let err = encode_attrs(&caps, all_features(), SurfaceKind::Pbuffer).unwrap_err();
        assert!(err.not_supported());
    }

    #[test]
    fn descriptor_round_trips() {
        let caps = CapabilitiesBuilder::new()
            .with_color_sizes(8, 8, 8)
            .with_alpha_size(8)
            .with_depth_size(24)
            .with_stencil_size(8)
            .build();

        let descriptor = encode_descriptor(&caps);
        let decoded = decode_descriptor(&descriptor).unwrap();

        assert_eq!(decoded.color_bits(), 24);
        assert_eq!(decoded.depth_size(), 24);
        assert!(decoded.double_buffered);
    }

    #[test]
    fn non_rgba_descriptor_is_nulled() {
        let caps = CapabilitiesBuilder::new().build();
        let mut descriptor = encode_descriptor(&caps);
        descriptor.iPixelType = gl::PFD_TYPE_COLORINDEX;
        assert!(decode_descriptor(&descriptor).is_none());
    }

    #[test]
    fn generic_software_format_reads_as_unaccelerated() {
        let caps = CapabilitiesBuilder::new().prefer_hardware_accelerated(Some(false)).build();
        let descriptor = encode_descriptor(&caps);
        let decoded = decode_descriptor(&descriptor).unwrap();
        assert_eq!(decoded.hardware_accelerated, Some(false));
    }

    #[test]
    fn shallow_color_is_rejected() {
        let caps = CapabilitiesBuilder::new().with_color_sizes(4, 4, 4).build();
        let err = encode_attrs(&caps, all_features(), SurfaceKind::Window).unwrap_err();
        assert!(err.not_supported());
    }

    #[test]
    fn oversized_color_request_saturates_the_descriptor() {
        let caps = CapabilitiesBuilder::new().with_color_sizes(255, 255, 255).build();
        let descriptor = encode_descriptor(&caps);
        assert_eq!(descriptor.cColorBits, u8::MAX);
    }

    #[test]
    fn float_pixels_need_the_extension() {
        let caps = CapabilitiesBuilder::new().with_float_pixels(true).build();
        let features = all_features() - DisplayFeatures::FLOAT_PIXEL_FORMAT;
        let err = encode_attrs(&caps, features, SurfaceKind::Window).unwrap_err();
        assert!(err.not_supported());
    }
}
