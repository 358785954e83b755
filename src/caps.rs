//! The framebuffer capability value model.
//!
//! [`Capabilities`] describes one renderable surface configuration: color,
//! alpha, depth, stencil and accumulation sizes, buffering mode and the
//! multisample/float/transparency options. Desired sets are assembled with
//! the [`CapabilitiesBuilder`]; sets decoded from a native pixel format or
//! visual are handed out as plain immutable values.

use std::cmp::Ordering;

/// An immutable set of framebuffer attributes.
///
/// The same type describes both a desired configuration (built with
/// [`CapabilitiesBuilder`]) and a configuration decoded from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// Bits of red in the color buffer.
    pub(crate) red_size: u8,

    /// Bits of green in the color buffer.
    pub(crate) green_size: u8,

    /// Bits of blue in the color buffer.
    pub(crate) blue_size: u8,

    /// Bits of alpha in the color buffer.
    pub(crate) alpha_size: u8,

    /// Bits of red in the accumulation buffer.
    pub(crate) accum_red_size: u8,

    /// Bits of green in the accumulation buffer.
    pub(crate) accum_green_size: u8,

    /// Bits of blue in the accumulation buffer.
    pub(crate) accum_blue_size: u8,

    /// Bits of alpha in the accumulation buffer.
    pub(crate) accum_alpha_size: u8,

    /// Bits of depth in the depth buffer.
    pub(crate) depth_size: u8,

    /// Bits of stencil in the stencil buffer.
    pub(crate) stencil_size: u8,

    /// Whether the back buffer is present.
    pub(crate) double_buffered: bool,

    /// Whether stereo pairs are present.
    pub(crate) stereo: bool,

    /// Whether a multisample buffer is present.
    pub(crate) sample_buffers: bool,

    /// The amount of samples per pixel.
    pub(crate) num_samples: u8,

    /// Whether the surface is an onscreen window.
    pub(crate) onscreen: bool,

    /// Whether the surface is a pbuffer.
    pub(crate) pbuffer: bool,

    /// Whether the color buffer uses floating point components.
    pub(crate) float_pixels: bool,

    /// Whether a pbuffer is bindable as a texture.
    pub(crate) pbuffer_render_to_texture: bool,

    /// Whether a pbuffer is bindable as a rectangle texture.
    pub(crate) pbuffer_render_to_texture_rect: bool,

    /// Whether the surface background is opaque.
    pub(crate) background_opaque: bool,

    /// Transparent color key, meaningful only when not opaque.
    pub(crate) transparent_red_value: i32,
    pub(crate) transparent_green_value: i32,
    pub(crate) transparent_blue_value: i32,
    pub(crate) transparent_alpha_value: i32,

    /// The preference for hardware accelerated formats.
    pub(crate) hardware_accelerated: Option<bool>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            red_size: 8,
            green_size: 8,
            blue_size: 8,
            alpha_size: 8,

            accum_red_size: 0,
            accum_green_size: 0,
            accum_blue_size: 0,
            accum_alpha_size: 0,

            depth_size: 24,
            stencil_size: 8,

            double_buffered: true,
            stereo: false,

            sample_buffers: false,
            num_samples: 0,

            onscreen: true,
            pbuffer: false,

            float_pixels: false,

            pbuffer_render_to_texture: false,
            pbuffer_render_to_texture_rect: false,

            background_opaque: true,
            transparent_red_value: 0,
            transparent_green_value: 0,
            transparent_blue_value: 0,
            transparent_alpha_value: 0,

            hardware_accelerated: None,
        }
    }
}

impl Capabilities {
    /// The size of the red component in bits.
    #[inline]
    pub fn red_size(&self) -> u8 {
        self.red_size
    }

    /// The size of the green component in bits.
    #[inline]
    pub fn green_size(&self) -> u8 {
        self.green_size
    }

    /// The size of the blue component in bits.
    #[inline]
    pub fn blue_size(&self) -> u8 {
        self.blue_size
    }

    /// The size of the alpha component in bits.
    #[inline]
    pub fn alpha_size(&self) -> u8 {
        self.alpha_size
    }

    /// The size of the depth buffer in bits.
    #[inline]
    pub fn depth_size(&self) -> u8 {
        self.depth_size
    }

    /// The size of the stencil buffer in bits.
    #[inline]
    pub fn stencil_size(&self) -> u8 {
        self.stencil_size
    }

    /// The number of samples in the multisample buffer.
    #[inline]
    pub fn num_samples(&self) -> u8 {
        self.num_samples
    }

    /// Whether the back buffer is present.
    #[inline]
    pub fn double_buffered(&self) -> bool {
        self.double_buffered
    }

    /// Whether the surface is an onscreen window.
    #[inline]
    pub fn onscreen(&self) -> bool {
        self.onscreen
    }

    /// Whether the surface is a pbuffer.
    #[inline]
    pub fn pbuffer(&self) -> bool {
        self.pbuffer
    }

    /// Whether the color buffer uses floating point components.
    #[inline]
    pub fn float_pixels(&self) -> bool {
        self.float_pixels
    }

    /// Whether the surface background is opaque.
    #[inline]
    pub fn background_opaque(&self) -> bool {
        self.background_opaque
    }

    /// The sum of the color buffer component sizes, excluding alpha.
    #[inline]
    pub fn color_bits(&self) -> u32 {
        self.red_size as u32 + self.green_size as u32 + self.blue_size as u32
    }

    /// The sum of all four color buffer component sizes, used by the
    /// chooser's scoring.
    #[inline]
    pub fn rgba_sum(&self) -> i32 {
        self.red_size as i32
            + self.green_size as i32
            + self.blue_size as i32
            + self.alpha_size as i32
    }

    /// A coarse ordering key: the product of the RGBA component sizes, with
    /// a zero alpha treated as one so it doesn't zero the product.
    ///
    /// This is only a tie-breaking heuristic. It ignores depth, stencil and
    /// every other field, so it must never be used as a total order.
    #[inline]
    pub fn rgba_weight(&self) -> u32 {
        self.red_size as u32
            * self.green_size as u32
            * self.blue_size as u32
            * (self.alpha_size as u32).max(1)
    }

    /// Compare two sets by their [`rgba_weight`][Self::rgba_weight] only.
    #[inline]
    pub fn cmp_rgba_weight(&self, other: &Self) -> Ordering {
        self.rgba_weight().cmp(&other.rgba_weight())
    }

    /// Whether any accumulation buffer bits were requested.
    #[inline]
    pub(crate) fn has_accum(&self) -> bool {
        self.accum_red_size > 0
            || self.accum_green_size > 0
            || self.accum_blue_size > 0
            || self.accum_alpha_size > 0
    }
}

/// Builder for a desired [`Capabilities`] set.
#[derive(Debug, Default, Clone)]
pub struct CapabilitiesBuilder {
    caps: Capabilities,
}

impl CapabilitiesBuilder {
    /// Create a new capabilities builder.
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// Sizes of the color buffer components in bits.
    ///
    /// By default `8`, `8`, `8` is requested.
    #[inline]
    pub fn with_color_sizes(mut self, red: u8, green: u8, blue: u8) -> Self {
        self.caps.red_size = red;
        self.caps.green_size = green;
        self.caps.blue_size = blue;
        self
    }

    /// Number of alpha bits in the color buffer.
    ///
    /// By default `8` is requested.
    #[inline]
    pub fn with_alpha_size(mut self, alpha_size: u8) -> Self {
        self.caps.alpha_size = alpha_size;
        self
    }

    /// Sizes of the accumulation buffer components in bits.
    ///
    /// By default `0` is requested for all of them.
    #[inline]
    pub fn with_accum_sizes(mut self, red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        self.caps.accum_red_size = red;
        self.caps.accum_green_size = green;
        self.caps.accum_blue_size = blue;
        self.caps.accum_alpha_size = alpha;
        self
    }

    /// Number of bits in the depth buffer.
    ///
    /// By default `24` is requested.
    #[inline]
    pub fn with_depth_size(mut self, depth_size: u8) -> Self {
        self.caps.depth_size = depth_size;
        self
    }

    /// Number of bits in the stencil buffer.
    ///
    /// By default `8` is requested.
    #[inline]
    pub fn with_stencil_size(mut self, stencil_size: u8) -> Self {
        self.caps.stencil_size = stencil_size;
        self
    }

    /// Whether the back buffer should be present.
    ///
    /// By default `true` is requested.
    #[inline]
    pub fn with_double_buffering(mut self, double_buffered: bool) -> Self {
        self.caps.double_buffered = double_buffered;
        self
    }

    /// Whether the stereo pairs should be present.
    ///
    /// By default `false` is requested.
    #[inline]
    pub fn with_stereoscopy(mut self, stereo: bool) -> Self {
        self.caps.stereo = stereo;
        self
    }

    /// Whether multisampling configurations should be picked. The
    /// `num_samples` must be a power of two.
    ///
    /// By default multisampling is not requested.
    #[inline]
    pub fn with_multisampling(mut self, num_samples: u8) -> Self {
        debug_assert!(num_samples.is_power_of_two());
        self.caps.sample_buffers = num_samples > 0;
        self.caps.num_samples = num_samples;
        self
    }

    /// Whether the surface is an onscreen window.
    ///
    /// By default `true` is requested.
    #[inline]
    pub fn with_onscreen(mut self, onscreen: bool) -> Self {
        self.caps.onscreen = onscreen;
        self
    }

    /// Whether the surface is a pbuffer. Implies offscreen.
    ///
    /// By default `false` is requested.
    #[inline]
    pub fn with_pbuffer(mut self, pbuffer: bool) -> Self {
        self.caps.pbuffer = pbuffer;
        if pbuffer {
            self.caps.onscreen = false;
        }
        self
    }

    /// Whether the floating point pixel formats should be used.
    ///
    /// By default `false` is requested.
    #[inline]
    pub fn with_float_pixels(mut self, float_pixels: bool) -> Self {
        self.caps.float_pixels = float_pixels;
        self
    }

    /// Whether a pbuffer should be bindable as a texture.
    #[inline]
    pub fn with_pbuffer_render_to_texture(mut self, rtt: bool) -> Self {
        self.caps.pbuffer_render_to_texture = rtt;
        self
    }

    /// Whether a pbuffer should be bindable as a rectangle texture.
    #[inline]
    pub fn with_pbuffer_render_to_texture_rect(mut self, rtt_rect: bool) -> Self {
        self.caps.pbuffer_render_to_texture_rect = rtt_rect;
        self
    }

    /// Whether the surface background should be opaque.
    ///
    /// Requesting a translucent surface forces at least one alpha bit,
    /// since most backends can't compose a zero-alpha surface.
    #[inline]
    pub fn with_background_opaque(mut self, background_opaque: bool) -> Self {
        self.caps.background_opaque = background_opaque;
        if !background_opaque && self.caps.alpha_size == 0 {
            self.caps.alpha_size = 1;
        }
        self
    }

    /// The transparent color key, meaningful only for non-opaque surfaces.
    #[inline]
    pub fn with_transparent_values(mut self, red: i32, green: i32, blue: i32, alpha: i32) -> Self {
        self.caps.transparent_red_value = red;
        self.caps.transparent_green_value = green;
        self.caps.transparent_blue_value = blue;
        self.caps.transparent_alpha_value = alpha;
        self
    }

    /// Whether the configuration should prefer hardware accelerated formats
    /// or not.
    ///
    /// By default hardware acceleration or its absence is not requested.
    #[inline]
    pub fn prefer_hardware_accelerated(mut self, hardware_accelerated: Option<bool>) -> Self {
        self.caps.hardware_accelerated = hardware_accelerated;
        self
    }

    /// Build the capabilities set.
    #[must_use]
    pub fn build(self) -> Capabilities {
        self.caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translucent_surface_forces_alpha() {
        let caps = CapabilitiesBuilder::new()
            .with_alpha_size(0)
            .with_background_opaque(false)
            .build();
        assert_eq!(caps.alpha_size(), 1);

        // An explicit alpha size is left alone.
        let caps = CapabilitiesBuilder::new()
            .with_alpha_size(8)
            .with_background_opaque(false)
            .build();
        assert_eq!(caps.alpha_size(), 8);
    }

    #[test]
    fn rgba_weight_treats_zero_alpha_as_one() {
        let opaque = CapabilitiesBuilder::new().with_alpha_size(0).build();
        assert_eq!(opaque.rgba_weight(), 8 * 8 * 8);

        let with_alpha = CapabilitiesBuilder::new().with_alpha_size(8).build();
        assert_eq!(with_alpha.rgba_weight(), 8 * 8 * 8 * 8);

        assert_eq!(opaque.cmp_rgba_weight(&with_alpha), Ordering::Less);
    }

    #[test]
    fn clone_is_independent_and_equal() {
        let caps = CapabilitiesBuilder::new()
            .with_color_sizes(5, 6, 5)
            .with_multisampling(4)
            .build();
        let copy = caps.clone();
        assert_eq!(caps, copy);

        let other = CapabilitiesBuilder::new().with_color_sizes(8, 8, 8).build();
        assert_ne!(caps, other);
    }

    #[test]
    fn pbuffer_implies_offscreen() {
        let caps = CapabilitiesBuilder::new().with_pbuffer(true).build();
        assert!(!caps.onscreen());
        assert!(caps.pbuffer());
    }
}
