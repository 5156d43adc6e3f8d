//! How to retrieve data from a sampled image within a shader.
//!
//! This subsystem never samples anything itself; [`SamplerCreateInfo`] exists so that
//! immutable-sampler rules can describe the sampler object the
//! [`Device`](crate::device::Device) collaborator is asked to create at layout-build time.

use crate::NonExhaustive;
use std::ops::RangeInclusive;

/// Describes how to retrieve data from a sampled image within a shader.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplerCreateInfo {
    /// How the sampled value of a single mipmap should be calculated, when magnification is
    /// applied.
    ///
    /// The default value is [`Filter::Nearest`].
    pub mag_filter: Filter,

    /// How the sampled value of a single mipmap should be calculated, when minification is
    /// applied.
    ///
    /// The default value is [`Filter::Nearest`].
    pub min_filter: Filter,

    /// How the value derived from two adjacent mipmaps should be calculated.
    ///
    /// The default value is [`SamplerMipmapMode::Nearest`].
    pub mipmap_mode: SamplerMipmapMode,

    /// How out-of-range texture coordinates should be treated, for the u, v and w coordinates
    /// respectively.
    ///
    /// The default value is [`SamplerAddressMode::ClampToEdge`] for all coordinates.
    pub address_mode: [SamplerAddressMode; 3],

    /// The bias value to be added to the base mipmap level before sampling.
    ///
    /// The default value is `0.0`.
    pub mip_lod_bias: f32,

    /// Whether anisotropic filtering should be used, and the maximum number of samples taken
    /// if so.
    ///
    /// The default value is `None`.
    pub anisotropy: Option<f32>,

    /// Whether depth comparison should be used, and the comparison operator if so.
    ///
    /// The default value is `None`.
    pub compare: Option<CompareOp>,

    /// The range that the sampled level-of-detail will be clamped to.
    ///
    /// The default value is `0.0..=1.0`.
    pub lod: RangeInclusive<f32>,

    /// The border color to use when [`SamplerAddressMode::ClampToBorder`] is selected.
    ///
    /// The default value is [`BorderColor::FloatTransparentBlack`].
    pub border_color: BorderColor,

    pub _ne: NonExhaustive,
}

impl Default for SamplerCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            mag_filter: Filter::Nearest,
            min_filter: Filter::Nearest,
            mipmap_mode: SamplerMipmapMode::Nearest,
            address_mode: [SamplerAddressMode::ClampToEdge; 3],
            mip_lod_bias: 0.0,
            anisotropy: None,
            compare: None,
            lod: 0.0..=1.0,
            border_color: BorderColor::FloatTransparentBlack,
            _ne: NonExhaustive(()),
        }
    }
}

impl SamplerCreateInfo {
    /// Shortcut for creating a sampler with linear sampling, linear mipmaps, and with the
    /// repeat mode for borders.
    #[inline]
    pub fn simple_repeat_linear() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_mode: SamplerMipmapMode::Linear,
            address_mode: [SamplerAddressMode::Repeat; 3],
            lod: 0.0..=f32::MAX,
            ..Default::default()
        }
    }
}

/// Describes how the color of each pixel should be determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    /// The nearest pixel is chosen.
    Nearest,
    /// The 2x2 (or 2, or 2x2x2) pixels closest to the coordinate are linearly interpolated.
    Linear,
}

/// Describes which mipmap a sample is taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerMipmapMode {
    /// The mipmap whose dimensions are the nearest to the size the texture appears at.
    Nearest,
    /// The two adjacent mipmaps are interpolated.
    Linear,
}

/// How the sampler should behave when it needs to access a pixel that is out of range of the
/// texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerAddressMode {
    /// Repeat the texture.
    Repeat,
    /// Repeat the texture but mirror it at every repetition.
    MirroredRepeat,
    /// The coordinates are clamped to the valid range; the edge pixels appear stretched.
    ClampToEdge,
    /// Out-of-range samples return the sampler's border color.
    ClampToBorder,
}

/// The operator used for depth comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// The color to use for the border of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BorderColor {
    FloatTransparentBlack,
    IntTransparentBlack,
    FloatOpaqueBlack,
    IntOpaqueBlack,
    FloatOpaqueWhite,
    IntOpaqueWhite,
}
