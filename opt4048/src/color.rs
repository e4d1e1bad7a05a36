//! From ADC counts to colorimetric quantities.
//!
//! ```plain
//! AdcQuad ──ADC_TO_XYZ──▶ Xyz ──┬──▶ Chromaticity (x, y)
//!                               └──▶ Rgb (white point, 3×3 matrix, companding, clamp)
//! ```


use crate::channel::ChannelReading;
use crate::error::DomainError;
use crate::register::Channel;


/// ADC counts to `[X, Y, Z, Lux]`; rows are channels 0..3, columns the outputs.
///
/// Taken from the OPT4048 datasheet. Channel 3 does not contribute; lux only depends on
/// channel 1.
pub const ADC_TO_XYZ: [[f32; 4]; 4] = [
    [2.34892992e-4, -1.89652390e-5, 1.20811684e-5, 0.0],
    [4.07467441e-5, 1.98958202e-4, -1.58848115e-5, 2.15e-3],
    [9.28619404e-5, -1.69739553e-5, 6.74021520e-4, 0.0],
    [0.0, 0.0, 0.0, 0.0],
];

/// Lux per channel-1 ADC count.
pub const LUX_PER_COUNT: f32 = ADC_TO_XYZ[1][3];


/// Illuminance in lux from channel 1 alone.
pub fn lux_from_adc(channel1_adc: f32) -> f32 {
    channel1_adc * LUX_PER_COUNT
}


/// ADC counts of all four channels, in channel order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcQuad(pub [f32; 4]);
impl AdcQuad {
    pub const fn new(channels: [f32; 4]) -> Self { Self(channels) }

    pub fn from_readings(readings: &[ChannelReading; 4]) -> Self {
        Self(readings.map(|r| r.to_adc()))
    }

    pub const fn channel(&self, channel: Channel) -> f32 {
        self.0[channel.index()]
    }

    pub const fn as_array(&self) -> &[f32; 4] { &self.0 }

    pub fn to_xyz(&self) -> Xyz {
        let adc = &self.0;
        let m = &ADC_TO_XYZ;
        let column = |j: usize| adc[0] * m[0][j] + adc[1] * m[1][j] + adc[2] * m[2][j] + adc[3] * m[3][j];
        Xyz {
            x: column(0),
            y: column(1),
            z: column(2),
            lux: column(3),
        }
    }
}


/// CIE 1931 tristimulus values plus illuminance.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Xyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub lux: f32,
}
impl Xyz {
    pub const fn new(x: f32, y: f32, z: f32, lux: f32) -> Self {
        Self { x, y, z, lux }
    }

    /// Projects onto the CIE xy plane.
    pub fn chromaticity(&self) -> Result<Chromaticity, DomainError> {
        let sum = self.x + self.y + self.z;
        if sum == 0.0 {
            return Err(DomainError::ZeroTristimulus);
        }

        let x = self.x / sum;
        let y = self.y / sum;
        if !x.is_finite() || !y.is_finite() {
            return Err(DomainError::NotFinite);
        }
        Ok(Chromaticity { x, y })
    }

    pub fn to_rgb(&self, conversion: &RgbConversion) -> Rgb {
        conversion.convert(self)
    }
}


#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Chromaticity {
    pub x: f32,
    pub y: f32,
}


/// Display RGB, each component in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}
impl Rgb {
    /// Scales to 8 bits per component, rounding to nearest.
    pub fn to_rgb8(&self) -> [u8; 3] {
        [self.r, self.g, self.b].map(|c| libm::roundf(c.clamp(0.0, 1.0) * 255.0) as u8)
    }
}


/// Reference white in tristimulus values (Y = 100 scale).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WhitePoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}
impl WhitePoint {
    /// CIE standard illuminant D65, 2° observer.
    pub const D65: Self = Self { x: 95.047, y: 100.0, z: 108.883 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}
impl Default for WhitePoint {
    fn default() -> Self { Self::D65 }
}


/// Linear map from normalised XYZ to linear RGB; rows are R, G, B.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct XyzToRgbMatrix(pub [[f32; 3]; 3]);
impl XyzToRgbMatrix {
    /// IEC 61966-2-1 (sRGB, D65) for XYZ scaled to Y = 1.
    pub const SRGB: Self = Self([
        [3.2404542, -1.5371385, -0.4985314],
        [-0.9692660, 1.8760108, 0.0415560],
        [0.0556434, -0.2040259, 1.0572252],
    ]);

    /// Adapts a matrix built for XYZ scaled to Y = 1 to the normalisation used by
    /// [`RgbConversion`], which divides X by the white point's X instead of its Y.
    pub fn for_white_point(base: Self, white: WhitePoint) -> Self {
        let scale = white.x / white.y;
        let mut m = base.0;
        for row in m.iter_mut() {
            row[0] *= scale;
        }
        Self(m)
    }

    pub fn apply(&self, v: [f32; 3]) -> [f32; 3] {
        let m = &self.0;
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }
}


/// Transfer function from linear light to display values.
#[derive(Clone, Copy, Debug)]
pub enum Companding {
    /// The sRGB curve: linear toe below 0.0031308, then a 1/2.4 power law.
    Srgb,

    /// No companding.
    Linear,

    /// Plain power law `v^(1/gamma)`; negative inputs become zero.
    Gamma(f32),

    Custom(fn(f32) -> f32),
}
impl Companding {
    pub fn apply(&self, v: f32) -> f32 {
        match self {
            Self::Srgb => {
                if v <= 0.0031308 {
                    12.92 * v
                } else {
                    1.055 * libm::powf(v, 1.0 / 2.4) - 0.055
                }
            },
            Self::Linear => v,
            Self::Gamma(gamma) => {
                if v <= 0.0 {
                    0.0
                } else {
                    libm::powf(v, 1.0 / gamma)
                }
            },
            Self::Custom(f) => f(v),
        }
    }
}


/// Everything the XYZ → RGB step needs.
#[derive(Clone, Copy, Debug)]
pub struct RgbConversion {
    pub matrix: XyzToRgbMatrix,
    pub white_point: WhitePoint,
    pub companding: Companding,
}
impl RgbConversion {
    pub const fn new(matrix: XyzToRgbMatrix, white_point: WhitePoint, companding: Companding) -> Self {
        Self { matrix, white_point, companding }
    }

    /// sRGB output under D65.
    pub fn srgb_d65() -> Self {
        let white_point = WhitePoint::D65;
        Self {
            matrix: XyzToRgbMatrix::for_white_point(XyzToRgbMatrix::SRGB, white_point),
            white_point,
            companding: Companding::Srgb,
        }
    }

    /// Normalises by the white point, applies the matrix, compands and clamps to `[0, 1]`.
    ///
    /// Z is divided by the white point's Y, not its Z. This matches the sensor vendor's
    /// calibration and differs from textbook CIE normalisation.
    pub fn convert(&self, xyz: &Xyz) -> Rgb {
        let white = &self.white_point;
        let normalized = [
            xyz.x / white.x,
            xyz.y / white.y,
            xyz.z / white.y,
        ];

        let [r, g, b] = self.matrix.apply(normalized)
            .map(|c| self.companding.apply(c).clamp(0.0, 1.0));
        Rgb { r, g, b }
    }
}
impl Default for RgbConversion {
    fn default() -> Self { Self::srgb_d65() }
}
