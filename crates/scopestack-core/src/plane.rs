use std::fmt;

use ndarray::Array3;
use num_traits::{PrimInt, Unsigned};
use tiff::decoder::DecodingResult;
use tiff::encoder::colortype::{self, ColorType};

/// Stack of planes read from one or more files, axes (Z, Y, X).
/// A single 2-D plane is a stack of depth 1.
pub type PlaneStack<P> = Array3<P>;

/// Pixel type inherited from the source files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelType {
    U8,
    U16,
}

impl PixelType {
    pub fn bits(self) -> u16 {
        match self {
            Self::U8 => 8,
            Self::U16 => 16,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "uint8"),
            Self::U16 => write!(f, "uint16"),
        }
    }
}

/// Unsigned integer pixel stored in a hyperstack.
pub trait Pixel: PrimInt + Unsigned + Default + Send + Sync + fmt::Debug + 'static {
    const PIXEL_TYPE: PixelType;

    /// TIFF colour type used when writing this pixel.
    type Tiff: ColorType<Inner = Self>;

    fn widen(self) -> u64;

    /// Saturating conversion back from the widened intermediate.
    fn narrow(value: u64) -> Self;

    /// Take the decoded buffer if it holds this pixel type.
    fn from_decoded(result: DecodingResult) -> std::result::Result<Vec<Self>, DecodingResult>;
}

macro_rules! impl_pixel {
    ($t:ty, $variant:ident, $color:ty) => {
        impl Pixel for $t {
            const PIXEL_TYPE: PixelType = PixelType::$variant;
            type Tiff = $color;

            fn widen(self) -> u64 {
                self as u64
            }

            fn narrow(value: u64) -> Self {
                value.min(<$t>::MAX as u64) as $t
            }

            fn from_decoded(
                result: DecodingResult,
            ) -> std::result::Result<Vec<Self>, DecodingResult> {
                match result {
                    DecodingResult::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }
        }
    };
}

impl_pixel!(u8, U8, colortype::Gray8);
impl_pixel!(u16, U16, colortype::Gray16);

/// Header-level facts about a plane file, read without decoding pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneInfo {
    pub pixel_type: PixelType,
    pub width: usize,
    pub height: usize,
    /// Number of pages (z-planes or frames) stored in the file.
    pub depth: usize,
}
