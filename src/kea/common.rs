//! Enumerations stored in KEA band groups and attribute tables.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::{Error, Result};

/// Whether a band holds continuous measurements or class labels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum LayerType {
    #[default]
    Continuous = 0,
    Thematic = 1,
}

impl LayerType {
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(Self::Continuous),
            1 => Ok(Self::Thematic),
            _ => Err(Error::lookup(format!("unknown layer type {}", code))),
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Continuous => "continuous",
            Self::Thematic => "thematic",
        })
    }
}

/// Colour interpretation of a band, stored as its `LAYER_USAGE`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum BandColourInterp {
    #[default]
    Generic = 0,
    GreyIndex = 1,
    PaletteIndex = 2,
    RedBand = 3,
    GreenBand = 4,
    BlueBand = 5,
    AlphaBand = 6,
    HueBand = 7,
    SaturationBand = 8,
    LightnessBand = 9,
    CyanBand = 10,
    MagentaBand = 11,
    YellowBand = 12,
    BlackBand = 13,
    YCbCrYBand = 14,
    YCbCrCbBand = 15,
    YCbCrCrBand = 16,
}

impl BandColourInterp {
    pub const ALL: [BandColourInterp; 17] = [
        Self::Generic,
        Self::GreyIndex,
        Self::PaletteIndex,
        Self::RedBand,
        Self::GreenBand,
        Self::BlueBand,
        Self::AlphaBand,
        Self::HueBand,
        Self::SaturationBand,
        Self::LightnessBand,
        Self::CyanBand,
        Self::MagentaBand,
        Self::YellowBand,
        Self::BlackBand,
        Self::YCbCrYBand,
        Self::YCbCrCbBand,
        Self::YCbCrCrBand,
    ];

    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::lookup(format!("unknown colour interpretation {}", code)))
    }
}

/// Type bucket of a raster attribute table column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatFieldType {
    Bool = 0,
    Int = 1,
    Float = 2,
    String = 3,
}

impl RatFieldType {
    /// Buckets in their on-disk order.
    pub const ALL: [RatFieldType; 4] = [Self::Bool, Self::Int, Self::Float, Self::String];

    /// Name of the bucket's data array under `ATT/DATA`.
    pub const fn data_name(self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::String => "STRING",
        }
    }

    /// Name of the bucket's descriptor group under `ATT/HEADER`.
    pub const fn fields_name(self) -> &'static str {
        match self {
            Self::Bool => "BOOL_FIELDS",
            Self::Int => "INT_FIELDS",
            Self::Float => "FLOAT_FIELDS",
            Self::String => "STRING_FIELDS",
        }
    }

    /// Position of the bucket's column count in `ATT/HEADER/SIZE`.
    #[inline]
    pub const fn size_slot(self) -> usize {
        self as usize + 1
    }
}

impl fmt::Display for RatFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.data_name())
    }
}
