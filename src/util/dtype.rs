//! Numeric element types and the KEA type-code registry.
//!
//! Every band stores a compact `u16` type code next to its pixel array. The
//! registry maps those codes to [`DataType`] values and back, and implements the
//! promotion lattice used for multi-band reads.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Error, Result};

/// Run `$body` with `$T` bound to the Rust type of `$dtype`.
macro_rules! with_dtype {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::util::DataType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::util::DataType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::util::DataType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::util::DataType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::util::DataType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::util::DataType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::util::DataType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::util::DataType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::util::DataType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::util::DataType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}
pub(crate) use with_dtype;

/// Numeric element type of a band or dataset.
///
/// Discriminants are the on-disk KEA type codes. Code 0 ("undefined") is
/// reserved and has no element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum DataType {
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float32 = 9,
    Float64 = 10,
}

impl DataType {
    /// All registered types in code order.
    pub const ALL: [DataType; 10] = [
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Float32,
        Self::Float64,
    ];

    /// Reserved code for an undefined type.
    pub const UNDEFINED_CODE: u16 = 0;

    /// On-disk type code.
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Look up a type by its on-disk code.
    pub fn from_code(code: u16) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.code() == code)
            .ok_or_else(|| Error::lookup(format!("unknown dtype code {}", code)))
    }

    /// Canonical name, always used when serialising.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Additional names accepted when parsing. They never produce a distinct code.
    #[inline]
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Float64 => &["float"],
            _ => &[],
        }
    }

    /// Parse a type from its canonical name or one of its aliases.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == name || t.aliases().contains(&name))
            .ok_or_else(|| Error::lookup(format!("unknown dtype name '{}'", name)))
    }

    /// Size in bytes of one element.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    #[inline]
    pub const fn is_integer(self) -> bool {
        !self.is_float()
    }

    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 | Self::Float32 | Self::Float64
        )
    }

    fn signed_of_width(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(Self::Int8),
            2 => Some(Self::Int16),
            4 => Some(Self::Int32),
            8 => Some(Self::Int64),
            _ => None,
        }
    }

    fn unsigned_of_width(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(Self::UInt8),
            2 => Some(Self::UInt16),
            4 => Some(Self::UInt32),
            8 => Some(Self::UInt64),
            _ => None,
        }
    }

    /// Widen a set of types to the single type used for a multi-band read.
    ///
    /// Any float present yields the widest float present. Otherwise the widest
    /// integer wins; if a signed and an unsigned type share the widest width the
    /// next wider signed type is used (float64 past 64 bits).
    pub fn promote<I: IntoIterator<Item = DataType>>(types: I) -> Result<DataType> {
        let mut widest_float: Option<DataType> = None;
        let mut signed = 0usize;
        let mut unsigned = 0usize;
        let mut any = false;

        for t in types {
            any = true;
            if t.is_float() {
                if widest_float.map_or(true, |f| t.num_bytes() > f.num_bytes()) {
                    widest_float = Some(t);
                }
            } else if t.is_signed() {
                signed = signed.max(t.num_bytes());
            } else {
                unsigned = unsigned.max(t.num_bytes());
            }
        }

        if !any {
            return Err(Error::validation("cannot promote an empty set of dtypes"));
        }
        if let Some(f) = widest_float {
            return Ok(f);
        }

        let promoted = if unsigned > signed {
            Self::unsigned_of_width(unsigned)
        } else if signed > unsigned {
            Self::signed_of_width(signed)
        } else {
            Self::signed_of_width(signed * 2).or(Some(Self::Float64))
        };
        promoted.ok_or_else(|| Error::invalid("integer width outside the registry"))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Type code for a dtype name (canonical or alias).
pub fn code_of(name: &str) -> Result<u16> {
    DataType::from_name(name).map(DataType::code)
}

/// Canonical dtype name for a type code.
pub fn name_of(code: u16) -> Result<&'static str> {
    DataType::from_code(code).map(DataType::name)
}

// === Scalar values ===

/// A single numeric value, independent of its storage width.
///
/// Used for no-data and fill values and as the pivot when casting between
/// element types.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Scalar {
    /// Cast to a concrete element type with `as` semantics.
    #[inline]
    pub fn cast<T: Element>(self) -> T {
        T::from_scalar(self)
    }

    /// Encode as little-endian bytes of `dtype`.
    pub fn to_bytes(self, dtype: DataType) -> Vec<u8> {
        with_dtype!(dtype, T => bytemuck::bytes_of(&T::from_scalar(self)).to_vec())
    }

    /// Decode one element of `dtype`.
    pub fn from_bytes(dtype: DataType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < dtype.num_bytes() {
            return Err(Error::UnexpectedEof(bytes.len() as u64));
        }
        let bytes = &bytes[..dtype.num_bytes()];
        Ok(with_dtype!(dtype, T => {
            let v: T = bytemuck::pod_read_unaligned(bytes);
            v.to_scalar()
        }))
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::UInt(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

// === Element trait for type-safe conversions ===

/// Rust types that can be stored as band pixels.
pub trait Element: Pod + Zeroable + Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The registry type for this element.
    const DTYPE: DataType;

    fn to_scalar(self) -> Scalar;

    fn from_scalar(value: Scalar) -> Self;
}

macro_rules! impl_element {
    ($t:ty, $dt:ident, $variant:ident, $wide:ty) => {
        impl Element for $t {
            const DTYPE: DataType = DataType::$dt;

            #[inline]
            fn to_scalar(self) -> Scalar {
                Scalar::$variant(self as $wide)
            }

            #[inline]
            fn from_scalar(value: Scalar) -> Self {
                match value {
                    Scalar::Int(v) => v as $t,
                    Scalar::UInt(v) => v as $t,
                    Scalar::Float(v) => v as $t,
                }
            }
        }

        impl From<$t> for Scalar {
            #[inline]
            fn from(v: $t) -> Self {
                v.to_scalar()
            }
        }
    };
}

impl_element!(i8, Int8, Int, i64);
impl_element!(i16, Int16, Int, i64);
impl_element!(i32, Int32, Int, i64);
impl_element!(i64, Int64, Int, i64);
impl_element!(u8, UInt8, UInt, u64);
impl_element!(u16, UInt16, UInt, u64);
impl_element!(u32, UInt32, UInt, u64);
impl_element!(u64, UInt64, UInt, u64);
impl_element!(f32, Float32, Float, f64);
impl_element!(f64, Float64, Float, f64);


/// Decode a little-endian buffer of `src` elements into `T`, casting when needed.
pub fn cast_to_vec<T: Element>(src: DataType, bytes: &[u8]) -> Vec<T> {
    if src == T::DTYPE {
        return bytemuck::pod_collect_to_vec(bytes);
    }
    with_dtype!(src, S => {
        let values: Vec<S> = bytemuck::pod_collect_to_vec(bytes);
        values.into_iter().map(|v| T::from_scalar(v.to_scalar())).collect()
    })
}

/// Encode `values` as a little-endian buffer of `dst` elements, casting when needed.
pub fn cast_from_slice<T: Element>(values: &[T], dst: DataType) -> Vec<u8> {
    if dst == T::DTYPE {
        return bytemuck::cast_slice(values).to_vec();
    }
    with_dtype!(dst, D => {
        let out: Vec<D> = values.iter().map(|v| D::from_scalar(v.to_scalar())).collect();
        bytemuck::cast_slice(&out).to_vec()
    })
}

/// Re-encode a buffer from one element type to another.
pub fn cast_bytes(src: DataType, bytes: &[u8], dst: DataType) -> Vec<u8> {
    if src == dst {
        return bytes.to_vec();
    }
    with_dtype!(src, S => {
        let values: Vec<S> = bytemuck::pod_collect_to_vec(bytes);
        cast_from_slice(&values, dst)
    })
}
