//! Element and attribute types understood by the store.

use std::fmt;

use crate::util::{DataType, Scalar};

/// How a text value is laid out on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StringKind {
    /// Exact byte width fixed at creation time, NUL padded.
    Fixed,
    /// Native variable-length string.
    Variable,
}

/// Element type of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    Numeric(DataType),
    /// Fixed-length text of the given byte width. Zero widths are rejected.
    FixedString(usize),
    VarString,
}

impl ElementType {
    /// Bytes per element for numeric datasets.
    #[inline]
    pub fn num_bytes(&self) -> Option<usize> {
        match self {
            Self::Numeric(dt) => Some(dt.num_bytes()),
            _ => None,
        }
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        !matches!(self, Self::Numeric(_))
    }

    #[inline]
    pub fn string_kind(&self) -> Option<StringKind> {
        match self {
            Self::Numeric(_) => None,
            Self::FixedString(_) => Some(StringKind::Fixed),
            Self::VarString => Some(StringKind::Variable),
        }
    }

    #[inline]
    pub fn dtype(&self) -> Option<DataType> {
        match self {
            Self::Numeric(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(dt) => write!(f, "{}", dt),
            Self::FixedString(w) => write!(f, "S{}", w),
            Self::VarString => write!(f, "vlen str"),
        }
    }
}

/// Attribute value attached to a group or dataset.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String, StringKind),
}

impl AttrValue {
    /// Variable-length text attribute.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into(), StringKind::Variable)
    }

    /// Fixed-length text attribute.
    pub fn fixed_text(value: impl Into<String>) -> Self {
        Self::Text(value.into(), StringKind::Fixed)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s, _) => Some(s),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Self::Int(v) => Some(Scalar::Int(*v)),
            Self::UInt(v) => Some(Scalar::UInt(*v)),
            Self::Float(v) => Some(Scalar::Float(*v)),
            Self::Text(..) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn string_kind(&self) -> Option<StringKind> {
        match self {
            Self::Text(_, kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<Scalar> for AttrValue {
    fn from(v: Scalar) -> Self {
        match v {
            Scalar::Int(v) => Self::Int(v),
            Scalar::UInt(v) => Self::UInt(v),
            Scalar::Float(v) => Self::Float(v),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s, _) => write!(f, "{:?}", s),
        }
    }
}
