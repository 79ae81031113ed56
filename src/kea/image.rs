//! Windowed reads and writes of band pixel data.

use std::ops::{Range, RangeInclusive};

use ndarray::{Array, ArrayBase, ArrayD, Axis, Data, Dimension};

use super::container::Container;
use super::layout::Layout;
use super::schema::band_path;
use crate::store::Selection;
use crate::util::dtype::with_dtype;
use crate::util::{DataType, Element, Error, Result};

/// Band selection: one band, or an ordered list (duplicates allowed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Bands {
    One(usize),
    Many(Vec<usize>),
}

impl Bands {
    pub fn indices(&self) -> &[usize] {
        match self {
            Self::One(b) => std::slice::from_ref(b),
            Self::Many(list) => list,
        }
    }
}

impl From<usize> for Bands {
    fn from(band: usize) -> Self {
        Self::One(band)
    }
}

impl From<Vec<usize>> for Bands {
    fn from(bands: Vec<usize>) -> Self {
        Self::Many(bands)
    }
}

impl From<&[usize]> for Bands {
    fn from(bands: &[usize]) -> Self {
        Self::Many(bands.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Bands {
    fn from(bands: [usize; N]) -> Self {
        Self::Many(bands.to_vec())
    }
}

impl From<RangeInclusive<usize>> for Bands {
    fn from(bands: RangeInclusive<usize>) -> Self {
        Self::Many(bands.collect())
    }
}

/// Pixel window: half-open row and column ranges.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Window {
    pub rows: Range<u64>,
    pub cols: Range<u64>,
}

impl Window {
    pub fn new(rows: Range<u64>, cols: Range<u64>) -> Self {
        Self { rows, cols }
    }

    /// The whole image.
    pub fn full(width: u64, height: u64) -> Self {
        Self::new(0..height, 0..width)
    }

    #[inline]
    pub fn height(&self) -> u64 {
        self.rows.end.saturating_sub(self.rows.start)
    }

    #[inline]
    pub fn width(&self) -> u64 {
        self.cols.end.saturating_sub(self.cols.start)
    }

    pub(crate) fn selection(&self) -> Selection {
        Selection::rows_cols(self.rows.clone(), self.cols.clone())
    }
}

/// Pixel data in its native element type.
#[derive(Clone, Debug, PartialEq)]
pub enum RasterArray {
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    UInt8(ArrayD<u8>),
    UInt16(ArrayD<u16>),
    UInt32(ArrayD<u32>),
    UInt64(ArrayD<u64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
}

macro_rules! match_raster {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            RasterArray::Int8($a) => $body,
            RasterArray::Int16($a) => $body,
            RasterArray::Int32($a) => $body,
            RasterArray::Int64($a) => $body,
            RasterArray::UInt8($a) => $body,
            RasterArray::UInt16($a) => $body,
            RasterArray::UInt32($a) => $body,
            RasterArray::UInt64($a) => $body,
            RasterArray::Float32($a) => $body,
            RasterArray::Float64($a) => $body,
        }
    };
}

macro_rules! impl_raster_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<ArrayD<$t>> for RasterArray {
                fn from(a: ArrayD<$t>) -> Self {
                    Self::$variant(a)
                }
            }
        )*
    };
}

impl_raster_from!(
    i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64,
    u8 => UInt8, u16 => UInt16, u32 => UInt32, u64 => UInt64,
    f32 => Float32, f64 => Float64,
);

impl RasterArray {
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt8(_) => DataType::UInt8,
            Self::UInt16(_) => DataType::UInt16,
            Self::UInt32(_) => DataType::UInt32,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match_raster!(self, a => a.shape())
    }

    /// Convert every element to `T` with `as` semantics.
    pub fn cast<T: Element>(&self) -> ArrayD<T> {
        match_raster!(self, a => a.mapv(|v| T::from_scalar(v.to_scalar())))
    }
}

impl Container {
    /// Read bands inside `window` (the whole image when `None`).
    ///
    /// A single band comes back in its own element type with shape
    /// `(rows, cols)`. A band list comes back in the promoted element type
    /// with shape `(bands, rows, cols)`.
    pub fn read(&self, bands: impl Into<Bands>, window: Option<Window>) -> Result<RasterArray> {
        let bands = bands.into();
        let layout = self.layout()?;
        let dtype = read_dtype(&layout, &bands)?;
        with_dtype!(dtype, T => self.read_typed::<T>(&layout, &bands, window).map(RasterArray::from))
    }

    /// Like [`Container::read`] but converting to `T`.
    pub fn read_as<T: Element>(&self, bands: impl Into<Bands>, window: Option<Window>) -> Result<ArrayD<T>> {
        let bands = bands.into();
        let layout = self.layout()?;
        read_dtype(&layout, &bands)?;
        self.read_typed(&layout, &bands, window)
    }

    fn read_typed<T: Element>(&self, layout: &Layout, bands: &Bands, window: Option<Window>) -> Result<ArrayD<T>> {
        let window = window.unwrap_or_else(|| Window::full(layout.width, layout.height));
        let sel = window.selection();
        let (h, w) = (window.height() as usize, window.width() as usize);

        let mut out = Vec::with_capacity(bands.indices().len() * h * w);
        for &band in bands.indices() {
            let ds = self.file.dataset(&band_path(band, "DATA"))?;
            out.extend(ds.read::<T>(&sel)?);
        }

        let shaped = match bands {
            Bands::One(_) => Array::from_shape_vec((h, w), out).map(|a| a.into_dyn()),
            Bands::Many(list) => Array::from_shape_vec((list.len(), h, w), out).map(|a| a.into_dyn()),
        };
        shaped.map_err(|e| Error::invalid(e.to_string()))
    }

    /// Write `data` into bands inside `window` (the whole image when `None`).
    ///
    /// A single band takes a 2-D array; a band list takes a 3-D array whose
    /// leading axis matches the list. Values are cast to each band's element
    /// type. Bands are written in order and earlier writes are kept if a
    /// later one fails.
    pub fn write<T, S, D>(&self, data: &ArrayBase<S, D>, bands: impl Into<Bands>, window: Option<Window>) -> Result<()>
    where
        T: Element,
        S: Data<Elem = T>,
        D: Dimension,
    {
        self.file.check_writable()?;
        let bands = bands.into();
        let layout = self.layout()?;
        for &band in bands.indices() {
            if !layout.contains(band) {
                return Err(Error::validation(format!("band {} does not exist in the file", band)));
            }
        }

        let window = window.unwrap_or_else(|| Window::full(layout.width, layout.height));
        let plane = [window.height() as usize, window.width() as usize];
        let data = data.view().into_dyn();

        let planes: Vec<Vec<T>> = match &bands {
            Bands::One(_) => {
                if data.shape() != plane {
                    return Err(Error::validation(format!(
                        "data has shape {:?}, expected {:?}",
                        data.shape(),
                        plane
                    )));
                }
                vec![data.iter().copied().collect()]
            }
            Bands::Many(list) => {
                if data.ndim() != 3 {
                    return Err(Error::validation(format!("data has {} dimensions and should be 3", data.ndim())));
                }
                if data.shape()[0] != list.len() {
                    return Err(Error::validation(format!(
                        "number of bands, {}, doesn't match data shape, {}",
                        list.len(),
                        data.shape()[0]
                    )));
                }
                if data.shape()[1..] != plane {
                    return Err(Error::validation(format!(
                        "data planes have shape {:?}, expected {:?}",
                        &data.shape()[1..],
                        plane
                    )));
                }
                data.axis_iter(Axis(0)).map(|p| p.iter().copied().collect()).collect()
            }
        };

        let sel = window.selection();
        for (&band, values) in bands.indices().iter().zip(&planes) {
            self.file.dataset(&band_path(band, "DATA"))?.write(&sel, values)?;
        }
        Ok(())
    }

    /// Write a [`RasterArray`] as with [`Container::write`].
    pub fn write_raster(&self, data: &RasterArray, bands: impl Into<Bands>, window: Option<Window>) -> Result<()> {
        let bands = bands.into();
        match_raster!(data, a => self.write(a, bands, window))
    }
}

/// Element type of a read, failing with `Lookup` on unknown bands.
fn read_dtype(layout: &Layout, bands: &Bands) -> Result<DataType> {
    match bands {
        Bands::One(b) => Ok(layout.band(*b)?.dtype),
        Bands::Many(list) => {
            if list.is_empty() {
                return Err(Error::validation("no bands requested"));
            }
            let dtypes = list
                .iter()
                .map(|&b| layout.band(b).map(|info| info.dtype))
                .collect::<Result<Vec<_>>>()?;
            DataType::promote(dtypes)
        }
    }
}
