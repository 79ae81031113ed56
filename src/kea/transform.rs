//! Affine geo transform.

use serde::{Deserialize, Serialize};

use crate::util::{Error, Result};

/// Six-coefficient affine transform in GDAL order:
/// `[ulx, xres, xrot, uly, yrot, yres]`.
///
/// The header stores it decomposed as `RES = [xres, yres]`,
/// `TL = [ulx, uly]` and `ROT = [xrot, yrot]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl Default for GeoTransform {
    /// Image coordinates: unit pixels, origin at the top left, y down.
    fn default() -> Self {
        Self([0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
    }
}

impl GeoTransform {
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self(coeffs)
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        self.0
    }

    /// Rebuild from the header pairs.
    pub fn from_parts(res: [f64; 2], tl: [f64; 2], rot: [f64; 2]) -> Self {
        Self([tl[0], res[0], rot[0], tl[1], rot[1], res[1]])
    }

    pub fn res(&self) -> [f64; 2] {
        [self.0[1], self.0[5]]
    }

    pub fn tl(&self) -> [f64; 2] {
        [self.0[0], self.0[3]]
    }

    pub fn rot(&self) -> [f64; 2] {
        [self.0[2], self.0[4]]
    }

    /// Fails when any coefficient is NaN or infinite.
    pub fn validate(&self) -> Result<()> {
        if let Some(i) = self.0.iter().position(|c| !c.is_finite()) {
            return Err(Error::validation(format!(
                "transform coefficient {} is not finite ({})",
                i, self.0[i]
            )));
        }
        Ok(())
    }

    /// Map a pixel position (column, row) to world coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let [ulx, xres, xrot, uly, yrot, yres] = self.0;
        (ulx + col * xres + row * xrot, uly + col * yrot + row * yres)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose() {
        let t = GeoTransform::from_gdal([500000.0, 25.0, 0.5, 6000000.0, 0.25, -25.0]);
        assert_eq!(t.res(), [25.0, -25.0]);
        assert_eq!(t.tl(), [500000.0, 6000000.0]);
        assert_eq!(t.rot(), [0.5, 0.25]);
        assert_eq!(GeoTransform::from_parts(t.res(), t.tl(), t.rot()), t);
    }

    #[test]
    fn test_apply() {
        let t = GeoTransform::default();
        assert_eq!(t.apply(3.0, 2.0), (3.0, -2.0));
    }

    #[test]
    fn test_non_finite() {
        let t = GeoTransform::from_gdal([0.0, f64::NAN, 0.0, 0.0, 0.0, -1.0]);
        assert!(t.validate().unwrap_err().is_validation());
        assert!(GeoTransform::default().validate().is_ok());
    }
}
