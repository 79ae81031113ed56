//! Coordinate reference system text conversion.

use crate::util::{Error, Result};

/// Converts user CRS text into the WKT stored in the header.
///
/// Implement this to plug in a projection library; the default
/// [`WktPassthrough`] only accepts text that already is WKT.
pub trait CrsTranslator: Send + Sync {
    fn to_wkt(&self, crs: &str) -> Result<String>;
}

/// Accepts an empty CRS or WKT text, rejects everything else.
#[derive(Clone, Copy, Debug, Default)]
pub struct WktPassthrough;

const WKT_KEYWORDS: [&str; 12] = [
    "PROJCS", "GEOGCS", "GEOCCS", "COMPD_CS", "VERT_CS", "LOCAL_CS",
    "PROJCRS", "GEOGCRS", "GEODCRS", "COMPOUNDCRS", "VERTCRS", "ENGCRS",
];

/// True if `text` starts with a WKT keyword followed by a bracket.
pub fn looks_like_wkt(text: &str) -> bool {
    let text = text.trim_start();
    WKT_KEYWORDS.iter().any(|kw| {
        text.strip_prefix(kw)
            .map(|rest| rest.trim_start().starts_with(&['[', '('][..]))
            .unwrap_or(false)
    })
}

impl CrsTranslator for WktPassthrough {
    fn to_wkt(&self, crs: &str) -> Result<String> {
        let crs = crs.trim();
        if crs.is_empty() || looks_like_wkt(crs) {
            Ok(crs.to_string())
        } else {
            Err(Error::validation(format!(
                "cannot convert CRS to WKT without a translator: {:?}",
                crs
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let wkt = r#"GEOGCS["WGS 84",DATUM["WGS_1984"]]"#;
        assert_eq!(WktPassthrough.to_wkt(wkt).unwrap(), wkt);
        assert_eq!(WktPassthrough.to_wkt("").unwrap(), "");
        assert!(WktPassthrough.to_wkt("+proj=longlat +datum=WGS84").unwrap_err().is_validation());
    }
}
