//! Bounding boxes and the bbox device's diagnostic output.
//!
//! The `bbox` device produces no output file. It writes DSC comments to the
//! engine's stderr:
//!
//! ```text
//! %%BoundingBox: 0 0 200 100
//! %%HiResBoundingBox: 0.000000 0.000000 199.998000 99.999000
//! ```
//!
//! [`parse_bbox_output`] takes the first integer `%%BoundingBox:` line. When
//! none is present the caller gets `None`; there is no fallback rectangle.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The integer marker line. `(atend)` and partial lines never match.
static RE_BOUNDING_BOX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^%%BoundingBox:[ \t]*(-?\d+)[ \t]+(-?\d+)[ \t]+(-?\d+)[ \t]+(-?\d+)[ \t]*\r?$")
        .unwrap()
});

/// A rectangle in PostScript points, origin at the lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub llx: i32,
    pub lly: i32,
    pub urx: i32,
    pub ury: i32,
}

impl BoundingBox {
    pub fn new(llx: i32, lly: i32, urx: i32, ury: i32) -> Self {
        Self { llx, lly, urx, ury }
    }

    pub fn width(&self) -> i32 {
        self.urx.saturating_sub(self.llx)
    }

    pub fn height(&self) -> i32 {
        self.ury.saturating_sub(self.lly)
    }

    /// `[llx, lly, urx, ury]`, the order the C boundary returns.
    pub fn as_array(&self) -> [i32; 4] {
        [self.llx, self.lly, self.urx, self.ury]
    }

    /// True when the box encloses nothing. The bbox device reports
    /// `0 0 0 0` for a page that marks no pixels.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "%%BoundingBox: {} {} {} {}",
            self.llx, self.lly, self.urx, self.ury
        )
    }
}

/// Extract the first `%%BoundingBox:` line with four integers.
///
/// Multi-page input produces one line per page; the first page wins.
pub fn parse_bbox_output(text: &str) -> Option<BoundingBox> {
    RE_BOUNDING_BOX.captures_iter(text).find_map(|caps| {
        let mut v = [0i32; 4];
        for (slot, i) in v.iter_mut().zip(1..=4) {
            *slot = caps.get(i)?.as_str().parse().ok()?;
        }
        Some(BoundingBox::from(v))
    })
}
