//! Engine revision metadata and its caller-visible version string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What `gsapi_revision` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GsRevision {
    pub product: String,
    pub copyright: String,
    /// Packed revision: `10021` for 10.02.1, or `952` for 9.52 before 9.53.
    pub revision: i64,
    /// Release date as `YYYYMMDD`.
    pub revision_date: i64,
}

/// Revisions below this use the pre-9.53 `major * 100 + minor` packing.
const THREE_PART_REVISION: i64 = 1000;

impl GsRevision {
    pub fn major(&self) -> i64 {
        if self.revision < THREE_PART_REVISION {
            self.revision / 100
        } else {
            self.revision / 1000
        }
    }

    pub fn minor(&self) -> i64 {
        if self.revision < THREE_PART_REVISION {
            self.revision % 100
        } else {
            (self.revision / 10) % 100
        }
    }

    pub fn patch(&self) -> i64 {
        if self.revision < THREE_PART_REVISION {
            0
        } else {
            self.revision % 10
        }
    }

    /// `major.minor.patch-build`, e.g. `10.02.1-20230913`.
    pub fn version_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GsRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}.{}-{}",
            self.major(),
            self.minor(),
            self.patch(),
            self.revision_date
        )
    }
}

impl From<libgs_auto::LibgsRevision> for GsRevision {
    fn from(r: libgs_auto::LibgsRevision) -> Self {
        Self {
            product: r.product,
            copyright: r.copyright,
            revision: r.revision,
            revision_date: r.revision_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(revision: i64, revision_date: i64) -> GsRevision {
        GsRevision {
            product: "GPL Ghostscript".into(),
            copyright: String::new(),
            revision,
            revision_date,
        }
    }

    #[test]
    fn formats_packed_revision() {
        assert_eq!(rev(10021, 20230913).version_string(), "10.02.1-20230913");
        assert_eq!(rev(9561, 20220404).version_string(), "9.56.1-20220404");
        assert_eq!(rev(10050, 20250312).version_string(), "10.05.0-20250312");
        assert_eq!(rev(950, 20191015).version_string(), "9.50.0-20191015");
        assert_eq!(rev(952, 20200320).version_string(), "9.52.0-20200320");
    }

    #[test]
    fn components() {
        let r = rev(10021, 0);
        assert_eq!((r.major(), r.minor(), r.patch()), (10, 2, 1));
        let old = rev(927, 0);
        assert_eq!((old.major(), old.minor(), old.patch()), (9, 27, 0));
    }
}
