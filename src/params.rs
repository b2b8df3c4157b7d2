//! Parameter types for cwebp invocations.
//!
//! These structs describe *what* the encoder should do, not *how* the flags
//! are spelled. [`cwebp`](crate::cwebp) turns them into arguments.
//!
//! ## Types
//!
//! - [`Quality`] — Compression factor for RGB channels (0–100). Values above
//!   100 are clamped on construction.
//! - [`Crop`] — Source rectangle applied before compression. Not validated:
//!   the rectangle must lie inside the source image, cwebp reports it otherwise.
//! - [`Output`] — Where either tool sends its result: a file it writes
//!   itself, or a writer fed from its stdout.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

/// Compression factor for RGB channels (0-100).
///
/// A small factor produces a smaller file with lower quality. Best quality
/// is achieved with 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.min(100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    /// cwebp's own default.
    fn default() -> Self {
        Self(75)
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

/// Crop rectangle with top-left corner at (`x`, `y`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Crop {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The four values following `-crop`, in cwebp's order.
    pub fn to_args(self) -> [String; 4] {
        [
            self.x.to_string(),
            self.y.to_string(),
            self.width.to_string(),
            self.height.to_string(),
        ]
    }
}

/// Destination of a conversion. Setting one replaces the other.
pub enum Output<'a> {
    File(PathBuf),
    Writer(Box<dyn Write + 'a>),
}

impl Output<'_> {
    /// Value passed to `-o`. `-` means stdout.
    pub fn arg(&self) -> OsString {
        match self {
            Output::File(path) => path.clone().into_os_string(),
            Output::Writer(_) => OsString::from("-"),
        }
    }
}

impl std::fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::File(path) => f.debug_tuple("File").field(path).finish(),
            Output::Writer(_) => f.write_str("Writer"),
        }
    }
}
