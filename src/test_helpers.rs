//! Shared test utilities.
//!
//! Provides stand-in `cwebp`/`dwebp` executables so facade and codec tests
//! run the whole pipeline (provision → argument assembly → subprocess →
//! output routing) without network access or a libwebp install.
//!
//! The fakes are shell scripts that understand the flags this crate emits:
//!
//! - `-version` prints `1.2.0`.
//! - `-q N` and `-crop X Y W H` are accepted and ignored.
//! - `-o PATH` names the output; `-o -` (or no `-o`) writes to stdout.
//! - `-- -` reads the input from stdin; any other operand is an input path.
//!
//! The "conversion" copies input bytes to the output unchanged, so a PNG fed
//! to the fake encoder comes back out of the fake decoder as the same PNG.
//! A missing input file prints `Could not read input file` to stderr and
//! exits 1, like the real tools.
//!
//! When an `args.log` file exists in the working directory, each run appends
//! its argument list to it. Tests that care about argument order create the
//! file and point the facade's working directory at it.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let log = args_log(tmp.path());
//! let mut enc = CWebP::with_provisioner(fake_provisioner());
//! enc.working_dir(tmp.path());
//! // ... run ...
//! assert_eq!(read_args(&log), vec!["-q 50 -o out.webp in.png"]);
//! ```

use crate::config::ProvisionConfig;
use crate::provision::Provisioner;
use image::{DynamicImage, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

const FAKE_TOOL: &str = r#"#!/bin/sh
[ -f args.log ] && printf '%s\n' "$*" >> args.log
out=""
in=""
while [ $# -gt 0 ]; do
  case "$1" in
    -version) echo "1.2.0"; exit 0 ;;
    -q) shift 2 ;;
    -crop) shift 5 ;;
    -o) out="$2"; shift 2 ;;
    --) shift ;;
    *) in="$1"; shift ;;
  esac
done
if [ -z "$in" ]; then
  echo "No input file specified!" >&2
  exit 1
fi
if [ "$in" != "-" ] && [ ! -f "$in" ]; then
  echo "Could not read input file '$in'" >&2
  exit 1
fi
if [ "$in" = "-" ]; then
  if [ -z "$out" ] || [ "$out" = "-" ]; then cat; else cat > "$out"; fi
else
  if [ -z "$out" ] || [ "$out" = "-" ]; then cat "$in"; else cat "$in" > "$out"; fi
fi
"#;

static FAKE_BIN: OnceLock<TempDir> = OnceLock::new();

/// Directory holding the fake `cwebp` and `dwebp`.
///
/// Written once per test process; a script that is rewritten while another
/// thread executes it fails with `ETXTBSY`.
pub fn fake_bin_dir() -> &'static Path {
    FAKE_BIN
        .get_or_init(|| {
            use std::os::unix::fs::PermissionsExt;
            let dir = TempDir::new().unwrap();
            for name in ["cwebp", "dwebp"] {
                let path = dir.path().join(name);
                fs::write(&path, FAKE_TOOL).unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }
            dir
        })
        .path()
}

/// Provisioner that never downloads and resolves to the fakes.
pub fn fake_provisioner() -> Arc<Provisioner> {
    let config = ProvisionConfig {
        skip_download: true,
        detect_unsupported: false,
        dest: fake_bin_dir().to_path_buf(),
        ..ProvisionConfig::default()
    };
    Arc::new(Provisioner::new(config))
}

/// Fakes copied into a fresh directory below the current one, with a
/// provisioner whose `dest` is that relative path, like the default
/// `vendor/webp`. The directory is removed when the `TempDir` drops.
pub fn relative_fake_provisioner() -> (TempDir, Arc<Provisioner>) {
    let vendor = tempfile::Builder::new()
        .prefix("vendor-")
        .tempdir_in(".")
        .unwrap();
    for name in ["cwebp", "dwebp"] {
        fs::copy(fake_bin_dir().join(name), vendor.path().join(name)).unwrap();
    }
    let config = ProvisionConfig {
        skip_download: true,
        detect_unsupported: false,
        dest: vendor.path().to_path_buf(),
        ..ProvisionConfig::default()
    };
    (vendor, Arc::new(Provisioner::new(config)))
}

/// Create an empty `args.log` in `dir` and return its path.
pub fn args_log(dir: &Path) -> PathBuf {
    let path = dir.join("args.log");
    fs::write(&path, "").unwrap();
    path
}

/// One line per run, as logged by the fakes.
pub fn read_args(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// A small RGB gradient.
pub fn sample_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7) as u8, (y * 13) as u8, ((x + y) * 3) as u8])
    }))
}

/// Encode `image` as PNG into `dir/name`.
pub fn write_png(dir: &Path, name: &str, image: &DynamicImage) -> PathBuf {
    let path = dir.join(name);
    image.save_with_format(&path, image::ImageFormat::Png).unwrap();
    path
}
