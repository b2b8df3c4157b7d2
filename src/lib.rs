//! # webpbin
//!
//! WebP encoding and decoding through the `cwebp` and `dwebp` tools from
//! libwebp. No compression code lives here: the crate fetches an official
//! libwebp release for the host (or finds the tools on `PATH`), runs them as
//! subprocesses and moves images in and out of them through files, pipes and
//! temporary PNGs.
//!
//! ```no_run
//! # fn main() -> webpbin::Result<()> {
//! let img = image::open("photo.png")?;
//!
//! let mut webp = Vec::new();
//! webpbin::encode(&mut webp, &img)?;
//!
//! let back = webpbin::decode(&webp[..])?;
//! assert_eq!(back.width(), img.width());
//! # Ok(())
//! # }
//! ```
//!
//! # Pipeline
//!
//! ```text
//! facade (CWebP / DWebP)  →  BinWrapper  →  Provisioner  →  invoke::run
//!   input, output, flags       arguments      executable       subprocess
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`cwebp`] | Encoder facade: file / reader / in-memory image → WebP file or writer |
//! | [`dwebp`] | Decoder facade: WebP file / reader → PNG file, writer or `DynamicImage` |
//! | [`codec`] | `encode` / `decode` and an [`image::ImageEncoder`] implementation |
//! | [`params`] | `Quality`, `Crop` and the shared `Output` selection |
//! | [`tool`] | `BinWrapper`: argument accumulation, reset-after-run, `-version` |
//! | [`invoke`] | Subprocess execution with stdin feeding and stdout routing |
//! | [`provision`] | Resolves a tool to an executable path, installing libwebp on demand |
//! | [`release`] | Table of published libwebp archives per platform and version |
//! | [`platform`] | Host OS / architecture detection |
//! | [`fetch`] | Archive download (`Fetch` trait, HTTP implementation) |
//! | [`archive`] | `.tar.gz` / `.zip` extraction with strip depth |
//! | [`config`] | `webpbin.toml` loading, validation and `WEBPBIN_*` overrides |
//! | [`error`] | Crate-level `Error` and `Result` |
//!
//! # Where the binaries come from
//!
//! The first run of either tool resolves it through the process-wide
//! [`Provisioner::shared`], configured from `webpbin.toml` in the working
//! directory and the environment:
//!
//! - `WEBPBIN_SKIP_DOWNLOAD=1` never downloads; the tools are taken from the
//!   vendor directory or `PATH`.
//! - `WEBPBIN_DEST` moves the vendor directory (default `vendor/webp`).
//! - `WEBPBIN_VERSION` picks another libwebp release (default `1.2.0`).
//!
//! Hosts without official binaries (32-bit ARM, Alpine) always use `PATH`.
//! Pass an explicit `Arc<Provisioner>` to the facades to bypass the shared one.

pub mod archive;
pub mod codec;
pub mod config;
pub mod cwebp;
pub mod dwebp;
pub mod error;
pub mod fetch;
pub mod invoke;
pub mod params;
pub mod platform;
pub mod provision;
pub mod release;
pub mod tool;

pub use codec::{Decoder, Encoder, WebpBinEncoder, decode, encode};
pub use cwebp::CWebP;
pub use dwebp::DWebP;
pub use error::{Error, Result};
pub use params::{Crop, Quality};
pub use provision::Provisioner;
pub use tool::Tool;

#[cfg(all(test, unix))]
pub(crate) mod test_helpers;
