//! Encoder facade around `cwebp`.
//!
//! ```no_run
//! # fn main() -> webpbin::Result<()> {
//! let img = image::open("photo.png")?;
//! webpbin::CWebP::new()
//!     .input_image(&img)
//!     .quality(80)
//!     .output_file("photo.webp")
//!     .run()?;
//! # Ok(())
//! # }
//! ```
//!
//! Inputs and outputs are single-choice: each setter replaces whatever was
//! selected before. Quality and crop apply to one run and are cleared by it;
//! input, output and working directory stay until [`CWebP::reset`].
//!
//! An in-memory image is written to a temporary PNG (no filtering, fast
//! compression) and removed when the run ends, whatever its outcome.

use crate::error::{Error, Result};
use crate::invoke::StdoutMode;
use crate::params::{Crop, Output, Quality};
use crate::provision::Provisioner;
use crate::tool::{BinWrapper, Tool};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use std::borrow::Cow;
use std::ffi::OsString;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

/// What `cwebp` compresses.
pub enum Input<'a> {
    File(PathBuf),
    /// Piped to stdin as `-- -`.
    Reader(Box<dyn Read + Send + 'a>),
    /// Written to a temporary PNG first.
    Image(&'a DynamicImage),
}

impl std::fmt::Debug for Input<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Input::File(path) => f.debug_tuple("File").field(path).finish(),
            Input::Reader(_) => f.write_str("Reader"),
            Input::Image(img) => write!(f, "Image({}x{})", img.width(), img.height()),
        }
    }
}

/// Compresses an image into WebP format.
#[derive(Debug)]
pub struct CWebP<'a> {
    bin: BinWrapper,
    input: Option<Input<'a>>,
    output: Option<Output<'a>>,
    quality: Option<Quality>,
    crop: Option<Crop>,
}

impl Default for CWebP<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> CWebP<'a> {
    /// Encoder using the process-wide [`Provisioner::shared`].
    pub fn new() -> Self {
        Self::from_bin(BinWrapper::new(Tool::CWebP))
    }

    pub fn with_provisioner(provisioner: Arc<Provisioner>) -> Self {
        Self::from_bin(BinWrapper::new(Tool::CWebP).with_provisioner(provisioner))
    }

    fn from_bin(bin: BinWrapper) -> Self {
        Self {
            bin,
            input: None,
            output: None,
            quality: None,
            crop: None,
        }
    }

    /// Compress the file at `path`.
    pub fn input_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.input = Some(Input::File(path.into()));
        self
    }

    /// Compress bytes read from `reader` (any format cwebp accepts).
    pub fn input(&mut self, reader: impl Read + Send + 'a) -> &mut Self {
        self.input = Some(Input::Reader(Box::new(reader)));
        self
    }

    /// Compress an in-memory image.
    pub fn input_image(&mut self, image: &'a DynamicImage) -> &mut Self {
        self.input = Some(Input::Image(image));
        self
    }

    pub fn output_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.output = Some(Output::File(path.into()));
        self
    }

    /// Stream the WebP bytes into `writer`.
    pub fn output(&mut self, writer: impl Write + 'a) -> &mut Self {
        self.output = Some(Output::Writer(Box::new(writer)));
        self
    }

    /// Compression factor for RGB channels, clamped to 100.
    pub fn quality(&mut self, quality: u32) -> &mut Self {
        self.quality = Some(Quality::new(quality));
        self
    }

    /// Crop the source to the rectangle at (`x`, `y`) before compressing.
    pub fn crop(&mut self, x: u32, y: u32, width: u32, height: u32) -> &mut Self {
        self.crop = Some(Crop::new(x, y, width, height));
        self
    }

    /// Run `cwebp` in `dir`. Relative paths resolve against it.
    pub fn working_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.bin.working_dir(dir);
        self
    }

    /// Forget input, output, quality and crop.
    pub fn reset(&mut self) -> &mut Self {
        self.input = None;
        self.output = None;
        self.quality = None;
        self.crop = None;
        self.bin.reset();
        self
    }

    /// `cwebp -version`.
    pub fn version(&mut self) -> Result<String> {
        self.bin.version()
    }

    pub fn run(&mut self) -> Result<()> {
        let quality = self.quality.take();
        let crop = self.crop.take();

        let output = self.output.as_mut().ok_or(Error::UndefinedOutput)?;
        let input = self.input.as_mut().ok_or(Error::UndefinedInput)?;

        // Lives until the tool has exited
        let mut temp: Option<NamedTempFile> = None;
        let mut stdin = None;
        let input_args = match input {
            Input::File(path) => vec![path.clone().into_os_string()],
            Input::Reader(reader) => {
                stdin = Some(reader.as_mut() as &mut (dyn Read + Send));
                vec![OsString::from("--"), OsString::from("-")]
            }
            Input::Image(image) => {
                let file = write_temp_png(image)?;
                let path = file.path().as_os_str().to_owned();
                temp = Some(file);
                vec![path]
            }
        };

        let args = assemble_args(quality, crop, output.arg(), input_args);
        let stdout = match output {
            Output::File(_) => StdoutMode::Discard,
            Output::Writer(writer) => StdoutMode::Sink(writer.as_mut()),
        };

        self.bin.args(args);
        self.bin.run(stdin, stdout)?;
        drop(temp);
        Ok(())
    }
}

/// `-q`, `-crop`, `-o`, then the input operands.
fn assemble_args(
    quality: Option<Quality>,
    crop: Option<Crop>,
    output: OsString,
    input: Vec<OsString>,
) -> Vec<OsString> {
    let mut args = Vec::with_capacity(8 + input.len());
    if let Some(q) = quality {
        args.push("-q".into());
        args.push(q.value().to_string().into());
    }
    if let Some(c) = crop {
        args.push("-crop".into());
        args.extend(c.to_args().map(OsString::from));
    }
    args.push("-o".into());
    args.push(output);
    args.extend(input);
    args
}

/// Write `image` as a PNG that is cheap to produce and for cwebp to read.
fn write_temp_png(image: &DynamicImage) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("webpbin-")
        .suffix(".png")
        .tempfile()?;

    // PNG has no float pixel formats
    let image: Cow<'_, DynamicImage> = match image {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
        }
        _ => Cow::Borrowed(image),
    };

    let mut writer = BufWriter::new(file.as_file_mut());
    let encoder =
        PngEncoder::new_with_quality(&mut writer, CompressionType::Fast, FilterType::NoFilter);
    image.write_with_encoder(encoder)?;
    writer.flush()?;
    drop(writer);

    debug!(
        path = %file.path().display(),
        width = image.width(),
        height = image.height(),
        "wrote temporary PNG"
    );
    Ok(file)
}
