//! `encode` / `decode` in the shape of an image codec.
//!
//! The free functions use the process-wide provisioner and cwebp's default
//! quality. [`Encoder`] and [`Decoder`] carry a quality and an explicit
//! provisioner. [`WebpBinEncoder`] implements [`image::ImageEncoder`], so any
//! `DynamicImage` can be written with
//! [`write_with_encoder`](DynamicImage::write_with_encoder).

use crate::cwebp::CWebP;
use crate::dwebp::DWebP;
use crate::error::{Error, Result};
use crate::params::Quality;
use crate::provision::Provisioner;
use image::error::{
    EncodingError, ImageFormatHint, ParameterError, ParameterErrorKind, UnsupportedError,
    UnsupportedErrorKind,
};
use image::{
    DynamicImage, ExtendedColorType, ImageBuffer, ImageEncoder, ImageError, ImageFormat,
    ImageResult,
};
use std::io::{Read, Write};
use std::sync::Arc;

/// Quality used by [`encode`].
pub const DEFAULT_QUALITY: u32 = 75;

/// Encode `image` as WebP into `writer` at [`DEFAULT_QUALITY`].
pub fn encode<W: Write>(writer: W, image: &DynamicImage) -> Result<()> {
    Encoder::default().encode(writer, image)
}

/// Decode WebP bytes from `reader`.
pub fn decode<R: Read + Send>(reader: R) -> Result<DynamicImage> {
    Decoder::default().decode(reader)
}

/// WebP encoder with a fixed quality.
#[derive(Debug, Clone)]
pub struct Encoder {
    quality: Quality,
    provisioner: Option<Arc<Provisioner>>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl Encoder {
    /// `quality` is clamped to 100.
    pub fn new(quality: u32) -> Self {
        Self {
            quality: Quality::new(quality),
            provisioner: None,
        }
    }

    pub fn with_provisioner(mut self, provisioner: Arc<Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn quality(&self) -> u32 {
        self.quality.value()
    }

    pub fn encode<W: Write>(&self, writer: W, image: &DynamicImage) -> Result<()> {
        let mut enc = match &self.provisioner {
            Some(p) => CWebP::with_provisioner(Arc::clone(p)),
            None => CWebP::new(),
        };
        enc.quality(self.quality.value())
            .input_image(image)
            .output(writer)
            .run()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Decoder {
    provisioner: Option<Arc<Provisioner>>,
}

impl Decoder {
    pub fn with_provisioner(mut self, provisioner: Arc<Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn decode<R: Read + Send>(&self, reader: R) -> Result<DynamicImage> {
        let mut dec = match &self.provisioner {
            Some(p) => DWebP::with_provisioner(Arc::clone(p)),
            None => DWebP::new(),
        };
        dec.input(reader).run()?.ok_or(Error::NoImage)
    }
}

/// [`ImageEncoder`] that compresses through `cwebp`.
///
/// ```no_run
/// use webpbin::WebpBinEncoder;
///
/// let img = image::open("photo.png").unwrap();
/// let out = std::fs::File::create("photo.webp").unwrap();
/// img.write_with_encoder(WebpBinEncoder::new(out).with_quality(90)).unwrap();
/// ```
pub struct WebpBinEncoder<W: Write> {
    writer: W,
    encoder: Encoder,
}

impl<W: Write> WebpBinEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            encoder: Encoder::default(),
        }
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.encoder.quality = Quality::new(quality);
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<Provisioner>) -> Self {
        self.encoder = self.encoder.with_provisioner(provisioner);
        self
    }
}

impl<W: Write> ImageEncoder for WebpBinEncoder<W> {
    fn write_image(
        self,
        buf: &[u8],
        width: u32,
        height: u32,
        color_type: ExtendedColorType,
    ) -> ImageResult<()> {
        let pixels = buf.to_vec();
        let image = match color_type {
            ExtendedColorType::L8 => ImageBuffer::from_raw(width, height, pixels)
                .map(DynamicImage::ImageLuma8),
            ExtendedColorType::La8 => ImageBuffer::from_raw(width, height, pixels)
                .map(DynamicImage::ImageLumaA8),
            ExtendedColorType::Rgb8 => ImageBuffer::from_raw(width, height, pixels)
                .map(DynamicImage::ImageRgb8),
            ExtendedColorType::Rgba8 => ImageBuffer::from_raw(width, height, pixels)
                .map(DynamicImage::ImageRgba8),
            other => {
                return Err(ImageError::Unsupported(
                    UnsupportedError::from_format_and_kind(
                        ImageFormatHint::Exact(ImageFormat::WebP),
                        UnsupportedErrorKind::Color(other),
                    ),
                ));
            }
        };
        let image = image.ok_or_else(|| {
            ImageError::Parameter(ParameterError::from_kind(
                ParameterErrorKind::DimensionMismatch,
            ))
        })?;

        self.encoder.encode(self.writer, &image).map_err(|e| {
            ImageError::Encoding(EncodingError::new(
                ImageFormatHint::Exact(ImageFormat::WebP),
                e.to_string(),
            ))
        })
    }
}
