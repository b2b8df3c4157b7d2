//! Decoder facade around `dwebp`.
//!
//! Without an explicit output, `dwebp` writes PNG to stdout and [`DWebP::run`]
//! returns the parsed image. With a file or writer output the PNG ends up
//! there and `run` returns `None`.

use crate::error::{Error, Result};
use crate::invoke::StdoutMode;
use crate::params::Output;
use crate::provision::Provisioner;
use crate::tool::{BinWrapper, Tool};
use image::{DynamicImage, ImageFormat};
use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

/// What `dwebp` decodes.
pub enum Input<'a> {
    File(PathBuf),
    /// Piped to stdin as `-- -`.
    Reader(Box<dyn Read + Send + 'a>),
}

impl std::fmt::Debug for Input<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Input::File(path) => f.debug_tuple("File").field(path).finish(),
            Input::Reader(_) => f.write_str("Reader"),
        }
    }
}

/// Decompresses WebP files into PNG.
#[derive(Debug)]
pub struct DWebP<'a> {
    bin: BinWrapper,
    input: Option<Input<'a>>,
    output: Option<Output<'a>>,
}

impl Default for DWebP<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> DWebP<'a> {
    /// Decoder using the process-wide [`Provisioner::shared`].
    pub fn new() -> Self {
        Self::from_bin(BinWrapper::new(Tool::DWebP))
    }

    pub fn with_provisioner(provisioner: Arc<Provisioner>) -> Self {
        Self::from_bin(BinWrapper::new(Tool::DWebP).with_provisioner(provisioner))
    }

    fn from_bin(bin: BinWrapper) -> Self {
        Self {
            bin,
            input: None,
            output: None,
        }
    }

    pub fn input_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.input = Some(Input::File(path.into()));
        self
    }

    pub fn input(&mut self, reader: impl Read + Send + 'a) -> &mut Self {
        self.input = Some(Input::Reader(Box::new(reader)));
        self
    }

    pub fn output_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.output = Some(Output::File(path.into()));
        self
    }

    /// Stream the PNG bytes into `writer`.
    pub fn output(&mut self, writer: impl std::io::Write + 'a) -> &mut Self {
        self.output = Some(Output::Writer(Box::new(writer)));
        self
    }

    pub fn working_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.bin.working_dir(dir);
        self
    }

    /// Forget input and output.
    pub fn reset(&mut self) -> &mut Self {
        self.input = None;
        self.output = None;
        self.bin.reset();
        self
    }

    /// `dwebp -version`.
    pub fn version(&mut self) -> Result<String> {
        self.bin.version()
    }

    /// Decode. Returns the image only when no output was set.
    pub fn run(&mut self) -> Result<Option<DynamicImage>> {
        let input = self.input.as_mut().ok_or(Error::UndefinedInput)?;

        let mut stdin = None;
        let input_args = match input {
            Input::File(path) => vec![path.clone().into_os_string()],
            Input::Reader(reader) => {
                stdin = Some(reader.as_mut() as &mut (dyn Read + Send));
                vec![OsString::from("--"), OsString::from("-")]
            }
        };

        let (out_arg, stdout) = match self.output.as_mut() {
            None => (OsString::from("-"), StdoutMode::Capture),
            Some(output) => (
                output.arg(),
                match output {
                    Output::File(_) => StdoutMode::Discard,
                    Output::Writer(writer) => StdoutMode::Sink(writer.as_mut()),
                },
            ),
        };
        let capture = matches!(stdout, StdoutMode::Capture);

        self.bin.arg("-o").arg(out_arg).args(input_args);
        let result = self.bin.run(stdin, stdout)?;

        if !capture {
            return Ok(None);
        }
        if result.stdout.is_empty() {
            return Err(Error::NoImage);
        }
        let image = image::load_from_memory_with_format(&result.stdout, ImageFormat::Png)?;
        Ok(Some(image))
    }
}
