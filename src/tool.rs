//! A reusable handle on one libwebp executable.
//!
//! [`BinWrapper`] accumulates arguments, resolves its executable through a
//! [`Provisioner`] at run time and hands the finished [`Invocation`] to
//! [`invoke::run`](crate::invoke::run). Arguments are cleared by every run,
//! whether it succeeds or not, so one wrapper serves any number of runs.

use crate::error::Result;
use crate::invoke::{self, Invocation, InvocationResult, StdoutMode};
use crate::provision::Provisioner;
use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Encoder: anything → WebP.
    CWebP,
    /// Decoder: WebP → PNG.
    DWebP,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::CWebP, Tool::DWebP];

    /// Executable stem, without platform suffix.
    pub fn name(self) -> &'static str {
        match self {
            Tool::CWebP => "cwebp",
            Tool::DWebP => "dwebp",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct BinWrapper {
    tool: Tool,
    provisioner: Option<Arc<Provisioner>>,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
}

impl BinWrapper {
    /// Wrapper that resolves through [`Provisioner::shared`].
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            provisioner: None,
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_provisioner(mut self, provisioner: Arc<Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments queued for the next run.
    pub fn pending_args(&self) -> &[OsString] {
        &self.args
    }

    /// Directory the child runs in. Persists across runs.
    pub fn working_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Drop queued arguments.
    pub fn reset(&mut self) -> &mut Self {
        self.args.clear();
        self
    }

    /// Path that will be executed.
    pub fn path(&self) -> Result<PathBuf> {
        let provisioner = match &self.provisioner {
            Some(p) => Arc::clone(p),
            None => Provisioner::shared()?,
        };
        Ok(provisioner.resolve(self.tool)?)
    }

    /// Run with the queued arguments.
    pub fn run<'a>(
        &mut self,
        stdin: Option<&'a mut (dyn Read + Send)>,
        stdout: StdoutMode<'a>,
    ) -> Result<InvocationResult> {
        let args = std::mem::take(&mut self.args);
        let program = self.path()?;

        let mut invocation = Invocation::new(program);
        invocation.args = args;
        invocation.stdin = stdin;
        invocation.stdout = stdout;
        invocation.working_dir = self.working_dir.clone();
        Ok(invoke::run(invocation)?)
    }

    /// The tool's `-version` output on one line.
    pub fn version(&mut self) -> Result<String> {
        self.reset().arg("-version");
        let result = self.run(None, StdoutMode::Capture)?;
        let text = String::from_utf8_lossy(&result.stdout);
        Ok(text.replace(['\r', '\n'], ""))
    }
}
