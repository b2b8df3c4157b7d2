//! Host platform detection.
//!
//! libwebp only publishes prebuilt binaries for a handful of targets. This
//! module names the host in the vocabulary the release table uses and spots
//! hosts where a download would never work (32-bit ARM, Alpine's musl
//! userland), so the provisioner can go straight to the system `PATH`.

use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Os {
    pub fn from_name(name: &str) -> Self {
        match name {
            "linux" => Os::Linux,
            "macos" | "darwin" => Os::MacOs,
            "windows" | "win32" => Os::Windows,
            _ => Os::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    Aarch64,
    Other,
}

impl Arch {
    pub fn from_name(name: &str) -> Self {
        match name {
            "x86" | "i386" | "i686" => Arch::X86,
            "x86_64" | "x64" | "amd64" => Arch::X86_64,
            "arm" => Arch::Arm,
            "aarch64" | "arm64" => Arch::Aarch64,
            _ => Arch::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform this binary was compiled for.
    pub fn host() -> Self {
        Self {
            os: Os::from_name(std::env::consts::OS),
            arch: Arch::from_name(std::env::consts::ARCH),
        }
    }

    /// File name of a tool on this platform (`cwebp` / `cwebp.exe`).
    pub fn executable_name(&self, stem: &str) -> String {
        match self.os {
            Os::Windows => format!("{stem}.exe"),
            _ => stem.to_string(),
        }
    }

    /// Whether prebuilt libwebp binaries can never run here.
    ///
    /// `issue` is the content of `/etc/issue`, when readable.
    pub fn lacks_prebuilt_binaries(&self, issue: Option<&str>) -> bool {
        if self.arch == Arch::Arm {
            return true;
        }
        self.os == Os::Linux && issue.is_some_and(|text| text.to_lowercase().contains("alpine"))
    }

    /// [`lacks_prebuilt_binaries`](Self::lacks_prebuilt_binaries) against the
    /// live `/etc/issue`.
    pub fn detect_unsupported(&self) -> bool {
        let issue = if self.os == Os::Linux {
            std::fs::read_to_string(Path::new("/etc/issue")).ok()
        } else {
            None
        };
        self.lacks_prebuilt_binaries(issue.as_deref())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.os, self.arch)
    }
}
