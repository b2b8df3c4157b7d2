//! Binary provisioning.
//!
//! The [`Provisioner`] turns a [`Tool`] into a path that can be executed:
//!
//! 1. **Skip download** (configured, or the host cannot run prebuilt
//!    binaries): use `<dest>/<exe>` when it exists, else the bare executable
//!    name so the OS searches `PATH`.
//! 2. **Installed**: `<dest>/<exe>` exists and the install stamp (if any)
//!    names the configured version. Behind a matching stamp the tool may
//!    also sit deeper in the vendor directory.
//! 3. **Download**: look the host up in the [release table](crate::release),
//!    fetch the archive, unpack it with the strip depth, mark the tools
//!    executable and write the stamp.
//! 4. **Unmapped host**: fall back to `PATH` when `path_fallback` is on,
//!    otherwise fail with [`ProvisionError::UnsupportedPlatform`].
//!
//! ## Install stamp
//!
//! `<dest>/.webpbin-install.json` records the installed version and the
//! SHA-256 of the archive it came from. A stamp for another version triggers
//! a re-install; a vendor directory without a stamp (binaries dropped in by
//! hand) is trusted as-is.
//!
//! ## Sharing
//!
//! The configuration is immutable after construction. First-time installs
//! from several threads are serialized by an internal lock, so a provisioner
//! can be shared through `Arc` by any number of facades.
//! [`Provisioner::shared`] is the process-wide default built from
//! `webpbin.toml` and the environment.

use crate::archive::{self, ArchiveError};
use crate::config::{self, ConfigError, ProvisionConfig};
use crate::fetch::{Fetch, FetchError, HttpFetcher};
use crate::platform::Platform;
use crate::release::BinarySpec;
use crate::tool::Tool;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Name of the install stamp within the vendor directory.
const STAMP_FILENAME: &str = ".webpbin-install.json";

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to extract {archive}: {source}")]
    Extract {
        archive: String,
        #[source]
        source: ArchiveError,
    },
    #[error(
        "no prebuilt libwebp {version} for {platform}; install cwebp/dwebp manually or enable path_fallback"
    )]
    UnsupportedPlatform { platform: Platform, version: String },
    #[error("{tool} not found in {dest} after installing {archive}")]
    MissingExecutable {
        tool: &'static str,
        dest: String,
        archive: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("install stamp error: {0}")]
    Stamp(#[from] serde_json::Error),
}

/// Record of what was unpacked into the vendor directory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InstallStamp {
    pub version: String,
    pub archive: String,
    pub sha256: String,
}

impl InstallStamp {
    pub fn load(dest: &Path) -> Option<Self> {
        let content = fs::read_to_string(dest.join(STAMP_FILENAME)).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn save(&self, dest: &Path) -> Result<(), ProvisionError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(dest.join(STAMP_FILENAME), json)?;
        Ok(())
    }
}

/// SHA-256 of a byte slice, as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

static SHARED: OnceLock<Arc<Provisioner>> = OnceLock::new();

pub struct Provisioner {
    config: ProvisionConfig,
    platform: Platform,
    unsupported: bool,
    fetcher: Box<dyn Fetch>,
    install_lock: Mutex<()>,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("unsupported", &self.unsupported)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Provisioner for the host platform, downloading over HTTP.
    ///
    /// A relative `dest` is anchored to the current directory here, so the
    /// resolved tools still start when a run changes the child's directory.
    pub fn new(mut config: ProvisionConfig) -> Self {
        if let Ok(dest) = std::path::absolute(&config.dest) {
            config.dest = dest;
        }
        let platform = Platform::host();
        let unsupported = config.detect_unsupported && platform.detect_unsupported();
        if unsupported {
            debug!(%platform, "host cannot run prebuilt libwebp binaries; skipping download");
        }
        Self {
            config,
            platform,
            unsupported,
            fetcher: Box::new(HttpFetcher::new()),
            install_lock: Mutex::new(()),
        }
    }

    /// Build from `webpbin.toml` in the working directory plus `WEBPBIN_*`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir()?;
        let config = config::load_config_with_env(&cwd)?;
        Ok(Self::new(config.provision))
    }

    /// The process-wide default, built on first use.
    pub fn shared() -> Result<Arc<Self>, ConfigError> {
        if let Some(existing) = SHARED.get() {
            return Ok(Arc::clone(existing));
        }
        let built = Arc::new(Self::from_env()?);
        Ok(Arc::clone(SHARED.get_or_init(|| built)))
    }

    /// Replace the downloader.
    pub fn with_fetcher(mut self, fetcher: impl Fetch + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    /// Pretend to run on `platform`. `unsupported` stands in for host detection.
    pub fn with_platform(mut self, platform: Platform, unsupported: bool) -> Self {
        self.platform = platform;
        self.unsupported = unsupported;
        self
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Whether a download would ever be attempted.
    pub fn downloads_enabled(&self) -> bool {
        !self.config.skip_download && !self.unsupported
    }

    /// Release archive for the configured version on this platform.
    pub fn binary_spec(&self) -> Option<BinarySpec> {
        BinarySpec::resolve(
            &self.config.version,
            self.platform,
            &self.config.base_url,
            &self.config.dest,
        )
    }

    /// Path to execute for `tool`, installing it first if needed.
    pub fn resolve(&self, tool: Tool) -> Result<PathBuf, ProvisionError> {
        let exe = self.platform.executable_name(tool.name());

        if !self.downloads_enabled() {
            return Ok(self.local_or_path(&exe));
        }

        // Held across the check so no caller sees a half-written install
        let _guard = self
            .install_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(path) = self.installed_path(&exe) {
            return Ok(path);
        }

        let Some(spec) = self.binary_spec() else {
            if self.config.path_fallback {
                warn!(
                    platform = %self.platform,
                    version = %self.config.version,
                    "no prebuilt libwebp archive; using {exe} from PATH"
                );
                return Ok(self.local_or_path(&exe));
            }
            return Err(ProvisionError::UnsupportedPlatform {
                platform: self.platform,
                version: self.config.version.clone(),
            });
        };

        self.install(&spec)?;
        self.locate(tool, &exe, &spec)
    }

    /// Download and unpack the configured release, regardless of what is
    /// already in the vendor directory.
    pub fn install_now(&self) -> Result<InstallStamp, ProvisionError> {
        let spec = self
            .binary_spec()
            .ok_or_else(|| ProvisionError::UnsupportedPlatform {
                platform: self.platform,
                version: self.config.version.clone(),
            })?;
        let _guard = self
            .install_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.install(&spec)
    }

    fn install(&self, spec: &BinarySpec) -> Result<InstallStamp, ProvisionError> {
        info!(archive = %spec.archive_name, dest = %spec.dest.display(), "installing libwebp");
        let bytes = self.fetcher.fetch(&spec.url)?;
        let sha256 = sha256_hex(&bytes);

        fs::create_dir_all(&spec.dest)?;
        archive::extract(&bytes, spec.format, &spec.dest, spec.strip).map_err(|source| {
            ProvisionError::Extract {
                archive: spec.archive_name.clone(),
                source,
            }
        })?;

        for tool in Tool::ALL {
            let path = spec.dest.join(spec.platform.executable_name(tool.name()));
            if path.is_file() {
                mark_executable(&path)?;
            }
        }

        let stamp = InstallStamp {
            version: spec.version.clone(),
            archive: spec.archive_name.clone(),
            sha256,
        };
        stamp.save(&spec.dest)?;
        info!(version = %stamp.version, sha256 = %stamp.sha256, "libwebp installed");
        Ok(stamp)
    }

    /// Existing install of the configured version, if any.
    fn installed_path(&self, exe: &str) -> Option<PathBuf> {
        let stamp = InstallStamp::load(&self.config.dest);
        if let Some(stamp) = &stamp {
            if stamp.version != self.config.version {
                debug!(
                    installed = %stamp.version,
                    wanted = %self.config.version,
                    "installed libwebp version differs"
                );
                return None;
            }
        }

        let direct = self.config.dest.join(exe);
        if direct.is_file() {
            return Some(direct);
        }
        // Nested layouts are only trusted behind a matching stamp
        stamp.and_then(|_| find_below(&self.config.dest, exe))
    }

    /// `<dest>/<exe>` when present, else the bare name for a `PATH` lookup.
    fn local_or_path(&self, exe: &str) -> PathBuf {
        let local = self.config.dest.join(exe);
        if local.is_file() {
            local
        } else {
            debug!(exe, "using system PATH");
            PathBuf::from(exe)
        }
    }

    /// Find `exe` in the vendor directory after an install, searching
    /// subdirectories when the archive did not match the strip depth.
    fn locate(&self, tool: Tool, exe: &str, spec: &BinarySpec) -> Result<PathBuf, ProvisionError> {
        let direct = spec.dest.join(exe);
        if direct.is_file() {
            return Ok(direct);
        }

        match find_below(&spec.dest, exe) {
            Some(path) => {
                debug!(path = %path.display(), "found {exe} below vendor root");
                mark_executable(&path)?;
                Ok(path)
            }
            None => Err(ProvisionError::MissingExecutable {
                tool: tool.name(),
                dest: spec.dest.display().to_string(),
                archive: spec.archive_name.clone(),
            }),
        }
    }
}

/// First file named `exe` anywhere below `dir`.
fn find_below(dir: &Path, exe: &str) -> Option<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == exe)
        .map(|e| e.into_path())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::tar_gz;
    use crate::fetch::tests::MockFetcher;
    use crate::platform::{Arch, Os};
    use tempfile::TempDir;

    const LINUX: Platform = Platform {
        os: Os::Linux,
        arch: Arch::X86_64,
    };
    const URL: &str = "https://example.com/webp/libwebp-1.2.0-linux-x86-64.tar.gz";

    fn config(dest: &Path) -> ProvisionConfig {
        ProvisionConfig {
            dest: dest.to_path_buf(),
            base_url: "https://example.com/webp/".to_string(),
            ..ProvisionConfig::default()
        }
    }

    fn release_archive() -> Vec<u8> {
        tar_gz(&[
            ("libwebp-1.2.0-linux-x86-64/bin/cwebp", b"#!/bin/sh\n", 0o644),
            ("libwebp-1.2.0-linux-x86-64/bin/dwebp", b"#!/bin/sh\n", 0o644),
            ("libwebp-1.2.0-linux-x86-64/README", b"readme", 0o644),
        ])
    }

    fn provisioner(cfg: ProvisionConfig, fetcher: MockFetcher) -> Provisioner {
        Provisioner::new(cfg)
            .with_platform(LINUX, false)
            .with_fetcher(fetcher)
    }

    #[test]
    fn downloads_extracts_and_stamps() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("vendor");
        let p = provisioner(config(&dest), MockFetcher::with(URL, release_archive()));

        let path = p.resolve(Tool::CWebP).unwrap();

        assert_eq!(path, dest.join("cwebp"));
        assert!(dest.join("dwebp").is_file());
        let stamp = InstallStamp::load(&dest).unwrap();
        assert_eq!(stamp.version, "1.2.0");
        assert_eq!(stamp.archive, "libwebp-1.2.0-linux-x86-64.tar.gz");
        assert_eq!(stamp.sha256, sha256_hex(&release_archive()));
    }

    #[cfg(unix)]
    #[test]
    fn installed_tools_are_executable() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let p = provisioner(config(tmp.path()), MockFetcher::with(URL, release_archive()));

        let path = p.resolve(Tool::DWebP).unwrap();

        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn second_resolve_reuses_install() {
        let tmp = TempDir::new().unwrap();
        let fetcher = MockFetcher::with(URL, release_archive());
        let log = fetcher.log();
        let p = provisioner(config(tmp.path()), fetcher);

        p.resolve(Tool::CWebP).unwrap();
        p.resolve(Tool::DWebP).unwrap();
        p.resolve(Tool::CWebP).unwrap();

        // One archive serves both tools
        assert_eq!(*log.lock().unwrap(), vec![URL.to_string()]);
    }

    #[test]
    fn stale_stamp_triggers_reinstall() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("cwebp"), b"old").unwrap();
        InstallStamp {
            version: "0.6.0".into(),
            archive: "libwebp-0.6.0-linux-x86-64.tar.gz".into(),
            sha256: "00".into(),
        }
        .save(tmp.path())
        .unwrap();
        let p = provisioner(config(tmp.path()), MockFetcher::with(URL, release_archive()));

        p.resolve(Tool::CWebP).unwrap();

        assert_eq!(fs::read(tmp.path().join("cwebp")).unwrap(), b"#!/bin/sh\n");
        assert_eq!(InstallStamp::load(tmp.path()).unwrap().version, "1.2.0");
    }

    #[test]
    fn unstamped_binaries_are_trusted() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("cwebp"), b"manual").unwrap();
        let fetcher = MockFetcher::default();
        let log = fetcher.log();
        let p = provisioner(config(tmp.path()), fetcher);

        assert_eq!(p.resolve(Tool::CWebP).unwrap(), tmp.path().join("cwebp"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn skip_download_prefers_dest_then_path() {
        let tmp = TempDir::new().unwrap();
        let cfg = ProvisionConfig {
            skip_download: true,
            ..config(tmp.path())
        };
        let fetcher = MockFetcher::default();
        let log = fetcher.log();
        let p = provisioner(cfg, fetcher);

        assert_eq!(p.resolve(Tool::CWebP).unwrap(), PathBuf::from("cwebp"));

        fs::write(tmp.path().join("cwebp"), b"local").unwrap();
        assert_eq!(p.resolve(Tool::CWebP).unwrap(), tmp.path().join("cwebp"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn unsupported_host_never_downloads() {
        let tmp = TempDir::new().unwrap();
        let fetcher = MockFetcher::default();
        let log = fetcher.log();
        let p = Provisioner::new(config(tmp.path()))
            .with_platform(Platform::new(Os::Linux, Arch::Arm), true)
            .with_fetcher(fetcher);

        assert!(!p.downloads_enabled());
        assert_eq!(p.resolve(Tool::DWebP).unwrap(), PathBuf::from("dwebp"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn unmapped_platform_falls_back_to_path() {
        let tmp = TempDir::new().unwrap();
        let p = Provisioner::new(config(tmp.path()))
            .with_platform(Platform::new(Os::Linux, Arch::Aarch64), false)
            .with_fetcher(MockFetcher::default());

        assert_eq!(p.resolve(Tool::CWebP).unwrap(), PathBuf::from("cwebp"));
    }

    #[test]
    fn unmapped_platform_without_fallback_fails() {
        let tmp = TempDir::new().unwrap();
        let cfg = ProvisionConfig {
            path_fallback: false,
            ..config(tmp.path())
        };
        let p = Provisioner::new(cfg)
            .with_platform(Platform::new(Os::Linux, Arch::Aarch64), false)
            .with_fetcher(MockFetcher::default());

        let err = p.resolve(Tool::CWebP).unwrap_err();
        assert!(matches!(err, ProvisionError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn fetch_failure_is_surfaced() {
        let tmp = TempDir::new().unwrap();
        let p = provisioner(config(tmp.path()), MockFetcher::default());

        let err = p.resolve(Tool::CWebP).unwrap_err();
        assert!(matches!(err, ProvisionError::Fetch(_)));
        assert!(!tmp.path().join("cwebp").exists());
    }

    #[test]
    fn corrupt_archive_is_extract_error() {
        let tmp = TempDir::new().unwrap();
        let p = provisioner(
            config(tmp.path()),
            MockFetcher::with(URL, b"definitely not gzip".to_vec()),
        );

        let err = p.resolve(Tool::CWebP).unwrap_err();
        assert!(matches!(err, ProvisionError::Extract { .. }));
        assert!(InstallStamp::load(tmp.path()).is_none());
    }

    #[test]
    fn nested_layout_is_found_by_search() {
        let tmp = TempDir::new().unwrap();
        let archive = tar_gz(&[(
            "libwebp-1.2.0-linux-x86-64/bin/extra/cwebp",
            b"nested",
            0o755,
        )]);
        let fetcher = MockFetcher::with(URL, archive);
        let log = fetcher.log();
        let p = provisioner(config(tmp.path()), fetcher);

        let first = p.resolve(Tool::CWebP).unwrap();
        let second = p.resolve(Tool::CWebP).unwrap();

        assert_eq!(first, tmp.path().join("extra").join("cwebp"));
        assert_eq!(second, first);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn nested_layout_without_stamp_is_reinstalled() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("extra")).unwrap();
        fs::write(tmp.path().join("extra").join("cwebp"), b"stray").unwrap();
        let fetcher = MockFetcher::with(URL, release_archive());
        let log = fetcher.log();
        let p = provisioner(config(tmp.path()), fetcher);

        assert_eq!(p.resolve(Tool::CWebP).unwrap(), tmp.path().join("cwebp"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn relative_dest_resolves_to_absolute_path() {
        let vendor = tempfile::Builder::new()
            .prefix("vendor-")
            .tempdir_in(".")
            .unwrap();
        assert!(vendor.path().is_relative());
        fs::write(vendor.path().join("cwebp"), b"local").unwrap();
        let cfg = ProvisionConfig {
            skip_download: true,
            dest: vendor.path().to_path_buf(),
            ..ProvisionConfig::default()
        };
        let p = provisioner(cfg, MockFetcher::default());

        assert!(p.config().dest.is_absolute());
        let path = p.resolve(Tool::CWebP).unwrap();
        assert!(path.is_absolute(), "{}", path.display());
        assert_eq!(
            path.canonicalize().unwrap(),
            vendor.path().join("cwebp").canonicalize().unwrap()
        );
        // Bare names stay bare for the PATH lookup
        assert_eq!(p.resolve(Tool::DWebP).unwrap(), PathBuf::from("dwebp"));
    }

    #[test]
    fn archive_without_tool_is_missing_executable() {
        let tmp = TempDir::new().unwrap();
        let archive = tar_gz(&[("libwebp-1.2.0-linux-x86-64/bin/img2webp", b"x", 0o755)]);
        let p = provisioner(config(tmp.path()), MockFetcher::with(URL, archive));

        let err = p.resolve(Tool::CWebP).unwrap_err();
        assert!(matches!(err, ProvisionError::MissingExecutable { tool: "cwebp", .. }));
    }

    #[test]
    fn concurrent_first_resolves_install_once() {
        let tmp = TempDir::new().unwrap();
        let fetcher = MockFetcher::with(URL, release_archive());
        let log = fetcher.log();
        let p = Arc::new(provisioner(config(tmp.path()), fetcher));

        std::thread::scope(|s| {
            for _ in 0..4 {
                let p = Arc::clone(&p);
                s.spawn(move || p.resolve(Tool::CWebP).unwrap());
            }
        });

        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
