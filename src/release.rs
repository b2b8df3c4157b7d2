//! libwebp release table.
//!
//! Maps (OS, architecture, version) to the name of an official prebuilt
//! archive. Linux and Windows rows name the archive suffix directly. macOS
//! archives are named after the oldest macOS release they were built for,
//! so they go through a version → macOS-release table instead.
//!
//! Archive names follow `libwebp-<version>-<os>-<arch>.<ext>`, e.g.
//! `libwebp-1.2.0-linux-x86-64.tar.gz` or `libwebp-1.2.0-mac-10.15.tar.gz`.
//!
//! Combinations missing from the table have no prebuilt binary. The
//! provisioner's fallback policy decides what happens then (see
//! [`provision`](crate::provision)).

use crate::archive::ArchiveFormat;
use crate::platform::{Arch, Os, Platform};
use std::path::PathBuf;

/// libwebp version used when nothing else is configured.
pub const DEFAULT_VERSION: &str = "1.2.0";

/// Official release bucket.
pub const DEFAULT_BASE_URL: &str =
    "https://storage.googleapis.com/downloads.webmproject.org/releases/webp/";

/// `libwebp-<v>-<os>-<arch>/bin/cwebp` → `cwebp`
pub const ARCHIVE_STRIP_DEPTH: usize = 2;

struct Target {
    os: Os,
    arch: Arch,
    suffix: &'static str,
    format: ArchiveFormat,
    versions: &'static [&'static str],
}

const TARGETS: &[Target] = &[
    Target {
        os: Os::Linux,
        arch: Arch::X86_64,
        suffix: "linux-x86-64",
        format: ArchiveFormat::TarGz,
        versions: &["0.6.0", "1.0.0", "1.0.3", "1.1.0", "1.2.0"],
    },
    Target {
        os: Os::Linux,
        arch: Arch::X86,
        suffix: "linux-x86-32",
        format: ArchiveFormat::TarGz,
        versions: &["0.6.0"],
    },
    Target {
        os: Os::Windows,
        arch: Arch::X86_64,
        suffix: "windows-x64",
        format: ArchiveFormat::Zip,
        versions: &["0.6.0", "1.0.0", "1.0.3", "1.1.0", "1.2.0"],
    },
    Target {
        os: Os::Windows,
        arch: Arch::X86,
        suffix: "windows-x86",
        format: ArchiveFormat::Zip,
        versions: &["0.6.0"],
    },
];

/// libwebp version → macOS release its mac archive targets.
const MAC_RELEASES: &[(&str, &str)] = &[
    ("0.6.0", "10.12"),
    ("1.0.0", "10.13"),
    ("1.0.3", "10.14"),
    ("1.1.0", "10.15"),
    ("1.2.0", "10.15"),
];

/// Versions with at least one prebuilt archive.
pub fn known_versions() -> Vec<&'static str> {
    let mut versions: Vec<&'static str> = MAC_RELEASES.iter().map(|(v, _)| *v).collect();
    for target in TARGETS {
        for v in target.versions {
            if !versions.contains(v) {
                versions.push(v);
            }
        }
    }
    versions
}

/// Archive file name and format for a platform, if libwebp publishes one.
pub fn archive_for(version: &str, platform: Platform) -> Option<(String, ArchiveFormat)> {
    if platform.os == Os::MacOs {
        // Intel builds only; Apple Silicon hosts go through the fallback policy
        if platform.arch != Arch::X86_64 {
            return None;
        }
        let (_, release) = MAC_RELEASES.iter().find(|(v, _)| *v == version)?;
        let format = ArchiveFormat::TarGz;
        return Some((
            format!("libwebp-{version}-mac-{release}.{}", format.extension()),
            format,
        ));
    }

    let target = TARGETS
        .iter()
        .find(|t| t.os == platform.os && t.arch == platform.arch && t.versions.contains(&version))?;
    Some((
        format!(
            "libwebp-{version}-{}.{}",
            target.suffix,
            target.format.extension()
        ),
        target.format,
    ))
}

/// Everything needed to fetch and unpack one release archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySpec {
    pub platform: Platform,
    pub version: String,
    pub archive_name: String,
    pub url: String,
    pub format: ArchiveFormat,
    pub strip: usize,
    pub dest: PathBuf,
}

impl BinarySpec {
    /// Look up the archive for `platform`. `None` when the table has no row.
    pub fn resolve(
        version: &str,
        platform: Platform,
        base_url: &str,
        dest: impl Into<PathBuf>,
    ) -> Option<Self> {
        let (archive_name, format) = archive_for(version, platform)?;
        let url = if base_url.ends_with('/') {
            format!("{base_url}{archive_name}")
        } else {
            format!("{base_url}/{archive_name}")
        };
        Some(Self {
            platform,
            version: version.to_string(),
            archive_name,
            url,
            format,
            strip: ARCHIVE_STRIP_DEPTH,
            dest: dest.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(version: &str, os: Os, arch: Arch) -> Option<String> {
        archive_for(version, Platform::new(os, arch)).map(|(n, _)| n)
    }

    #[test]
    fn linux_archives() {
        assert_eq!(
            name("1.2.0", Os::Linux, Arch::X86_64).as_deref(),
            Some("libwebp-1.2.0-linux-x86-64.tar.gz")
        );
        assert_eq!(
            name("0.6.0", Os::Linux, Arch::X86).as_deref(),
            Some("libwebp-0.6.0-linux-x86-32.tar.gz")
        );
        assert_eq!(name("1.2.0", Os::Linux, Arch::X86), None);
    }

    #[test]
    fn windows_archives_are_zip() {
        let (n, format) = archive_for("1.2.0", Platform::new(Os::Windows, Arch::X86_64)).unwrap();
        assert_eq!(n, "libwebp-1.2.0-windows-x64.zip");
        assert_eq!(format, ArchiveFormat::Zip);
    }

    #[test]
    fn mac_archives_follow_release_table() {
        assert_eq!(
            name("0.6.0", Os::MacOs, Arch::X86_64).as_deref(),
            Some("libwebp-0.6.0-mac-10.12.tar.gz")
        );
        assert_eq!(
            name("1.0.3", Os::MacOs, Arch::X86_64).as_deref(),
            Some("libwebp-1.0.3-mac-10.14.tar.gz")
        );
        assert_eq!(
            name("1.2.0", Os::MacOs, Arch::X86_64).as_deref(),
            Some("libwebp-1.2.0-mac-10.15.tar.gz")
        );
        assert_eq!(name("9.9.9", Os::MacOs, Arch::X86_64), None);
        assert_eq!(name("1.2.0", Os::MacOs, Arch::Aarch64), None);
    }

    #[test]
    fn unmapped_combinations_have_no_archive() {
        assert_eq!(name("1.2.0", Os::Linux, Arch::Aarch64), None);
        assert_eq!(name("1.2.0", Os::Linux, Arch::Arm), None);
        assert_eq!(name("1.2.0", Os::Other, Arch::X86_64), None);
        assert_eq!(name("0.1.0", Os::Linux, Arch::X86_64), None);
    }

    #[test]
    fn spec_builds_url_with_or_without_trailing_slash() {
        let linux = Platform::new(Os::Linux, Arch::X86_64);
        let a = BinarySpec::resolve("1.2.0", linux, "https://example.com/webp/", "vendor").unwrap();
        let b = BinarySpec::resolve("1.2.0", linux, "https://example.com/webp", "vendor").unwrap();
        assert_eq!(a.url, "https://example.com/webp/libwebp-1.2.0-linux-x86-64.tar.gz");
        assert_eq!(a.url, b.url);
        assert_eq!(a.strip, 2);
        assert_eq!(a.dest, PathBuf::from("vendor"));
    }

    #[test]
    fn default_version_is_known() {
        assert!(known_versions().contains(&DEFAULT_VERSION));
        assert!(DEFAULT_BASE_URL.ends_with('/'));
    }
}
