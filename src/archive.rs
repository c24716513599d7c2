// src/archive.rs

//! Package archive creation and extraction.
//!
//! The scheduler talks to archives through the `ArchiveHandler` trait so
//! tests can substitute a recording handler. The production handler
//! wraps tar with the compression codecs we ship.

use crate::compression::CompressionFormat;
use crate::error::{Error, Result};
use crate::package::PackageRecord;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

pub trait ArchiveHandler {
    /// Pack the record's files from under `root` into an archive at
    /// `dest` (a directory), named `<name>-<version>.<ext>`.
    fn create(
        &self,
        record: &PackageRecord,
        root: &Path,
        dest: &Path,
        format: CompressionFormat,
    ) -> Result<PathBuf>;

    /// Unpack an archive under `staging_root`.
    fn extract(&self, archive: &Path, staging_root: &Path) -> Result<()>;
}

/// tar-based handler for the formats this build supports.
pub struct TarArchiveHandler;

impl TarArchiveHandler {
    fn writer(path: &Path, format: CompressionFormat) -> Result<Box<dyn Write>> {
        let file = File::create(path)
            .map_err(|e| Error::io(format!("creating {}", path.display()), e))?;
        match format {
            CompressionFormat::Tar => Ok(Box::new(file)),
            CompressionFormat::Tgz => Ok(Box::new(GzEncoder::new(file, Compression::default()))),
            CompressionFormat::Txz => Ok(Box::new(XzEncoder::new(file, 6))),
            CompressionFormat::Tbz => Err(Error::Fatal(
                "bzip2 archives are not supported by this build".to_owned(),
            )),
        }
    }

    fn reader(path: &Path) -> Result<Box<dyn Read>> {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(CompressionFormat::from_extension)
            .ok_or_else(|| {
                Error::Fatal(format!("unrecognized archive format: {}", path.display()))
            })?;
        let file = File::open(path)
            .map_err(|e| Error::io(format!("opening {}", path.display()), e))?;
        match format {
            CompressionFormat::Tar => Ok(Box::new(file)),
            CompressionFormat::Tgz => Ok(Box::new(GzDecoder::new(file))),
            CompressionFormat::Txz => Ok(Box::new(XzDecoder::new(file))),
            CompressionFormat::Tbz => Err(Error::Fatal(
                "bzip2 archives are not supported by this build".to_owned(),
            )),
        }
    }
}

impl ArchiveHandler for TarArchiveHandler {
    fn create(
        &self,
        record: &PackageRecord,
        root: &Path,
        dest: &Path,
        format: CompressionFormat,
    ) -> Result<PathBuf> {
        let out = dest.join(format!(
            "{}-{}.{}",
            record.name,
            record.version,
            format.extension()
        ));
        debug!(archive = %out.display(), "creating package archive");

        let writer = Self::writer(&out, format)?;
        let mut builder = tar::Builder::new(writer);
        for file in record.files.as_slice() {
            let rel = file.path.trim_start_matches('/');
            let src = root.join(rel);
            builder
                .append_path_with_name(&src, rel)
                .map_err(|e| Error::io(format!("archiving {}", src.display()), e))?;
        }
        builder
            .into_inner()
            .and_then(|mut w| w.flush().map(|_| ()))
            .map_err(|e| Error::io(format!("finalizing {}", out.display()), e))?;
        Ok(out)
    }

    fn extract(&self, archive: &Path, staging_root: &Path) -> Result<()> {
        debug!(archive = %archive.display(), root = %staging_root.display(), "extracting");
        std::fs::create_dir_all(staging_root)
            .map_err(|e| Error::io(format!("creating {}", staging_root.display()), e))?;

        let reader = Self::reader(archive)?;
        let mut tar = tar::Archive::new(reader);
        tar.set_preserve_permissions(true);
        tar.unpack(staging_root)
            .map_err(|e| Error::io(format!("extracting {}", archive.display()), e))?;
        Ok(())
    }
}
