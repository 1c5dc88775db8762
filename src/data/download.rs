// ============================================================
// Layer 4 — Dataset Download Helpers
// ============================================================
// Fetches an archive over HTTP with a progress bar, writes it
// through a `.part` file that is renamed once complete, and
// unpacks .tar.gz archives in place.
//
// No retries: any network or disk error is returned as-is.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};

/// Download `url` into `dest` unless `dest` already exists.
/// Returns the destination path.
pub fn download_file(url: &str, dest: &Path) -> Result<PathBuf> {
    if dest.exists() {
        tracing::debug!("'{}' already downloaded", dest.display());
        return Ok(dest.to_path_buf());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
    }

    tracing::info!("Downloading {url}");
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("convnet-experiment/", env!("CARGO_PKG_VERSION")))
        .timeout(None)
        .build()?;
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("Request to '{url}' failed"))?;

    if !response.status().is_success() {
        bail!("Failed to download '{url}': HTTP {}", response.status());
    }

    let pb = match response.content_length() {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("#>-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let partial = dest.with_extension("part");
    {
        let file   = File::create(&partial)
            .with_context(|| format!("Cannot create '{}'", partial.display()))?;
        let mut writer = pb.wrap_write(BufWriter::new(file));
        response
            .copy_to(&mut writer)
            .with_context(|| format!("Download of '{url}' was interrupted"))?;
        writer.flush()?;
    }
    fs::rename(&partial, dest)
        .with_context(|| format!("Cannot move '{}' into place", partial.display()))?;

    pb.finish_with_message("Download complete");
    tracing::info!("Saved {}", dest.display());
    Ok(dest.to_path_buf())
}

/// Unpack a .tar.gz archive into `into`.
pub fn extract_tar_gz(archive: &Path, into: &Path) -> Result<()> {
    tracing::info!("Extracting '{}' into '{}'", archive.display(), into.display());
    let file = File::open(archive)
        .with_context(|| format!("Cannot open archive '{}'", archive.display()))?;
    tar::Archive::new(GzDecoder::new(file))
        .unpack(into)
        .with_context(|| format!("Cannot extract '{}'", archive.display()))?;
    Ok(())
}

/// Read a whole gzip-compressed file into memory.
pub fn read_gz(path: &Path) -> Result<Vec<u8>> {
    use std::io::Read;

    let file = File::open(path).with_context(|| format!("Cannot open '{}'", path.display()))?;
    let mut bytes = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut bytes)
        .with_context(|| format!("Cannot decompress '{}'", path.display()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};

    #[test]
    fn test_existing_file_is_not_downloaded_again() {
        let dir  = tempfile::tempdir().unwrap();
        let dest = dir.path().join("already.bin");
        fs::write(&dest, b"cached").unwrap();

        // The URL is never contacted because the file exists
        let path = download_file("http://127.0.0.1:9/unreachable", &dest).unwrap();
        assert_eq!(path, dest);
        assert_eq!(fs::read(&dest).unwrap(), b"cached");
    }

    #[test]
    fn test_tar_gz_round_trip() {
        let dir     = tempfile::tempdir().unwrap();
        let archive = dir.path().join("data.tar.gz");

        {
            let enc = GzEncoder::new(File::create(&archive).unwrap(), Compression::fast());
            let mut builder = tar::Builder::new(enc);
            let payload = b"hello";
            let mut header = tar::Header::new_gnu();
            header.set_size(payload.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "inner/file.txt", &payload[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        extract_tar_gz(&archive, dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("inner/file.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_read_gz() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(&[1, 2, 3]).unwrap();
        enc.finish().unwrap();

        assert_eq!(read_gz(&path).unwrap(), vec![1, 2, 3]);
    }
}
