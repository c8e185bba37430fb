//! Override cover service (spec §4.10): places a `cover.jpg` into the preferred override
//! directory, downloading via HTTP and re-encoding to JPEG if the source payload isn't already one.

use ssm_contracts::{FileSystem, HttpClient};
use std::path::{Path, PathBuf};
use std::time::Duration;

const COVER_FILE_NAME: &str = "cover.jpg";
const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub enum CoverOutcome {
    AlreadyExists(PathBuf),
    WrittenDownloadedJpeg(PathBuf),
    WrittenConvertedJpeg(PathBuf),
    DownloadFailed(String),
    UnsupportedImage(String),
    WriteFailed(String),
}

pub struct EnsureCoverJpgRequest<'a> {
    pub preferred_dir: &'a Path,
    pub all_override_dirs: &'a [PathBuf],
    /// Either an absolute http(s) URI or a key resolved against `cover_base_uri`.
    pub cover_key: &'a str,
    pub cover_base_uri: &'a str,
}

pub fn ensure_cover_jpg(fs: &dyn FileSystem, http: &dyn HttpClient, request: &EnsureCoverJpgRequest<'_>) -> CoverOutcome {
    for dir in preferred_first(request.preferred_dir, request.all_override_dirs) {
        let candidate = dir.join(COVER_FILE_NAME);
        if fs.exists(&candidate) {
            return CoverOutcome::AlreadyExists(candidate);
        }
    }

    let uri = match resolve_cover_uri(request.cover_key, request.cover_base_uri) {
        Ok(uri) => uri,
        Err(e) => return CoverOutcome::DownloadFailed(e),
    };

    if let Err(e) = fs.create_dir_all(request.preferred_dir) {
        return CoverOutcome::WriteFailed(format!("I/O: failed creating {}: {e}", request.preferred_dir.display()));
    }

    let response = match http.get(&uri, false, DOWNLOAD_TIMEOUT) {
        Ok(response) if response.status >= 200 && response.status < 300 => response,
        Ok(response) => return CoverOutcome::DownloadFailed(format!("non-2xx status {}", response.status)),
        Err(e) => return CoverOutcome::DownloadFailed(e.to_string()),
    };

    let (jpeg_bytes, converted) = if response.body.starts_with(&JPEG_SOI) {
        (response.body, false)
    } else {
        match image::load_from_memory(&response.body) {
            Ok(decoded) => {
                let mut buffer = std::io::Cursor::new(Vec::new());
                if decoded.write_to(&mut buffer, image::ImageFormat::Jpeg).is_err() {
                    return CoverOutcome::UnsupportedImage("failed re-encoding decoded image to JPEG".to_string());
                }
                (buffer.into_inner(), true)
            }
            Err(e) => return CoverOutcome::UnsupportedImage(e.to_string()),
        }
    };

    place_atomically(fs, request.preferred_dir, &jpeg_bytes, converted)
}

fn preferred_first<'a>(preferred: &'a Path, all: &'a [PathBuf]) -> Vec<&'a Path> {
    let mut ordered = vec![preferred];
    ordered.extend(all.iter().map(PathBuf::as_path).filter(|p| *p != preferred));
    ordered
}

fn resolve_cover_uri(cover_key: &str, cover_base_uri: &str) -> Result<String, String> {
    if let Ok(parsed) = url::Url::parse(cover_key) {
        if parsed.scheme() == "http" || parsed.scheme() == "https" {
            return Ok(cover_key.to_string());
        }
        return Err(format!("unsupported cover URI scheme: {}", parsed.scheme()));
    }

    let base = cover_base_uri.trim_end_matches('/');
    let joined = format!("{base}/{}", cover_key.trim_start_matches('/'));
    url::Url::parse(&joined).map(|_| joined).map_err(|e| format!("unparseable cover URI: {e}"))
}

fn place_atomically(fs: &dyn FileSystem, preferred_dir: &Path, bytes: &[u8], converted: bool) -> CoverOutcome {
    let random_hex = {
        use sha2::Digest;
        let mut hasher = sha2::Sha256::new();
        hasher.update(bytes);
        hasher.update(preferred_dir.as_os_str().as_encoded_bytes());
        format!("{:x}", hasher.finalize())[..16].to_string()
    };
    let tmp_path = preferred_dir.join(format!("{COVER_FILE_NAME}.{random_hex}.tmp"));
    let final_path = preferred_dir.join(COVER_FILE_NAME);

    if let Err(e) = fs.write(&tmp_path, bytes) {
        return CoverOutcome::WriteFailed(format!("I/O: failed writing temp cover: {e}"));
    }

    match fs.rename_non_overwriting(&tmp_path, &final_path) {
        Ok(()) => {
            if converted {
                CoverOutcome::WrittenConvertedJpeg(final_path)
            } else {
                CoverOutcome::WrittenDownloadedJpeg(final_path)
            }
        }
        Err(e) => {
            let _ = fs.remove_file(&tmp_path);
            if fs.exists(&final_path) {
                CoverOutcome::AlreadyExists(final_path)
            } else {
                CoverOutcome::WriteFailed(format!("path: failed placing cover: {e}"))
            }
        }
    }
}
