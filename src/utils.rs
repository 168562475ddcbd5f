//! Utility functions for file naming, positional writes and disk space

use std::path::{Path, PathBuf};

/// Extension used when neither the name nor the content type gives one
const FALLBACK_EXTENSION: &str = ".bin";

/// Resolve the output file name of a download
///
/// Candidates are tried in order: the caller's hint, the `Content-Disposition`
/// header, the last path segment of the URL. A candidate that is empty or has
/// no extension is replaced by `download_<millis>` plus an extension derived
/// from the content type.
///
/// # Examples
///
/// ```
/// use segment_dl::utils::resolve_file_name;
///
/// let name = resolve_file_name(None, None, None, "https://example.com/a/report%202024.pdf?x=1", 0);
/// assert_eq!(name, "report 2024.pdf");
///
/// let name = resolve_file_name(None, None, Some("image/png"), "https://example.com/", 1700);
/// assert_eq!(name, "download_1700.png");
/// ```
pub fn resolve_file_name(
    hint: Option<&str>,
    content_disposition: Option<&str>,
    content_type: Option<&str>,
    url: &str,
    now_millis: i64,
) -> String {
    let candidate = hint
        .map(sanitize_file_name)
        .filter(|name| !name.is_empty())
        .or_else(|| content_disposition.and_then(filename_from_content_disposition))
        .or_else(|| filename_from_url(url))
        .unwrap_or_default();

    if candidate.is_empty() || Path::new(&candidate).extension().is_none() {
        return format!(
            "download_{}{}",
            now_millis,
            extension_for_content_type(content_type)
        );
    }
    candidate
}

/// Extract the file name from a `Content-Disposition` header value
///
/// Handles `filename="x"` and RFC 5987 `filename*=UTF-8''x`; the encoded form wins.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;

    for part in value.split(';') {
        let part = part.trim();
        if let Some(encoded) = part.strip_prefix("filename*=") {
            // charset'lang'encoded-filename
            let encoded = encoded.rsplit('\'').next().unwrap_or(encoded);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let name = sanitize_file_name(&decoded);
                if !name.is_empty() {
                    return Some(name);
                }
            }
        } else if let Some(raw) = part.strip_prefix("filename=") {
            let name = sanitize_file_name(raw.trim_matches('"'));
            if !name.is_empty() {
                plain = Some(name);
            }
        }
    }

    plain
}

/// Last non-empty path segment of `url`, percent-decoded
///
/// Query and fragment are not part of the path and are ignored.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    let decoded = urlencoding::decode(last).ok()?;
    let name = sanitize_file_name(&decoded);
    (!name.is_empty()).then_some(name)
}

/// Map a MIME type to a file extension (with leading dot)
pub fn extension_for_content_type(content_type: Option<&str>) -> &'static str {
    let Some(content_type) = content_type else {
        return FALLBACK_EXTENSION;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/pdf" => ".pdf",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "video/mp4" => ".mp4",
        "audio/mpeg" | "audio/mp3" => ".mp3",
        "application/zip" | "application/x-zip-compressed" => ".zip",
        "application/x-rar-compressed" | "application/vnd.rar" => ".rar",
        "text/plain" => ".txt",
        "application/msword" => ".doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => ".docx",
        _ => FALLBACK_EXTENSION,
    }
}

/// Strip directory components and characters that cannot appear in a file name
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned == "." || cleaned == ".." {
        return String::new();
    }
    cleaned.to_string()
}

/// Insert `_<millis>` before the extension of `path`
///
/// `/d/report.pdf` becomes `/d/report_1700000000000.pdf`.
pub fn timestamped_path(path: &Path, millis: i64) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, millis, ext.to_string_lossy()),
        None => format!("{}_{}", stem, millis),
    };
    path.with_file_name(name)
}

/// Cross-platform positional file write.
///
/// Writes `buf` to `file` at the given byte `offset`, equivalent to Unix `pwrite`.
#[cfg(unix)]
pub fn write_all_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

/// Cross-platform positional file write.
///
/// Writes `buf` to `file` at the given byte `offset`, equivalent to Unix `pwrite`.
#[cfg(windows)]
pub fn write_all_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut written = 0;
    while written < buf.len() {
        let n = file.seek_write(&buf[written..], offset + written as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write whole buffer",
            ));
        }
        written += n;
    }
    Ok(())
}

/// Cross-platform positional file write.
#[cfg(not(any(unix, windows)))]
pub fn write_all_at(_file: &std::fs::File, _buf: &[u8], _offset: u64) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "positional writes not supported on this platform",
    ))
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux/macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialized
        // and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail: blocks available to unprivileged users
            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is NUL-terminated and every out pointer refers to a
        // live, aligned u64 that is only read after a successful call.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
