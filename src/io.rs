use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{ImageEncoder, ImageError, ImageFormat, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Upper bound for a fetched background body (64 MiB).
const MAX_FETCH_BYTES: u64 = 64 * 1024 * 1024;

/// Maximum supported layer dimension in pixels (per axis).
pub const MAX_LAYER_DIM: u32 = 16_384;

/// Error type for image codec and source I/O.
#[derive(Debug)]
pub enum CodecError {
    Io(std::io::Error),
    Decode(String),
    Encode(String),
    Fetch(String),
    Dimensions { width: u32, height: u32 },
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Io(e) => write!(f, "I/O error: {}", e),
            CodecError::Decode(e) => write!(f, "Decode error: {}", e),
            CodecError::Encode(e) => write!(f, "Encode error: {}", e),
            CodecError::Fetch(e) => write!(f, "Fetch error: {}", e),
            CodecError::Dimensions { width, height } => {
                write!(f, "Unsupported image dimensions {}×{}", width, height)
            }
        }
    }
}

impl std::error::Error for CodecError {}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        CodecError::Io(e)
    }
}

/// Where the reference diagram comes from.
#[derive(Clone, Debug)]
pub enum BackgroundSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// `http://` or `https://` URL, fetched once.
    Url(String),
}

impl BackgroundSource {
    /// Interpret a CLI/host string: URLs by scheme, everything else as a path.
    pub fn parse(s: &str) -> Self {
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            BackgroundSource::Url(s.to_string())
        } else {
            BackgroundSource::Path(PathBuf::from(s))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            BackgroundSource::Path(p) => p.display().to_string(),
            BackgroundSource::Bytes(b) => format!("<{} bytes in memory>", b.len()),
            BackgroundSource::Url(u) => u.clone(),
        }
    }

    /// Read the raw encoded bytes. Blocking; call from a worker.
    pub fn fetch(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            BackgroundSource::Path(p) => Ok(std::fs::read(p)?),
            BackgroundSource::Bytes(b) => Ok(b.clone()),
            BackgroundSource::Url(url) => fetch_url(url),
        }
    }
}

fn fetch_url(url: &str) -> Result<Vec<u8>, CodecError> {
    fetch_url_capped(url, MAX_FETCH_BYTES)
}

fn fetch_url_capped(url: &str, cap: u64) -> Result<Vec<u8>, CodecError> {
    let response = ureq::get(url)
        .set("User-Agent", "chartmark-background-loader")
        .call()
        .map_err(|e| CodecError::Fetch(format!("{}: {}", url, e)))?;

    // One byte past the cap tells an oversized body from an exact fit.
    let mut body = Vec::new();
    response
        .into_reader()
        .take(cap + 1)
        .read_to_end(&mut body)?;
    if body.len() as u64 > cap {
        return Err(CodecError::Fetch(format!(
            "{}: body exceeds {} MiB",
            url,
            cap / (1024 * 1024)
        )));
    }
    if body.is_empty() {
        return Err(CodecError::Fetch(format!("{}: empty body", url)));
    }
    Ok(body)
}

/// Decode any supported raster format into RGBA8.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, CodecError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| CodecError::Decode(e.to_string()))?
        .into_rgba8();
    check_dimensions(img.width(), img.height())?;
    Ok(img)
}

/// Decode a PNG produced by [`encode_png`].
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, CodecError> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| CodecError::Decode(e.to_string()))?
        .into_rgba8();
    check_dimensions(img.width(), img.height())?;
    Ok(img)
}

/// Lossless PNG encode. Fast deflate without row filters: snapshots are
/// encoded on every commit, so speed matters more than size.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Fast, PngFilter::NoFilter);
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgba8,
        )
        .map_err(|e: ImageError| CodecError::Encode(e.to_string()))?;
    Ok(out)
}

pub fn check_dimensions(width: u32, height: u32) -> Result<(), CodecError> {
    if width == 0 || height == 0 || width > MAX_LAYER_DIM || height > MAX_LAYER_DIM {
        return Err(CodecError::Dimensions { width, height });
    }
    Ok(())
}

/// File name for a user download: `chart-annotation-<unix secs>-<8 hex>.png`.
pub fn download_file_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "chart-annotation-{}-{}.png",
        crate::logger::unix_secs(),
        &id[..8]
    )
}

/// Default directory for downloads: `~/Downloads` when it exists, else cwd.
pub fn default_download_dir() -> PathBuf {
    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
    if let Ok(home) = home {
        let dir = PathBuf::from(home).join("Downloads");
        if dir.is_dir() {
            return dir;
        }
    }
    PathBuf::from(".")
}

/// Write already-encoded bytes to `dir/<generated name>` and return the path.
pub fn write_download(dir: &Path, bytes: &[u8]) -> Result<PathBuf, CodecError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(download_file_name());
    write_bytes(&path, bytes)?;
    Ok(path)
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), CodecError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}
