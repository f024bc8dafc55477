//! On-disk cache for the environment-independent BRDF LUT.
//!
//! Layout (all integers little-endian):
//!
//! | bytes      | content                                    |
//! |------------|--------------------------------------------|
//! | 8          | magic `BRDFLUT\0`                          |
//! | 4          | format version (`u32`)                     |
//! | 4          | metadata length `n` (`u32`)                |
//! | `n`        | JSON metadata `{ "size", "sample_count" }` |
//! | `size²·8`  | `(scale, bias)` `f32` pairs, row-major     |

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IblError;
use crate::passes::brdf::BrdfLut;

const MAGIC: &[u8; 8] = b"BRDFLUT\0";
const VERSION: u32 = 1;
/// Magic, version and metadata length.
const HEADER_LEN: usize = 16;

/// Parameters the cached table was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct LutMetadata {
    size: u32,
    sample_count: u32,
}

/// Serialize `lut` to its cache representation.
#[must_use]
pub fn encode(lut: &BrdfLut) -> Vec<u8> {
    let metadata = LutMetadata {
        size: lut.size(),
        sample_count: lut.sample_count(),
    };
    // Serializing two integers cannot fail.
    let json = serde_json::to_vec(&metadata).unwrap_or_default();
    let flat = lut.to_flat();

    let mut bytes = Vec::with_capacity(HEADER_LEN + json.len() + flat.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&(json.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&json);
    for value in flat {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, IblError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| IblError::CacheFormat("truncated header".to_owned()))
}

/// Parse a cache file. Returns `Ok(None)` if the file is valid but was
/// computed with different parameters than `size`/`sample_count`.
///
/// # Errors
///
/// Returns [`IblError::CacheFormat`] if the bytes are not a cache file
/// of a supported version or the payload is inconsistent.
pub fn decode(
    bytes: &[u8],
    size: u32,
    sample_count: u32,
) -> Result<Option<BrdfLut>, IblError> {
    if bytes.get(..MAGIC.len()) != Some(MAGIC.as_slice()) {
        return Err(IblError::CacheFormat("bad magic".to_owned()));
    }
    let version = read_u32(bytes, MAGIC.len())?;
    if version != VERSION {
        return Err(IblError::CacheFormat(format!(
            "unsupported version {version}"
        )));
    }
    let meta_len = read_u32(bytes, MAGIC.len() + 4)? as usize;
    let json = bytes
        .get(HEADER_LEN..HEADER_LEN + meta_len)
        .ok_or_else(|| IblError::CacheFormat("truncated metadata".to_owned()))?;
    let metadata: LutMetadata = serde_json::from_slice(json)
        .map_err(|e| IblError::CacheFormat(format!("metadata: {e}")))?;

    if metadata.size != size || metadata.sample_count != sample_count {
        log::debug!(
            "BRDF cache holds {}² x {} samples, want {size}² x {sample_count}",
            metadata.size,
            metadata.sample_count
        );
        return Ok(None);
    }

    let payload = &bytes[HEADER_LEN + meta_len..];
    if payload.len() % 4 != 0 {
        return Err(IblError::CacheFormat(format!(
            "payload of {} bytes is not a whole number of floats",
            payload.len()
        )));
    }
    let pairs: Vec<f32> = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    BrdfLut::from_flat(size, sample_count, &pairs).map(Some)
}

/// Load a cached LUT. Missing files and parameter mismatches both yield
/// `Ok(None)`.
///
/// # Errors
///
/// Returns [`IblError::Io`] if the file exists but cannot be read and
/// [`IblError::CacheFormat`] if it is corrupt.
pub fn load(
    path: &Path,
    size: u32,
    sample_count: u32,
) -> Result<Option<BrdfLut>, IblError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IblError::Io(e)),
    };
    let lut = decode(&bytes, size, sample_count)?;
    if lut.is_some() {
        log::info!("loaded BRDF LUT from {}", path.display());
    }
    Ok(lut)
}

/// `brdf.lut` -> `brdf.lut.<pid>.tmp`, unique per writing process.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Write `lut` to `path`, creating parent directories. The file is written
/// to a sibling temporary and renamed into place.
///
/// # Errors
///
/// Returns [`IblError::Io`] on any filesystem failure.
pub fn save(path: &Path, lut: &BrdfLut) -> Result<(), IblError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    if let Err(e) = std::fs::write(&tmp, encode(lut))
        .and_then(|()| std::fs::rename(&tmp, path))
    {
        let _ = std::fs::remove_file(&tmp);
        return Err(IblError::Io(e));
    }
    log::info!("saved BRDF LUT to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn sample_lut() -> BrdfLut {
        let pairs: Vec<f32> = (0..18).map(|i| i as f32 / 20.0).collect();
        BrdfLut::from_flat(3, 64, &pairs).unwrap()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("ibl-bake-cache-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn encoded_layout() {
        let bytes = encode(&sample_lut());
        assert_eq!(&bytes[..8], b"BRDFLUT\0");
        assert_eq!(read_u32(&bytes, 8).unwrap(), 1);
        let meta_len = read_u32(&bytes, 12).unwrap() as usize;
        let json: serde_json::Value =
            serde_json::from_slice(&bytes[16..16 + meta_len]).unwrap();
        assert_eq!(json["size"], 3);
        assert_eq!(json["sample_count"], 64);
        assert_eq!(bytes.len(), 16 + meta_len + 9 * 2 * 4);
        // Second float of the payload is the bias of texel (0, 0).
        let off = 16 + meta_len + 4;
        let bias = f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        assert_eq!(bias, 0.05);
    }

    #[test]
    fn decode_accepts_matching_parameters_only() {
        let lut = sample_lut();
        let bytes = encode(&lut);
        assert_eq!(decode(&bytes, 3, 64).unwrap(), Some(lut));
        assert_eq!(decode(&bytes, 3, 128).unwrap(), None);
        assert_eq!(decode(&bytes, 4, 64).unwrap(), None);
    }

    #[test]
    fn decode_rejects_corrupt_files() {
        let bytes = encode(&sample_lut());
        assert!(matches!(
            decode(b"NOTALUT!", 3, 64),
            Err(IblError::CacheFormat(_))
        ));
        assert!(matches!(
            decode(&bytes[..bytes.len() - 3], 3, 64),
            Err(IblError::CacheFormat(_))
        ));
        assert!(matches!(
            decode(&bytes[..12], 3, 64),
            Err(IblError::CacheFormat(_))
        ));
        let mut bumped = bytes;
        bumped[8] = 9;
        assert!(matches!(
            decode(&bumped, 3, 64),
            Err(IblError::CacheFormat(_))
        ));
    }

    #[test]
    fn temp_file_is_per_process() {
        let path = Path::new("/cache/brdf.lut");
        let tmp = temp_sibling(path);
        assert_eq!(tmp.parent(), path.parent());
        assert_eq!(
            tmp.file_name().unwrap().to_string_lossy(),
            format!("brdf.lut.{}.tmp", std::process::id())
        );
    }

    #[test]
    fn save_then_load() {
        let path = temp_path("save_then_load/brdf.lut");
        let lut = sample_lut();
        save(&path, &lut).unwrap();
        assert!(!temp_sibling(&path).exists());
        assert_eq!(load(&path, 3, 64).unwrap(), Some(lut));
        assert_eq!(load(&path, 3, 32).unwrap(), None);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(load(&path, 3, 64).unwrap(), None);
    }
}
