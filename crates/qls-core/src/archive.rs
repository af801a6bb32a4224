//! `.npz` archives: a zip container of named `.npy` members.
//!
//! Reads the central directory, so archives written to non-seekable streams
//! (sizes in data descriptors) are handled. Members may be stored or
//! deflated; deflate is decoded with `flate2`. ZIP64 extra fields are honoured
//! because `numpy.savez` forces them.

use std::io::Read;

use flate2::read::DeflateDecoder;

use crate::error::{QlsError, Result};
use crate::matrix::DensityMatrix;
use crate::npy::parse_npy;

const EOCD_SIG: u32 = 0x0605_4b50;
const CDIR_SIG: u32 = 0x0201_4b50;
const LOCAL_SIG: u32 = 0x0403_4b50;
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Ceiling on the total inflated size of one archive.
pub const DEFAULT_MAX_INFLATED_BYTES: usize = 256 * 1024 * 1024;

/// One member of an `.npz` archive.
#[derive(Debug, Clone)]
pub struct NpzEntry {
    /// Member name without the `.npy` suffix, as NumPy reports it.
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct CentralEntry {
    name: String,
    method: u16,
    compressed_size: u64,
    uncompressed_size: u64,
    local_offset: u64,
}

fn corrupt() -> QlsError {
    QlsError::data_format("truncated or corrupt archive entry")
}

/// `base + len`, failing on overflow.
fn offset(base: usize, len: usize) -> Result<usize> {
    base.checked_add(len).ok_or_else(corrupt)
}

/// `len` bytes starting at `at`, failing when out of bounds.
fn span(buf: &[u8], at: usize, len: usize) -> Result<&[u8]> {
    buf.get(at..offset(at, len)?).ok_or_else(corrupt)
}

fn u16_at(buf: &[u8], at: usize) -> Result<u16> {
    span(buf, at, 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn u32_at(buf: &[u8], at: usize) -> Result<u32> {
    span(buf, at, 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn u64_at(buf: &[u8], at: usize) -> Result<u64> {
    span(buf, at, 8).map(|b| {
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        u64::from_le_bytes(a)
    })
}

/// True when `bytes` start with a zip local file header.
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// List and decompress every member of an `.npz` archive, in directory order.
pub fn read_npz(bytes: &[u8]) -> Result<Vec<NpzEntry>> {
    read_npz_limited(bytes, DEFAULT_MAX_INFLATED_BYTES)
}

/// Like [`read_npz`], failing once the members together inflate past
/// `max_inflated` bytes.
pub fn read_npz_limited(bytes: &[u8], max_inflated: usize) -> Result<Vec<NpzEntry>> {
    let eocd = find_eocd(bytes)?;
    let n_entries = u16_at(bytes, offset(eocd, 10)?)? as usize;
    let cdir_offset = u32_at(bytes, offset(eocd, 16)?)? as usize;

    let mut entries = Vec::with_capacity(n_entries);
    let mut pos = cdir_offset;
    for _ in 0..n_entries {
        let (entry, next) = read_central_entry(bytes, pos)?;
        entries.push(entry);
        pos = next;
    }

    let mut budget = max_inflated;
    let mut members = Vec::with_capacity(entries.len());
    for e in entries.into_iter().filter(|e| !e.name.ends_with('/')) {
        let data = extract(bytes, &e, budget)?;
        budget -= data.len();
        let name = e
            .name
            .strip_suffix(".npy")
            .unwrap_or(&e.name)
            .to_string();
        members.push(NpzEntry { name, bytes: data });
    }
    Ok(members)
}

fn find_eocd(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < 22 {
        return Err(QlsError::data_format("file too small to be a zip archive"));
    }
    // EOCD is 22 bytes plus an optional comment of up to 64 KiB.
    let lowest = bytes.len().saturating_sub(22 + u16::MAX as usize);
    (lowest..=bytes.len() - 22)
        .rev()
        .find(|&i| u32_at(bytes, i).map(|s| s == EOCD_SIG).unwrap_or(false))
        .ok_or_else(|| QlsError::data_format("zip end-of-central-directory not found"))
}

fn read_central_entry(bytes: &[u8], pos: usize) -> Result<(CentralEntry, usize)> {
    if u32_at(bytes, pos)? != CDIR_SIG {
        return Err(QlsError::data_format("corrupt zip central directory"));
    }
    let record = span(bytes, pos, 46)?;
    let method = u16_at(record, 10)?;
    let mut compressed_size = u32_at(record, 20)? as u64;
    let mut uncompressed_size = u32_at(record, 24)? as u64;
    let name_len = u16_at(record, 28)? as usize;
    let extra_len = u16_at(record, 30)? as usize;
    let comment_len = u16_at(record, 32)? as usize;
    let mut local_offset = u32_at(record, 42)? as u64;

    let name_start = offset(pos, 46)?;
    let name = String::from_utf8_lossy(span(bytes, name_start, name_len)?).into_owned();

    // ZIP64 extra: only the fields saturated in the fixed record are present, in order.
    let extra_start = offset(name_start, name_len)?;
    let extra = span(bytes, extra_start, extra_len)?;
    let mut p = 0;
    while p + 4 <= extra.len() {
        let id = u16_at(extra, p)?;
        let size = u16_at(extra, p + 2)? as usize;
        if id == ZIP64_EXTRA_ID {
            let mut q = p + 4;
            if uncompressed_size == u32::MAX as u64 {
                uncompressed_size = u64_at(extra, q)?;
                q += 8;
            }
            if compressed_size == u32::MAX as u64 {
                compressed_size = u64_at(extra, q)?;
                q += 8;
            }
            if local_offset == u32::MAX as u64 {
                local_offset = u64_at(extra, q)?;
            }
        }
        p += 4 + size;
    }

    let next = offset(offset(extra_start, extra_len)?, comment_len)?;
    Ok((
        CentralEntry {
            name,
            method,
            compressed_size,
            uncompressed_size,
            local_offset,
        },
        next,
    ))
}

fn too_large(entry: &CentralEntry, limit: usize) -> QlsError {
    QlsError::data_format(format!(
        "zip member '{}' inflates past the {limit}-byte limit",
        entry.name
    ))
}

/// Decompress one member into at most `limit` bytes.
fn extract(bytes: &[u8], entry: &CentralEntry, limit: usize) -> Result<Vec<u8>> {
    let lo = usize::try_from(entry.local_offset).map_err(|_| corrupt())?;
    if u32_at(bytes, lo)? != LOCAL_SIG {
        return Err(QlsError::data_format(format!(
            "corrupt local header for '{}'",
            entry.name
        )));
    }
    let local = span(bytes, lo, 30)?;
    let name_len = u16_at(local, 26)? as usize;
    let extra_len = u16_at(local, 28)? as usize;
    let data_start = offset(offset(offset(lo, 30)?, name_len)?, extra_len)?;
    let data_len = usize::try_from(entry.compressed_size).map_err(|_| corrupt())?;
    let raw = span(bytes, data_start, data_len)?;
    if entry.uncompressed_size > limit as u64 {
        return Err(too_large(entry, limit));
    }

    match entry.method {
        0 if raw.len() > limit => Err(too_large(entry, limit)),
        0 => Ok(raw.to_vec()),
        8 => {
            // Declared sizes are untrusted; the decoder itself is capped.
            let mut out = Vec::with_capacity(entry.uncompressed_size.min(1 << 24) as usize);
            DeflateDecoder::new(raw)
                .take((limit as u64).saturating_add(1))
                .read_to_end(&mut out)
                .map_err(|e| {
                    QlsError::data_format(format!("failed to inflate '{}': {e}", entry.name))
                })?;
            if out.len() > limit {
                return Err(too_large(entry, limit));
            }
            Ok(out)
        }
        m => Err(QlsError::data_format(format!(
            "zip member '{}' uses unsupported compression method {m}",
            entry.name
        ))),
    }
}

/// Decode an upload into an ordered sample set.
///
/// Accepts either an `.npz` archive (every member is a matrix or a stack of
/// matrices, in archive order) or a bare `.npy` file.
pub fn load_samples(bytes: &[u8]) -> Result<Vec<DensityMatrix>> {
    load_samples_limited(bytes, DEFAULT_MAX_INFLATED_BYTES)
}

/// [`load_samples`] with an explicit ceiling on inflated archive bytes.
pub fn load_samples_limited(bytes: &[u8], max_inflated: usize) -> Result<Vec<DensityMatrix>> {
    if is_zip(bytes) {
        let mut samples = Vec::new();
        for entry in read_npz_limited(bytes, max_inflated)? {
            let arr = parse_npy(&entry.bytes).map_err(|e| {
                QlsError::data_format(format!("member '{}': {e}", entry.name))
            })?;
            let mats = arr.into_matrices().map_err(|e| {
                QlsError::data_format(format!("member '{}': {e}", entry.name))
            })?;
            samples.extend(mats);
        }
        Ok(samples)
    } else {
        parse_npy(bytes)?.into_matrices()
    }
}

/// Build a minimal `.npz` from named `.npy` payloads.
///
/// Members are deflated when `compress` is set, otherwise stored. CRC fields
/// are written as zero; readers here do not check them.
pub fn write_npz(members: &[(&str, Vec<u8>)], compress: bool) -> Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    let mut out = Vec::new();
    let mut central = Vec::new();
    for (name, payload) in members {
        let file_name = format!("{name}.npy");
        let (method, data) = if compress {
            let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
            enc.write_all(payload)
                .and_then(|_| enc.finish())
                .map(|d| (8u16, d))
                .map_err(|e| QlsError::data_format(format!("deflate failed: {e}")))?
        } else {
            (0u16, payload.clone())
        };
        let offset = out.len() as u32;

        out.extend_from_slice(&LOCAL_SIG.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&[0u8; 4]); // time, date
        out.extend_from_slice(&0u32.to_le_bytes()); // crc
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(file_name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(file_name.as_bytes());
        out.extend_from_slice(&data);

        central.extend_from_slice(&CDIR_SIG.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes()); // version made by
        central.extend_from_slice(&20u16.to_le_bytes()); // version needed
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&method.to_le_bytes());
        central.extend_from_slice(&[0u8; 4]);
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        central.extend_from_slice(&(file_name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0u8; 2 + 2 + 2 + 2 + 4]); // extra, comment, disk, attrs
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(file_name.as_bytes());
    }
    let cdir_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&EOCD_SIG.to_le_bytes());
    out.extend_from_slice(&[0u8; 4]); // disk numbers
    out.extend_from_slice(&(members.len() as u16).to_le_bytes());
    out.extend_from_slice(&(members.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&cdir_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    Ok(out)
}
