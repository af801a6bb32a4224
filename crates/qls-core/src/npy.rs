//! NumPy `.npy` decoding.
//!
//! Only what density-matrix uploads need: little/big endian float, complex,
//! signed and unsigned integer dtypes, C or Fortran order, 2-D or 3-D shapes.
//! Object arrays and structured dtypes are rejected.

use crate::error::{QlsError, Result};
use crate::matrix::{Complex, DensityMatrix};

const MAGIC: &[u8] = b"\x93NUMPY";

/// A decoded array with its data normalized to C order.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<Complex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Complex,
    Int,
    Uint,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    endian: Endian,
    kind: Kind,
    size: usize,
}

#[derive(Debug)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Decode one `.npy` file.
pub fn parse_npy(bytes: &[u8]) -> Result<NpyArray> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(QlsError::data_format("not a .npy file (bad magic)"));
    }
    let major = bytes[6];
    let (header_len, header_start): (usize, usize) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(QlsError::data_format("truncated .npy header"));
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
            (len, 12)
        }
        v => {
            return Err(QlsError::data_format(format!(
                "unsupported .npy format version {v}"
            )));
        }
    };
    let header_end = header_start
        .checked_add(header_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| QlsError::data_format("truncated .npy header"))?;
    let header_text = std::str::from_utf8(&bytes[header_start..header_end])
        .map_err(|_| QlsError::data_format(".npy header is not valid text"))?;
    let header = parse_header(header_text)?;

    let payload = &bytes[header_end..];
    let expected = element_count(&header.shape)?
        .checked_mul(header.dtype.size)
        .ok_or_else(|| QlsError::data_format(format!(".npy shape {:?} overflows", header.shape)))?;
    if payload.len() != expected {
        return Err(QlsError::data_format(format!(
            ".npy payload has {} bytes, shape {:?} needs {expected}",
            payload.len(),
            header.shape
        )));
    }

    let data: Vec<Complex> = payload
        .chunks_exact(header.dtype.size)
        .map(|chunk| decode_element(chunk, header.dtype))
        .collect();

    let data = if header.fortran_order && header.shape.len() > 1 {
        fortran_to_c(&data, &header.shape)
    } else {
        data
    };

    Ok(NpyArray {
        shape: header.shape,
        data,
    })
}

impl NpyArray {
    /// Split into density matrices: a 2-D array is one sample, a 3-D array
    /// of shape (N, d, d) is N samples.
    pub fn into_matrices(self) -> Result<Vec<DensityMatrix>> {
        match self.shape.as_slice() {
            [rows, cols] => Ok(vec![DensityMatrix::from_shape(*rows, *cols, self.data)?]),
            [n, rows, cols] => {
                if *n == 0 {
                    return Err(QlsError::data_format("stacked array holds no matrices"));
                }
                if element_count(&self.shape)? != self.data.len() {
                    return Err(QlsError::data_format(format!(
                        "shape {:?} does not match {} decoded entries",
                        self.shape,
                        self.data.len()
                    )));
                }
                let stride = rows * cols;
                if stride == 0 {
                    return Err(QlsError::data_format(format!(
                        "matrix has an empty dimension ({rows}x{cols})"
                    )));
                }
                self.data
                    .chunks_exact(stride)
                    .map(|chunk| DensityMatrix::from_shape(*rows, *cols, chunk.to_vec()))
                    .collect()
            }
            other => Err(QlsError::data_format(format!(
                "expected a 2-D matrix or a 3-D stack, got shape {other:?}"
            ))),
        }
    }
}

/// Product of the dimensions, `DataFormat` on overflow.
fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| QlsError::data_format(format!(".npy shape {shape:?} overflows")))
}

fn parse_header(text: &str) -> Result<Header> {
    let descr = dict_value(text, "descr")?;
    let descr = descr
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string();
    let dtype = parse_descr(&descr)?;

    let fortran = dict_value(text, "fortran_order")?;
    let fortran_order = match fortran.trim() {
        "True" => true,
        "False" => false,
        other => {
            return Err(QlsError::data_format(format!(
                "bad fortran_order value '{other}'"
            )));
        }
    };

    let shape_text = dict_value(text, "shape")?;
    let inner = shape_text
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| QlsError::data_format("shape is not a tuple"))?;
    let shape = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| QlsError::data_format(format!("bad shape entry '{s}'")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Header {
        dtype,
        fortran_order,
        shape,
    })
}

/// Raw text of the value stored under `key` in a Python dict literal.
fn dict_value<'a>(text: &'a str, key: &str) -> Result<&'a str> {
    let start = [format!("'{key}'"), format!("\"{key}\"")]
        .iter()
        .find_map(|k| text.find(k.as_str()).map(|i| i + k.len()))
        .ok_or_else(|| QlsError::data_format(format!(".npy header missing '{key}'")))?;
    let rest = text[start..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| QlsError::data_format(format!(".npy header: no ':' after '{key}'")))?
        .trim_start();

    // Tuples contain commas, so scan to the matching paren first.
    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else if rest.starts_with('\'') || rest.starts_with('"') {
        let quote = rest.as_bytes()[0] as char;
        rest[1..].find(quote).map(|i| i + 2)
    } else {
        rest.find([',', '}'])
    }
    .ok_or_else(|| QlsError::data_format(format!(".npy header: unterminated '{key}'")))?;
    Ok(&rest[..end])
}

fn parse_descr(descr: &str) -> Result<Dtype> {
    let mut chars = descr.chars();
    let (endian, rest) = match chars.next() {
        Some('<') | Some('=') | Some('|') => (Endian::Little, chars.as_str()),
        Some('>') => (Endian::Big, chars.as_str()),
        _ => (Endian::Little, descr),
    };
    let mut rest_chars = rest.chars();
    let kind = match rest_chars.next() {
        Some('f') => Kind::Float,
        Some('c') => Kind::Complex,
        Some('i') => Kind::Int,
        Some('u') => Kind::Uint,
        Some('b') => Kind::Bool,
        _ => {
            return Err(QlsError::data_format(format!(
                "unsupported dtype '{descr}'"
            )));
        }
    };
    let size: usize = rest_chars
        .as_str()
        .parse()
        .map_err(|_| QlsError::data_format(format!("unsupported dtype '{descr}'")))?;
    let ok = match kind {
        Kind::Float => matches!(size, 4 | 8),
        Kind::Complex => matches!(size, 8 | 16),
        Kind::Int | Kind::Uint => matches!(size, 1 | 2 | 4 | 8),
        Kind::Bool => size == 1,
    };
    if !ok {
        return Err(QlsError::data_format(format!(
            "unsupported dtype '{descr}'"
        )));
    }
    Ok(Dtype { endian, kind, size })
}

fn read_uint(bytes: &[u8], endian: Endian) -> u64 {
    let mut buf = [0u8; 8];
    match endian {
        Endian::Little => {
            buf[..bytes.len()].copy_from_slice(bytes);
            u64::from_le_bytes(buf)
        }
        Endian::Big => {
            buf[8 - bytes.len()..].copy_from_slice(bytes);
            u64::from_be_bytes(buf)
        }
    }
}

fn read_float(bytes: &[u8], endian: Endian) -> f64 {
    let bits = read_uint(bytes, endian);
    match bytes.len() {
        4 => f32::from_bits(bits as u32) as f64,
        _ => f64::from_bits(bits),
    }
}

fn decode_element(chunk: &[u8], dtype: Dtype) -> Complex {
    match dtype.kind {
        Kind::Float => Complex::real(read_float(chunk, dtype.endian)),
        Kind::Complex => {
            let half = dtype.size / 2;
            Complex::new(
                read_float(&chunk[..half], dtype.endian),
                read_float(&chunk[half..], dtype.endian),
            )
        }
        Kind::Uint | Kind::Bool => Complex::real(read_uint(chunk, dtype.endian) as f64),
        Kind::Int => {
            let raw = read_uint(chunk, dtype.endian);
            let shift = 64 - 8 * dtype.size as u32;
            // sign-extend
            Complex::real((((raw << shift) as i64) >> shift) as f64)
        }
    }
}

fn fortran_to_c(data: &[Complex], shape: &[usize]) -> Vec<Complex> {
    if data.is_empty() {
        return Vec::new();
    }
    let ndim = shape.len();
    let mut f_strides = vec![1usize; ndim];
    for d in 1..ndim {
        f_strides[d] = f_strides[d - 1] * shape[d - 1];
    }
    let mut out = Vec::with_capacity(data.len());
    let mut idx = vec![0usize; ndim];
    for _ in 0..data.len() {
        let offset: usize = idx.iter().zip(&f_strides).map(|(i, s)| i * s).sum();
        out.push(data[offset]);
        // advance C-order multi-index
        for d in (0..ndim).rev() {
            idx[d] += 1;
            if idx[d] < shape[d] {
                break;
            }
            idx[d] = 0;
        }
    }
    out
}

/// Encode a little-endian `.npy` (f8 or c16, C order).
///
/// Used by training fixtures and tests; the service only decodes.
pub fn encode_npy(shape: &[usize], data: &[Complex], complex: bool) -> Vec<u8> {
    let descr = if complex { "<c16" } else { "<f8" };
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_text = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let mut header =
        format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape_text}, }}");
    // magic(6) + version(2) + len(2) + header + '\n' padded to 64 bytes
    let unpadded = 10 + header.len() + 1;
    let pad = (64 - unpadded % 64) % 64;
    header.push_str(&" ".repeat(pad));
    header.push('\n');

    let mut out = Vec::with_capacity(10 + header.len() + data.len() * 16);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for z in data {
        out.extend_from_slice(&z.re.to_le_bytes());
        if complex {
            out.extend_from_slice(&z.im.to_le_bytes());
        }
    }
    out
}
