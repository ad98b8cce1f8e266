//! Chunked binary archive for simulated batches.
//!
//! Layout: `MAGIC`, version (u32), then chunks of `tag: [u8;4]`, `len: u32`,
//! payload. Array chunks are LZ4-compressed with the uncompressed length
//! prepended; values are little-endian f32. An `END ` chunk closes the file.

use std::io::{self, Read, Write};

use crate::batch::{Batch, BatchArray};
use crate::error::{Result, SimError};

pub const MAGIC: &[u8; 8] = b"COGSIM01";
pub const VERSION: u32 = 1;

const TAG_META: [u8; 4] = *b"META";
const TAG_END: [u8; 4] = *b"END ";
const ARRAY_TAGS: [([u8; 4], &str); 6] = [
    (*b"SIMD", "sim_data"),
    (*b"LOCP", "local_parameters"),
    (*b"GLBP", "global_parameters"),
    (*b"SHRP", "shared_parameters"),
    (*b"BCTX", "batchable_context"),
    (*b"MASK", "mask"),
];

/// Largest META payload a reader accepts.
const MAX_META_LEN: u32 = 1 << 20;
/// LZ4 cannot expand a block by more than this factor.
const MAX_LZ4_RATIO: usize = 255;

/// Sink that only counts bytes; used to size an archive without writing it.
#[derive(Debug, Default)]
pub struct CountingWriter {
    written: usize,
}

impl CountingWriter {
    pub fn new() -> Self {
        Self { written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written = self.written.saturating_add(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

fn read_len<R: Read>(r: &mut R) -> io::Result<usize> {
    let n = u64::from_le_bytes(read_exact::<8, _>(r)?);
    usize::try_from(n).map_err(|_| invalid("length does not fit in memory"))
}

fn chunk_len(n: usize) -> io::Result<u32> {
    u32::try_from(n).map_err(|_| invalid("chunk too large"))
}

fn write_chunk<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    w.write_all(&tag)?;
    w.write_all(&chunk_len(payload.len())?.to_le_bytes())?;
    w.write_all(payload)
}

/// `len` covers the 4-byte uncompressed length plus the compressed bytes.
fn write_chunk_lz4<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    let compressed = lz4_flex::compress(payload);
    let total_len = chunk_len(compressed.len())?.saturating_add(4);
    w.write_all(&tag)?;
    w.write_all(&total_len.to_le_bytes())?;
    w.write_all(&chunk_len(payload.len())?.to_le_bytes())?;
    w.write_all(&compressed)
}

fn read_chunk_lz4<R: Read>(r: &mut R, len: u32) -> io::Result<Vec<u8>> {
    let mut take = r.by_ref().take(len as u64);
    let uncompressed_len = read_u32(&mut take)? as usize;
    let mut compressed = Vec::new();
    take.read_to_end(&mut compressed)?;
    if compressed.len() + 4 != len as usize {
        return Err(invalid("truncated array chunk"));
    }
    if uncompressed_len > compressed.len().saturating_mul(MAX_LZ4_RATIO) {
        return Err(invalid("array chunk claims an impossible uncompressed size"));
    }
    lz4_flex::decompress(&compressed, uncompressed_len)
        .map_err(|_| invalid("lz4 decompression failed"))
}

fn encode_meta(batch: &Batch) -> io::Result<Vec<u8>> {
    let mut meta = Vec::with_capacity(24 + batch.variant.len() + 8 * batch.subject_steps.len());
    meta.extend_from_slice(&chunk_len(batch.variant.len())?.to_le_bytes());
    meta.extend_from_slice(batch.variant.as_bytes());
    meta.extend_from_slice(&(batch.num_steps as u64).to_le_bytes());
    meta.extend_from_slice(&chunk_len(batch.subject_steps.len())?.to_le_bytes());
    for &n in &batch.subject_steps {
        meta.extend_from_slice(&(n as u64).to_le_bytes());
    }
    Ok(meta)
}

fn decode_meta(payload: &[u8]) -> io::Result<(String, usize, Vec<usize>)> {
    let mut cursor = io::Cursor::new(payload);
    let name_len = read_u32(&mut cursor)? as usize;
    let start = cursor.position() as usize;
    let name = payload
        .get(start..start.saturating_add(name_len))
        .ok_or_else(|| invalid("variant name runs past the META chunk"))?;
    let variant = String::from_utf8(name.to_vec()).map_err(|_| invalid("invalid utf-8 string"))?;
    cursor.set_position((start + name_len) as u64);

    let num_steps = read_len(&mut cursor)?;
    let b = read_u32(&mut cursor)? as usize;
    let remaining = payload.len() - cursor.position() as usize;
    if b > remaining / 8 {
        return Err(invalid("subject count runs past the META chunk"));
    }
    let mut steps = Vec::with_capacity(b);
    for _ in 0..b {
        steps.push(read_len(&mut cursor)?);
    }
    Ok((variant, num_steps, steps))
}

fn encode_array(array: &BatchArray) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + array.shape.len() * 8 + array.data.len() * 4);
    out.extend_from_slice(&(array.shape.len() as u32).to_le_bytes());
    for &n in &array.shape {
        out.extend_from_slice(&(n as u64).to_le_bytes());
    }
    for &x in &array.data {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

fn decode_array(bytes: &[u8]) -> Result<BatchArray> {
    let mut cursor = io::Cursor::new(bytes);
    let ndim = read_u32(&mut cursor)? as usize;
    if ndim > (bytes.len() - 4) / 8 {
        return Err(invalid("array rank runs past the chunk").into());
    }
    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        shape.push(read_len(&mut cursor)?);
    }
    let body = &bytes[cursor.position() as usize..];
    if body.len() % 4 != 0 {
        return Err(invalid("array payload is not a whole number of f32 values").into());
    }
    let data = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    BatchArray::from_parts(shape, data)
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

impl Batch {
    pub fn save_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        write_chunk(w, TAG_META, &encode_meta(self)?)?;

        for (tag, name) in ARRAY_TAGS {
            if let Some(array) = self.field(name) {
                write_chunk_lz4(w, tag, &encode_array(array))?;
            }
        }
        write_chunk(w, TAG_END, &[])?;
        Ok(())
    }

    pub fn load_from<R: Read>(r: &mut R) -> Result<Self> {
        let magic = read_exact::<8, _>(r)?;
        if &magic != MAGIC {
            return Err(invalid("bad archive magic").into());
        }
        let version = read_u32(r)?;
        if version != VERSION {
            return Err(invalid(&format!("unsupported archive version {version}")).into());
        }

        let mut meta: Option<(String, usize, Vec<usize>)> = None;
        let mut arrays: [Option<BatchArray>; 6] = Default::default();

        loop {
            let tag = read_exact::<4, _>(r)?;
            let len = read_u32(r)?;
            if tag == TAG_END {
                break;
            }
            if tag == TAG_META {
                if len > MAX_META_LEN {
                    return Err(invalid(&format!("META chunk of {len} bytes is too large")).into());
                }
                let mut payload = vec![0u8; len as usize];
                r.read_exact(&mut payload)?;
                meta = Some(decode_meta(&payload)?);
                continue;
            }
            match ARRAY_TAGS.iter().position(|(t, _)| *t == tag) {
                Some(slot) => {
                    let bytes = read_chunk_lz4(r, len)?;
                    arrays[slot] = Some(decode_array(&bytes)?);
                }
                None => {
                    // Unknown chunk: skip it.
                    io::copy(&mut r.by_ref().take(len as u64), &mut io::sink())?;
                }
            }
        }

        let (variant, num_steps, subject_steps) =
            meta.ok_or_else(|| invalid("archive has no META chunk"))?;
        let [sim, local, global, shared, context, mask] = arrays;
        let missing = |name: &str| SimError::from(invalid(&format!("archive has no {name}")));

        Ok(Self {
            variant,
            num_steps,
            subject_steps,
            sim_data: sim.ok_or_else(|| missing("sim_data"))?,
            local_parameters: local.ok_or_else(|| missing("local_parameters"))?,
            global_parameters: global.ok_or_else(|| missing("global_parameters"))?,
            shared_parameters: shared,
            batchable_context: context.ok_or_else(|| missing("batchable_context"))?,
            mask: mask.ok_or_else(|| missing("mask"))?,
        })
    }

    pub fn save_bytes(&self) -> Result<Vec<u8>> {
        let mut cw = CountingWriter::new();
        self.save_to(&mut cw)?;
        let mut out = Vec::with_capacity(cw.written());
        self.save_to(&mut out)?;
        Ok(out)
    }

    pub fn load_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = io::Cursor::new(bytes);
        Self::load_from(&mut cursor)
    }
}
