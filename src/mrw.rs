
//! Read the minolta raw (mrw) container:
//! a block-structured header followed by the packed 12 bit sensor samples.
//!
//! The header is a sequence of named blocks, each preceded by a four byte name
//! and a big-endian length. Four of them are required for the conversion:
//! `PRD` (picture raw dimensions), `TTW` (an embedded big-endian tiff holding
//! the exif data), `WBG` (white balance gains) and `RIF` (requested image format).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Error, Result};
use crate::io::{u16_be, u32_be, Read};


/// The sensor delivers 12 significant bits per sample.
pub const BIT_DEPTH: u32 = 12;

/// The names of the four required blocks, as they appear in the container.
pub const BLOCK_NAMES: [&[u8; 4]; 4] = [b"\0PRD", b"\0TTW", b"\0WBG", b"\0RIF"];


/// One named block from the mrw header.
/// Remembers its position in the source file because the maker note
/// envelope in the output records original offsets.
#[derive(Debug, Clone)]
pub struct Block {

    /// Offset of the eight byte block header within the mrw header area.
    pub offset: u32,

    /// The block contents, without the eight byte header.
    pub data: Vec<u8>,
}

impl Block {

    /// The block contents preceded by a reconstruction of its original
    /// eight byte header (four name bytes and the big-endian length).
    pub fn with_header(&self, name: &[u8; 4]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.data.len());
        bytes.extend_from_slice(name);
        crate::io::push_u32_be(&mut bytes, self.data.len() as u32);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}


/// A completely loaded mrw file: the four metadata blocks
/// and the unpacked sensor samples in row-major order.
#[derive(Debug)]
pub struct Mrw {
    pub width: u32,
    pub height: u32,

    pub prd: Block,
    pub ttw: Block,
    pub wbg: Block,
    pub rif: Block,

    /// `width * height` samples, each masked to 12 bits.
    pub raw: Vec<u16>,
}

impl Mrw {

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_from_buffered(&mut BufReader::new(File::open(path)?))
    }

    /// Read the complete file. Assumes the reader is buffered.
    pub fn read_from_buffered(read: &mut impl Read) -> Result<Self> {
        let mut start = [0_u8; 8];
        read.read_exact(&mut start)?;

        if &start[0..4] != b"\0MRM" {
            return Err(Error::invalid("mrw signature"));
        }

        let header_length = u32_be(&start, 4)? as usize;
        let mut header = vec![0_u8; header_length];
        read.read_exact(&mut header)?;

        let [prd, ttw, wbg, rif] = scan_blocks(&header)?;

        let height = u16_be(&prd.data, 8)? as u32;
        let width = u16_be(&prd.data, 10)? as u32;

        if width == 0 || height == 0 || width % 2 != 0 {
            return Err(Error::invalid("sensor dimensions"));
        }

        let raw = read_packed_samples(read, width, height)?;
        Ok(Mrw { width, height, prd, ttw, wbg, rif, raw })
    }
}


/// Walk the header area and extract the four required blocks.
/// Padding blocks are skipped silently, unknown blocks with a warning.
fn scan_blocks(header: &[u8]) -> Result<[Block; 4]> {
    let mut found: [Option<Block>; 4] = [None, None, None, None];

    let mut offset = 0_usize;
    while offset + 8 <= header.len() {
        let name = &header[offset .. offset + 4];
        let length = u32_be(header, offset + 4)? as usize;

        let data = header.get(offset + 8 .. offset + 8 + length)
            .ok_or_else(|| Error::invalid("mrw block size"))?;

        if let Some(index) = BLOCK_NAMES.iter().position(|known| &known[..] == name) {
            found[index] = Some(Block {
                offset: offset as u32,
                data: data.to_vec(),
            });
        }
        else if name != b"\0PAD" {
            tracing::warn!("skipping unknown mrw block type {:?}", String::from_utf8_lossy(name));
        }

        offset += length + 8;
    }

    let [prd, ttw, wbg, rif] = found;
    let prd = prd.ok_or_else(|| Error::invalid("missing PRD block"))?;
    let ttw = ttw.ok_or_else(|| Error::invalid("missing TTW block"))?;
    let wbg = wbg.ok_or_else(|| Error::invalid("missing WBG block"))?;
    let rif = rif.ok_or_else(|| Error::invalid("missing RIF block"))?;

    if prd.data.len() < 24 {
        return Err(Error::invalid("PRD block size"));
    }

    Ok([prd, ttw, wbg, rif])
}

/// The sensor samples are packed as two 12 bit values in three bytes.
fn read_packed_samples(read: &mut impl Read, width: u32, height: u32) -> Result<Vec<u16>> {
    let mut samples = Vec::with_capacity(width as usize * height as usize);
    let mut row = vec![0_u8; width as usize * 3 / 2];

    for _ in 0 .. height {
        read.read_exact(&mut row)?;

        for packed in row.chunks_exact(3) {
            samples.push((u16::from(packed[0]) << 4) | (u16::from(packed[1]) >> 4));
            samples.push(((u16::from(packed[1]) << 8) | u16::from(packed[2])) & 0xfff);
        }
    }

    Ok(samples)
}
