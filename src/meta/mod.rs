
//! The tiff directory model of the output file.
//! A directory is an unordered collection of typed tags,
//! sorted ascending by tag id when it is written.
//! Payloads larger than four bytes are stored out of line
//! and referenced by an offset that is only known at write time.

pub mod tags;

use smallvec::SmallVec;
use crate::error::{Error, Result, UnitResult, usize_to_u16, usize_to_u32};
use crate::io::{Data, Tracking, Write};
use crate::math::{round_up_even, round_up_to_long};
use self::tags::TagType;


/// A single directory entry: id, value type, value count,
/// and the little-endian payload bytes.
/// The payload is rounded up to an even number of bytes.
#[derive(Debug, Clone)]
pub struct Tag {
    id: u16,
    kind: TagType,
    count: u32,
    data: Vec<u8>,
}

impl Tag {

    fn new(id: u16, kind: TagType, count: u32) -> Self {
        let size = round_up_even(count * kind.byte_size() as u32) as usize;
        Tag { id, kind, count, data: vec![0; size] }
    }

    pub fn id(&self) -> u16 { self.id }

    /// The payload, already in little-endian byte order.
    pub fn data(&self) -> &[u8] { &self.data }
    pub fn data_mut(&mut self) -> &mut [u8] { &mut self.data }
}


/// A collection of tags, keyed by tag id.
/// Setting a tag replaces any existing entry with the same id.
#[derive(Debug, Default)]
pub struct Ifd {
    tags: SmallVec<[Tag; 24]>,
}

impl Ifd {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize { self.tags.len() }
    pub fn is_empty(&self) -> bool { self.tags.is_empty() }

    /// Create the tag with a zeroed payload of `count` values,
    /// replacing any previous tag with the same id,
    /// and return it for the caller to fill in.
    pub fn set(&mut self, id: u16, kind: TagType, count: u32) -> &mut Tag {
        let replaced = self.tags.iter().position(|tag| tag.id == id);

        match replaced {
            Some(index) => {
                self.tags[index] = Tag::new(id, kind, count);
                &mut self.tags[index]
            }

            None => {
                self.tags.push(Tag::new(id, kind, count));
                self.tags.last_mut().expect("just inserted a tag")
            }
        }
    }

    /// Set a nul-terminated string tag. The terminator is included in the count.
    pub fn set_ascii(&mut self, id: u16, text: &str) {
        let count = text.len() as u32 + 1;
        let tag = self.set(id, TagType::Ascii, count);
        tag.data[.. text.len()].copy_from_slice(text.as_bytes());
    }

    pub fn set_byte(&mut self, id: u16, bytes: &[u8]) {
        let tag = self.set(id, TagType::Byte, bytes.len() as u32);
        tag.data[.. bytes.len()].copy_from_slice(bytes);
    }

    pub fn set_undefined(&mut self, id: u16, bytes: &[u8]) {
        let tag = self.set(id, TagType::Undefined, bytes.len() as u32);
        tag.data[.. bytes.len()].copy_from_slice(bytes);
    }

    pub fn set_short(&mut self, id: u16, values: &[u16]) {
        let tag = self.set(id, TagType::Short, values.len() as u32);
        let mut data = &mut tag.data[..];
        u16::write_slice(&mut data, values).expect("in-memory write failed");
    }

    pub fn set_sshort(&mut self, id: u16, values: &[i16]) {
        let tag = self.set(id, TagType::SShort, values.len() as u32);
        let mut data = &mut tag.data[..];
        i16::write_slice(&mut data, values).expect("in-memory write failed");
    }

    pub fn set_long(&mut self, id: u16, values: &[u32]) {
        let tag = self.set(id, TagType::Long, values.len() as u32);
        let mut data = &mut tag.data[..];
        u32::write_slice(&mut data, values).expect("in-memory write failed");
    }

    /// Each value is a pair of numerator and denominator.
    pub fn set_rational(&mut self, id: u16, values: &[(u32, u32)]) {
        let tag = self.set(id, TagType::Rational, values.len() as u32);
        let mut data = &mut tag.data[..];

        for &(numerator, denominator) in values {
            numerator.write(&mut data).expect("in-memory write failed");
            denominator.write(&mut data).expect("in-memory write failed");
        }
    }

    /// Each value is a pair of signed numerator and denominator.
    pub fn set_srational(&mut self, id: u16, values: &[(i32, i32)]) {
        let tag = self.set(id, TagType::SRational, values.len() as u32);
        let mut data = &mut tag.data[..];

        for &(numerator, denominator) in values {
            numerator.write(&mut data).expect("in-memory write failed");
            denominator.write(&mut data).expect("in-memory write failed");
        }
    }

    /// Overwrite one element of an existing `Long` array tag.
    /// Used to fill in the deferred file offsets
    /// after the size of every directory is known.
    pub fn patch_long(&mut self, id: u16, index: usize, value: u32) -> UnitResult {
        let tag = self.tags.iter_mut().find(|tag| tag.id == id)
            .ok_or_else(|| Error::invalid("patching a tag that was never inserted"))?;

        let mut bytes = tag.data.get_mut(index * 4 .. index * 4 + 4)
            .ok_or_else(|| Error::invalid("patching outside of the tag payload"))?;

        value.write(&mut bytes)
    }

    /// Read one element of an existing `Long` array tag back.
    pub fn long_at(&self, id: u16, index: usize) -> Result<u32> {
        let tag = self.tags.iter().find(|tag| tag.id == id)
            .ok_or_else(|| Error::invalid("reading a tag that was never inserted"))?;

        let mut bytes = tag.data.get(index * 4 .. index * 4 + 4)
            .ok_or_else(|| Error::invalid("reading outside of the tag payload"))?;

        u32::read(&mut bytes)
    }

    /// The number of bytes this directory will occupy in the file,
    /// including out-of-line payloads, rounded up to a multiple of four.
    pub fn byte_size(&self) -> usize {
        let payloads: usize = self.tags.iter()
            .map(|tag| tag.data.len())
            .filter(|&size| size > 4)
            .sum();

        round_up_to_long((2 + 12 * self.tags.len() + 4 + payloads) as u32) as usize
    }

    /// Sort the tags ascending by id and write the directory:
    /// entry count, the twelve-byte entries with inline values or payload offsets,
    /// the terminating zero next-directory pointer, the out-of-line payloads in tag order,
    /// and zero padding up to a four byte boundary.
    pub fn write_to<W: Write>(&mut self, write: &mut Tracking<W>) -> UnitResult {
        self.tags.sort_by_key(Tag::id);

        let start = write.byte_position();
        let mut payload_offset = start + 2 + 12 * self.tags.len() + 4;

        usize_to_u16(self.tags.len(), "directory entry count")?.write(write)?;

        for tag in &self.tags {
            tag.id.write(write)?;
            (tag.kind as u16).write(write)?;
            tag.count.write(write)?;

            if tag.data.len() > 4 {
                usize_to_u32(payload_offset, "tag payload offset")?.write(write)?;
                payload_offset += tag.data.len();
            }
            else {
                // small payloads live in the value slot itself, left-aligned
                let mut slot = [0_u8; 4];
                slot[.. tag.data.len()].copy_from_slice(&tag.data);
                u8::write_slice(write, &slot)?;
            }
        }

        0_u32.write(write)?; // no directory chaining

        for tag in &self.tags {
            if tag.data.len() > 4 {
                u8::write_slice(write, &tag.data)?;
            }
        }

        if payload_offset != write.byte_position() {
            return Err(Error::invalid("internal error: directory size does not match the written bytes"));
        }

        let padded_end = round_up_to_long(payload_offset as u32) as usize;
        u8::write_slice(write, &[0_u8; 4][.. padded_end - payload_offset])?;

        debug_assert_eq!(write.byte_position() - start, self.byte_size(), "computed directory size mismatch");
        Ok(())
    }
}
