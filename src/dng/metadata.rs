
//! Rewrites the metadata of the source file into the output directories:
//! the camera description from the PRD block, the exif tree from the
//! big-endian tiff inside the TTW block, the white balance from the WBG
//! block, and the private data envelope that preserves the maker note.

use crate::error::{Error, Result, UnitResult};
use crate::io::{push_u32_be, u16_be, u32_be, Data};
use crate::meta::tags::{self, TagType};
use crate::meta::Ifd;
use crate::mrw::Mrw;


/// Where the embedded preview thumbnail lives inside the TTW block.
#[derive(Debug, Clone, Copy)]
pub struct Thumbnail {
    pub offset: usize,
    pub length: usize,
}


/// Validate the PRD block and derive the camera model,
/// image geometry and mosaic description tags.
pub fn add_camera_tags(mrw: &Mrw, main: &mut Ifd, raw: &mut Ifd) -> UnitResult {
    let data = &mrw.prd.data;

    if &data[0 .. 8] == b"21810002" {
        main.set_ascii(tags::UNIQUE_CAMERA_MODEL, "Konica Minolta Maxxum 7D");
        main.set_ascii(tags::LOCALIZED_CAMERA_MODEL, "Konica Minolta Maxxum 7D");
    }
    else {
        return Err(Error::unsupported("unknown camera model"));
    }

    raw.set_long(tags::IMAGE_WIDTH, &[mrw.width]);
    raw.set_long(tags::IMAGE_LENGTH, &[mrw.height]);
    raw.set_long(tags::ACTIVE_AREA, &[0, 0, mrw.height, mrw.width]);

    // the ccd delivers slightly more than the advertised picture area,
    // the advertised part is centered inside it
    let ccd_height = u32::from(u16_be(data, 12)?);
    let ccd_width = u32::from(u16_be(data, 14)?);

    if ccd_width > mrw.width || ccd_height > mrw.height {
        return Err(Error::invalid("ccd crop size"));
    }

    raw.set_rational(tags::DEFAULT_SCALE, &[(1, 1), (1, 1)]);

    raw.set_rational(tags::DEFAULT_CROP_ORIGIN, &[
        ((mrw.width - ccd_width) / 2, 1),
        ((mrw.height - ccd_height) / 2, 1),
    ]);

    raw.set_rational(tags::DEFAULT_CROP_SIZE, &[(ccd_width, 1), (ccd_height, 1)]);

    if data[16] != 12 { return Err(Error::invalid("DataSize number")); }
    if data[17] != 12 { return Err(Error::invalid("PixelSize number")); }
    if data[18] != 0x59 { return Err(Error::invalid("StorageMethod number")); }
    if u16_be(data, 22)? != 1 { return Err(Error::invalid("BayerPattern number")); }

    raw.set_short(tags::CFA_REPEAT_PATTERN_DIM, &[2, 2]);
    raw.set_byte(tags::CFA_PATTERN, &[0, 1, 1, 2]);
    raw.set_byte(tags::CFA_PLANE_COLOR, &[0, 1, 2]);
    raw.set_short(tags::CFA_LAYOUT, &[1]);

    Ok(())
}


/// Derive the neutral white point from the four channel gains of the WBG block.
/// Each gain is a 16 bit value scaled by a per-channel power-of-two denominator.
pub fn add_white_balance(mrw: &Mrw, main: &mut Ifd) -> UnitResult {
    let data = &mrw.wbg.data;
    if data.len() < 12 { return Err(Error::invalid("WBG block size")); }

    let gain = |value_at: usize, exponent_at: usize| -> Result<f64> {
        let exponent = data[exponent_at];
        if exponent > 8 { return Err(Error::invalid("white balance denominator")); }
        Ok(f64::from(u16_be(data, value_at)?) / f64::from(64_u32 << exponent))
    };

    let red = gain(4, 0)?;
    let green = (gain(6, 1)? + gain(8, 2)?) / 2.0;
    let blue = gain(10, 3)?;

    if red <= 0.0 || green <= 0.0 || blue <= 0.0 {
        return Err(Error::invalid("white balance gains"));
    }

    main.set_rational(tags::ANALOG_BALANCE, &[
        (1_000_000, 1_000_000),
        (1_000_000, 1_000_000),
        (1_000_000, 1_000_000),
    ]);

    main.set_rational(tags::AS_SHOT_NEUTRAL, &[
        ((1_000_000.0 / red) as u32, 1_000_000),
        ((1_000_000.0 / green) as u32, 1_000_000),
        ((1_000_000.0 / blue) as u32, 1_000_000),
    ]);

    Ok(())
}


/// One twelve byte directory entry of the source tiff.
#[derive(Debug, Clone, Copy)]
struct Entry {
    id: u16,
    kind: u16,
    count: u32,

    /// The raw big-endian value slot: small values are left-aligned inside it,
    /// larger payloads interpret it as an offset.
    value: u32,
}

/// Walk all entries of the big-endian directory at the specified offset.
fn for_each_entry(
    tiff: &[u8],
    offset: u32,
    action: &mut impl FnMut(&Entry) -> UnitResult,
) -> UnitResult
{
    let mut at = offset as usize;
    let count = u16_be(tiff, at)?;
    at += 2;

    for _ in 0 .. count {
        action(&Entry {
            id: u16_be(tiff, at)?,
            kind: u16_be(tiff, at + 2)?,
            count: u32_be(tiff, at + 4)?,
            value: u32_be(tiff, at + 8)?,
        })?;

        at += 12;
    }

    Ok(())
}

/// The nul-terminated string of an ascii entry.
fn ascii_value(tiff: &[u8], entry: &Entry) -> Result<String> {
    let count = entry.count as usize;

    let bytes: Vec<u8> =
        if count > 4 {
            tiff.get(entry.value as usize .. entry.value as usize + count)
                .ok_or_else(|| Error::invalid("string entry size"))?
                .to_vec()
        }
        else {
            entry.value.to_be_bytes()[.. count].to_vec()
        };

    let terminated = bytes.split(|&byte| byte == 0).next().unwrap_or(&[]);
    Ok(String::from_utf8_lossy(terminated).into_owned())
}

/// Copy one entry into the target directory,
/// converting the payload from big-endian to little-endian.
/// Value types that never occur in the source warn and are skipped.
fn copy_entry(target: &mut Ifd, tiff: &[u8], entry: &Entry) -> UnitResult {
    let kind = TagType::from_code(entry.kind)?;
    let count = entry.count as usize;

    let out_of_line = |size: usize| {
        tiff.get(entry.value as usize .. entry.value as usize + size)
            .ok_or_else(|| Error::invalid("entry payload size"))
    };

    match kind {
        TagType::Ascii | TagType::Undefined | TagType::Byte => {
            let bytes: Vec<u8> =
                if count > 4 { out_of_line(count)?.to_vec() }
                else { entry.value.to_be_bytes()[.. count].to_vec() };

            let tag = target.set(entry.id, kind, entry.count);
            tag.data_mut()[.. count].copy_from_slice(&bytes);
        }

        TagType::Short | TagType::SShort => {
            let values: Vec<u16> = match count {
                1 => vec![(entry.value >> 16) as u16],
                2 => vec![(entry.value >> 16) as u16, (entry.value & 0xffff) as u16],

                _ => {
                    let bytes = out_of_line(count * 2)?;
                    (0 .. count).map(|index| u16_be(bytes, index * 2)).collect::<Result<_>>()?
                }
            };

            let tag = target.set(entry.id, kind, entry.count);
            let mut data = tag.data_mut();
            u16::write_slice(&mut data, &values).expect("in-memory write failed");
        }

        TagType::Long => {
            let values: Vec<u32> = match count {
                1 => vec![entry.value],

                _ => {
                    let bytes = out_of_line(count * 4)?;
                    (0 .. count).map(|index| u32_be(bytes, index * 4)).collect::<Result<_>>()?
                }
            };

            let tag = target.set(entry.id, kind, entry.count);
            let mut data = tag.data_mut();
            u32::write_slice(&mut data, &values).expect("in-memory write failed");
        }

        TagType::Rational | TagType::SRational => {
            let bytes = out_of_line(count * 8)?;
            let values: Vec<u32> = (0 .. count * 2)
                .map(|index| u32_be(bytes, index * 4))
                .collect::<Result<_>>()?;

            let tag = target.set(entry.id, kind, entry.count);
            let mut data = tag.data_mut();
            u32::write_slice(&mut data, &values).expect("in-memory write failed");
        }

        other => {
            tracing::warn!("skipping exif entry #{} of unhandled value type {:?}", entry.id, other);
        }
    }

    Ok(())
}


/// Walk the exif tree of the TTW block and rewrite it into the output:
/// strings and orientation onto the main directory, the exif sub directory
/// copied entry by entry, the interoperability directory copied if present,
/// and the maker note preserved inside the private data envelope.
/// Returns the location of the embedded thumbnail.
pub fn add_exif_tags(
    mrw: &Mrw,
    main: &mut Ifd,
    exif: &mut Ifd,
    interop: &mut Ifd,
) -> Result<Thumbnail>
{
    let tiff = &mrw.ttw.data[..];

    if tiff.len() < 8 || &tiff[0 .. 8] != b"MM\0\x2a\0\0\0\x08" {
        return Err(Error::invalid("TTW block format"));
    }

    let mut thumbnail_offset = None;
    let mut thumbnail_length = None;

    for_each_entry(tiff, 8, &mut |entry| {
        match entry.id {
            // the output file has its own geometry and resolution
            tags::IMAGE_WIDTH | tags::IMAGE_LENGTH | tags::COMPRESSION
            | tags::X_RESOLUTION | tags::Y_RESOLUTION | tags::RESOLUTION_UNIT => {}

            tags::DATE_TIME | tags::IMAGE_DESCRIPTION | tags::MAKE
            | tags::MODEL | tags::SOFTWARE => {
                main.set_ascii(entry.id, &ascii_value(tiff, entry)?);
            }

            tags::ORIENTATION => {
                main.set_short(entry.id, &[(entry.value >> 16) as u16]);
            }

            tags::PRINT_IM => {
                copy_entry(exif, tiff, entry)?;
            }

            tags::EXIF_IFD => {
                for_each_entry(tiff, entry.value, &mut |sub| {
                    match sub.id {
                        tags::MAKER_NOTE => {
                            for_each_entry(tiff, sub.value, &mut |note| {
                                match note.id {
                                    tags::MLT_THUMBNAIL_OFFSET => thumbnail_offset = Some(note.value),
                                    tags::MLT_THUMBNAIL_LENGTH => thumbnail_length = Some(note.value),
                                    _ => {}
                                }

                                Ok(())
                            })?;

                            let note = tiff.get(sub.value as usize .. sub.value as usize + sub.count as usize)
                                .ok_or_else(|| Error::invalid("maker note size"))?;

                            main.set_byte(tags::DNG_PRIVATE_DATA, &build_private_data(mrw, sub.value, note));
                        }

                        tags::INTEROPERABILITY_IFD => {
                            // placeholder offset, patched once the layout is known
                            exif.set_long(sub.id, &[0]);
                            for_each_entry(tiff, sub.value, &mut |iop| copy_entry(interop, tiff, iop))?;
                        }

                        _ => copy_entry(exif, tiff, sub)?,
                    }

                    Ok(())
                })?;
            }

            _ => tracing::warn!("skipping unhandled exif tag #{}", entry.id),
        }

        Ok(())
    })?;

    let thumbnail = match (thumbnail_offset, thumbnail_length) {
        (Some(offset), Some(length)) if length > 0 => Thumbnail {
            offset: offset as usize,
            length: length as usize,
        },

        _ => return Err(Error::invalid("missing thumbnail pointers")),
    };

    if tiff.len() < thumbnail.offset + thumbnail.length {
        return Err(Error::invalid("thumbnail size"));
    }

    add_thumbnail_tags(main, thumbnail.length as u32);
    Ok(thumbnail)
}

/// The thumbnail is a fixed-size jpeg strip on the main directory.
fn add_thumbnail_tags(main: &mut Ifd, byte_count: u32) {
    main.set_long(tags::IMAGE_WIDTH, &[640]);
    main.set_long(tags::IMAGE_LENGTH, &[480]);
    main.set_short(tags::BITS_PER_SAMPLE, &[8, 8, 8]);
    main.set_short(tags::COMPRESSION, &[7]);
    main.set_short(tags::PHOTOMETRIC_INTERPRETATION, &[6]);
    main.set_long(tags::STRIP_OFFSETS, &[0]); // patched later
    main.set_short(tags::SAMPLES_PER_PIXEL, &[3]);
    main.set_long(tags::ROWS_PER_STRIP, &[480]);
    main.set_long(tags::STRIP_BYTE_COUNTS, &[byte_count]);
    main.set_short(tags::PLANAR_CONFIGURATION, &[1]);
    main.set_short(tags::YCBCR_SUB_SAMPLING, &[2, 1]);

    main.set_rational(tags::REFERENCE_BLACK_WHITE, &[
        (0, 1), (255, 1), (128, 1), (255, 1), (128, 1), (255, 1),
    ]);

    main.set_rational(tags::YCBCR_COEFFICIENTS, &[
        (299, 1000), (587, 1000), (114, 1000),
    ]);

    main.set_short(tags::YCBCR_POSITIONING, &[2]);
}


/// The private data tag preserves the maker note verbatim, prefixed the way
/// the adobe converters expect it: the creator string, a tagged length, the
/// source byte order, and the original file offset of the note. The raw
/// converter also appends the PRD, WBG and RIF blocks behind an `MRW ` tag.
fn build_private_data(mrw: &Mrw, note_offset: u32, note: &[u8]) -> Vec<u8> {
    let prd = mrw.prd.with_header(b"\0PRD");
    let wbg = mrw.wbg.with_header(b"\0WBG");
    let rif = mrw.rif.with_header(b"\0RIF");

    let mut data = Vec::with_capacity(20 + note.len() + 12 + prd.len() + wbg.len() + rif.len());

    data.extend_from_slice(b"Adobe\0");
    data.extend_from_slice(b"MakN");
    push_u32_be(&mut data, note.len() as u32 + 6);
    data.extend_from_slice(b"MM"); // the source tiff is big-endian
    push_u32_be(&mut data, note_offset);
    data.extend_from_slice(note);

    data.extend_from_slice(b"MRW ");
    push_u32_be(&mut data, (4 + prd.len() + wbg.len() + rif.len()) as u32);
    data.extend_from_slice(b"MM\x00\x03");
    data.extend_from_slice(&prd);
    data.extend_from_slice(&wbg);
    data.extend_from_slice(&rif);

    data
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::mrw::Block;

    fn mrw_with_blocks(prd: Vec<u8>, wbg: Vec<u8>) -> Mrw {
        Mrw {
            width: 8, height: 4,
            prd: Block { offset: 0, data: prd },
            ttw: Block { offset: 40, data: vec![] },
            wbg: Block { offset: 80, data: wbg },
            rif: Block { offset: 100, data: vec![7, 7] },
            raw: vec![0; 32],
        }
    }

    fn valid_prd() -> Vec<u8> {
        let mut prd = vec![0_u8; 24];
        prd[0 .. 8].copy_from_slice(b"21810002");
        prd[8 .. 10].copy_from_slice(&4_u16.to_be_bytes()); // height
        prd[10 .. 12].copy_from_slice(&8_u16.to_be_bytes()); // width
        prd[12 .. 14].copy_from_slice(&2_u16.to_be_bytes()); // ccd height
        prd[14 .. 16].copy_from_slice(&6_u16.to_be_bytes()); // ccd width
        prd[16] = 12;
        prd[17] = 12;
        prd[18] = 0x59;
        prd[22 .. 24].copy_from_slice(&1_u16.to_be_bytes());
        prd
    }

    #[test]
    fn prd_tags_describe_the_mosaic() {
        let mrw = mrw_with_blocks(valid_prd(), vec![0; 12]);
        let mut main = Ifd::new();
        let mut raw = Ifd::new();

        add_camera_tags(&mrw, &mut main, &mut raw).unwrap();

        assert_eq!(raw.long_at(tags::IMAGE_WIDTH, 0).unwrap(), 8);
        assert_eq!(raw.long_at(tags::IMAGE_LENGTH, 0).unwrap(), 4);
        assert_eq!(raw.long_at(tags::ACTIVE_AREA, 2).unwrap(), 4);

        // crop origin is ((8 - 6) / 2, (4 - 2) / 2) = (1, 1)
        assert_eq!(raw.long_at(tags::DEFAULT_CROP_ORIGIN, 0).unwrap(), 1);
    }

    #[test]
    fn unknown_camera_is_rejected() {
        let mut prd = valid_prd();
        prd[0 .. 8].copy_from_slice(b"99999999");

        let mrw = mrw_with_blocks(prd, vec![0; 12]);
        let result = add_camera_tags(&mrw, &mut Ifd::new(), &mut Ifd::new());

        assert!(matches!(result, Err(Error::NotSupported(_))));
    }

    #[test]
    fn invalid_prd_constants_are_rejected() {
        let mut prd = valid_prd();
        prd[18] = 0x58;

        let mrw = mrw_with_blocks(prd, vec![0; 12]);
        let result = add_camera_tags(&mrw, &mut Ifd::new(), &mut Ifd::new());

        assert!(matches!(result, Err(Error::Invalid(message)) if message.contains("StorageMethod")));
    }

    #[test]
    fn white_balance_neutral_values() {
        // gains: r = 128/64 = 2, g = (64/64 + 192/64) / 2 = 2, b = 320/64 = 5
        let mut wbg = vec![0_u8; 12];
        wbg[4 .. 6].copy_from_slice(&128_u16.to_be_bytes());
        wbg[6 .. 8].copy_from_slice(&64_u16.to_be_bytes());
        wbg[8 .. 10].copy_from_slice(&192_u16.to_be_bytes());
        wbg[10 .. 12].copy_from_slice(&320_u16.to_be_bytes());

        let mrw = mrw_with_blocks(valid_prd(), wbg);
        let mut main = Ifd::new();
        add_white_balance(&mrw, &mut main).unwrap();

        assert_eq!(main.long_at(tags::AS_SHOT_NEUTRAL, 0).unwrap(), 500_000);
        assert_eq!(main.long_at(tags::AS_SHOT_NEUTRAL, 2).unwrap(), 500_000);
        assert_eq!(main.long_at(tags::AS_SHOT_NEUTRAL, 4).unwrap(), 200_000);
    }

    #[test]
    fn private_data_envelope_layout() {
        let mrw = mrw_with_blocks(valid_prd(), vec![0; 12]);
        let note = [0xaa_u8, 0xbb, 0xcc];
        let data = build_private_data(&mrw, 0x1234, &note);

        assert_eq!(&data[0 .. 6], b"Adobe\0");
        assert_eq!(&data[6 .. 10], b"MakN");
        assert_eq!(&data[10 .. 14], &(3_u32 + 6).to_be_bytes());
        assert_eq!(&data[14 .. 16], b"MM");
        assert_eq!(&data[16 .. 20], &0x1234_u32.to_be_bytes());
        assert_eq!(&data[20 .. 23], &note);

        assert_eq!(&data[23 .. 27], b"MRW ");

        let block_bytes = (8 + 24) + (8 + 12) + (8 + 2);
        assert_eq!(&data[27 .. 31], &(4 + block_bytes as u32).to_be_bytes());
        assert_eq!(&data[31 .. 35], b"MM\x00\x03");
        assert_eq!(&data[35 .. 39], b"\0PRD");

        assert_eq!(data.len(), 35 + block_bytes);
    }
}
