
//! Assemble and write the output file.
//!
//! The file layout is: tiff header, main directory, raw sub directory,
//! exif directory, the optional interoperability directory, the embedded
//! thumbnail, and finally the raw image data. Directory tags that point
//! at later parts of the file start out as zero placeholders and are
//! patched once the size of every directory is known, so that the file
//! can be written strictly sequentially.

mod metadata;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::compression::{jpeg, Compression, DeclaredSize, TableMode, TileSource};
use crate::error::{Error, UnitResult, usize_to_u32};
use crate::io::{ChunkedBuffer, Data, Tracking, Write};
use crate::math::{compute_tile_count, round_up_even};
use crate::meta::tags;
use crate::meta::Ifd;
use crate::mrw::{self, Mrw};
use self::metadata::Thumbnail;


/// How the raw image data is split up in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tiling {

    /// Compress rectangular tiles independently.
    /// A reader can then decode only the parts of the image it needs.
    Tiles { width: u32, height: u32 },

    /// Store the complete image as a single strip.
    SingleStrip,
}

/// All configuration of a conversion.
#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions {
    pub compression: Compression,
    pub tiling: Tiling,
    pub tables: TableMode,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            compression: Compression::LosslessJpeg,
            tiling: Tiling::Tiles { width: 256, height: 256 },
            tables: TableMode::PerLane,
        }
    }
}

impl ConvertOptions {

    /// Check the configuration before starting a conversion.
    /// Tiles must be at least 16 samples in each direction,
    /// and even-sized so that they start on a bayer pattern boundary.
    pub fn validate(&self) -> UnitResult {
        if let Tiling::Tiles { width, height } = self.tiling {
            if width < 16 || height < 16 {
                return Err(Error::invalid("tile size below 16"));
            }

            if width % 2 != 0 || height % 2 != 0 {
                return Err(Error::invalid("tile size must be even"));
            }
        }

        Ok(())
    }
}


/// Convert the mrw file at the source path into a dng file at the destination path.
pub fn convert_file(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &ConvertOptions,
) -> UnitResult
{
    options.validate()?;
    let mrw = Mrw::read_from_file(source.as_ref())?;

    let original_name = source.as_ref().file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut write = BufWriter::new(File::create(destination)?);
    write_dng(&mrw, &original_name, options, &mut write)?;

    write.flush()?; // catch delayed io errors before reporting success
    Ok(())
}

/// Convert an already loaded mrw image,
/// writing the complete output file into the specified writer.
pub fn write_dng(
    mrw: &Mrw,
    original_name: &str,
    options: &ConvertOptions,
    write: &mut impl Write,
) -> UnitResult
{
    options.validate()?;

    let mut dng = DngWriter::new(mrw, options);

    dng.add_fixed_tags(original_name);
    metadata::add_camera_tags(mrw, &mut dng.main, &mut dng.raw)?;
    let thumbnail = metadata::add_exif_tags(mrw, &mut dng.main, &mut dng.exif, &mut dng.interop)?;
    metadata::add_white_balance(mrw, &mut dng.main)?;

    dng.compress_raw();
    dng.write_to(thumbnail, write)
}


struct DngWriter<'m> {
    mrw: &'m Mrw,
    options: ConvertOptions,

    main: Ifd,
    raw: Ifd,
    exif: Ifd,
    interop: Ifd,

    /// The compressed bytes of every tile, in file order.
    /// Empty when writing uncompressed data.
    tiles: Vec<ChunkedBuffer>,
}

impl<'m> DngWriter<'m> {

    fn new(mrw: &'m Mrw, options: &ConvertOptions) -> Self {
        DngWriter {
            mrw, options: *options,
            main: Ifd::new(),
            raw: Ifd::new(),
            exif: Ifd::new(),
            interop: Ifd::new(),
            tiles: Vec::new(),
        }
    }

    /// The tags that are the same for every conversion:
    /// version numbers, the calibration for the supported camera body,
    /// and the description of the raw mosaic data.
    fn add_fixed_tags(&mut self, original_name: &str) {
        let main = &mut self.main;

        main.set_long(tags::NEW_SUBFILE_TYPE, &[1]);
        main.set_byte(tags::DNG_VERSION, &[1, 1, 0, 0]);
        main.set_byte(tags::DNG_BACKWARD_VERSION, &[1, 1, 0, 0]);
        main.set_ascii(tags::ORIGINAL_RAW_FILE_NAME, original_name);

        main.set_srational(tags::BASELINE_EXPOSURE, &[(-50, 100)]);
        main.set_rational(tags::BASELINE_NOISE, &[(133, 100)]);
        main.set_rational(tags::BASELINE_SHARPNESS, &[(133, 100)]);
        main.set_rational(tags::LINEAR_RESPONSE_LIMIT, &[(100, 100)]);
        main.set_rational(tags::SHADOW_SCALE, &[(1, 1)]);

        main.set_short(tags::CALIBRATION_ILLUMINANT_1, &[17]); // standard light a
        main.set_short(tags::CALIBRATION_ILLUMINANT_2, &[21]); // d65

        main.set_srational(tags::COLOR_MATRIX_1, &[
            (12036, 10000), (-4954, 10000), (-75, 10000),
            (-7019, 10000), (14449, 10000), (2811, 10000),
            (-513, 10000), (635, 10000), (6839, 10000),
        ]);

        main.set_srational(tags::COLOR_MATRIX_2, &[
            (10239, 10000), (-3104, 10000), (-1099, 10000),
            (-8037, 10000), (15727, 10000), (2451, 10000),
            (-927, 10000), (925, 10000), (6871, 10000),
        ]);

        let raw = &mut self.raw;

        raw.set_long(tags::NEW_SUBFILE_TYPE, &[0]);
        raw.set_short(tags::PHOTOMETRIC_INTERPRETATION, &[32803]); // color filter array
        raw.set_short(tags::BITS_PER_SAMPLE, &[16]);
        raw.set_long(tags::BAYER_GREEN_SPLIT, &[500]);
        raw.set_short(tags::PLANAR_CONFIGURATION, &[1]);
        raw.set_short(tags::COMPRESSION, &[self.options.compression.tiff_code()]);
        raw.set_short(tags::SAMPLES_PER_PIXEL, &[1]);
        raw.set_rational(tags::ANTI_ALIAS_STRENGTH, &[(100, 100)]);
        raw.set_rational(tags::BEST_QUALITY_SCALE, &[(1, 1)]);
        raw.set_short(tags::BLACK_LEVEL_REPEAT_DIM, &[1, 1]);
        raw.set_rational(tags::BLACK_LEVEL, &[(0, 256)]);
        raw.set_short(tags::WHITE_LEVEL, &[4095]);
    }

    /// Compress the sensor data and add the strip or tile description tags.
    /// Uncompressed data is always a single strip.
    fn compress_raw(&mut self) {
        let mrw = self.mrw;

        match (self.options.compression, self.options.tiling) {
            (Compression::Uncompressed, _) => {
                self.raw.set_long(tags::STRIP_OFFSETS, &[0]); // patched later
                self.raw.set_long(tags::ROWS_PER_STRIP, &[mrw.height]);
                self.raw.set_long(tags::STRIP_BYTE_COUNTS, &[mrw.width * mrw.height * 2]);
            }

            (Compression::LosslessJpeg, Tiling::SingleStrip) => {
                let region = TileRegion {
                    x: 0, y: 0,
                    width: mrw.width,
                    height: round_up_even(mrw.height),
                };

                let stream = encode_region(mrw, self.options.tables, region);

                self.raw.set_long(tags::STRIP_OFFSETS, &[0]); // patched later
                self.raw.set_long(tags::ROWS_PER_STRIP, &[mrw.height]);
                self.raw.set_long(tags::STRIP_BYTE_COUNTS, &[stream.len() as u32]);

                self.tiles = vec![stream];
            }

            (Compression::LosslessJpeg, Tiling::Tiles { width, height }) => {
                let horizontal = compute_tile_count(mrw.width, width);
                let vertical = compute_tile_count(mrw.height, height);

                let regions: Vec<TileRegion> = (0 .. vertical)
                    .flat_map(|row| (0 .. horizontal).map(move |column| TileRegion {
                        x: column * width,
                        y: row * height,
                        width, height,
                    }))
                    .collect();

                self.tiles = compress_tiles(mrw, self.options.tables, &regions);

                let byte_counts: Vec<u32> = self.tiles.iter()
                    .map(|tile| tile.len() as u32)
                    .collect();

                let count = self.tiles.len() as u32;
                self.raw.set_long(tags::TILE_WIDTH, &[width]);
                self.raw.set_long(tags::TILE_LENGTH, &[height]);
                self.raw.set(tags::TILE_OFFSETS, tags::TagType::Long, count); // patched later
                self.raw.set_long(tags::TILE_BYTE_COUNTS, &byte_counts);
            }
        }
    }

    /// Compute the position of everything behind the directories,
    /// patch the placeholder offsets, and write the whole file.
    fn write_to(mut self, thumbnail: Thumbnail, write: &mut impl Write) -> UnitResult {
        let has_interop = !self.interop.is_empty();

        self.main.set_long(tags::SUB_IFDS, &[0]);
        self.main.set_long(tags::EXIF_IFD, &[0]);

        // accumulate the position of every part of the file
        let mut end = 8 + self.main.byte_size();

        self.main.patch_long(tags::SUB_IFDS, 0, usize_to_u32(end, "directory offset")?)?;
        end += self.raw.byte_size();

        self.main.patch_long(tags::EXIF_IFD, 0, usize_to_u32(end, "directory offset")?)?;
        end += self.exif.byte_size();

        if has_interop {
            self.exif.patch_long(tags::INTEROPERABILITY_IFD, 0, usize_to_u32(end, "directory offset")?)?;
            end += self.interop.byte_size();
        }

        self.main.patch_long(tags::STRIP_OFFSETS, 0, usize_to_u32(end, "thumbnail offset")?)?;
        end += thumbnail.length;

        if self.tiles.is_empty() {
            // a single uncompressed strip
            self.raw.patch_long(tags::STRIP_OFFSETS, 0, usize_to_u32(end, "image offset")?)?;
            end += self.mrw.raw.len() * 2;
        }
        else if matches!(self.options.tiling, Tiling::Tiles { .. }) {
            for (index, tile) in self.tiles.iter().enumerate() {
                self.raw.patch_long(tags::TILE_OFFSETS, index, usize_to_u32(end, "tile offset")?)?;
                end += tile.len();
            }
        }
        else {
            self.raw.patch_long(tags::STRIP_OFFSETS, 0, usize_to_u32(end, "image offset")?)?;
            end += self.tiles[0].len();
        }

        // everything is in place, write the file front to back
        let mut write = Tracking::new(write);

        u8::write_slice(&mut write, b"II")?;
        42_u16.write(&mut write)?;
        8_u32.write(&mut write)?;

        self.main.write_to(&mut write)?;
        self.raw.write_to(&mut write)?;
        self.exif.write_to(&mut write)?;

        if has_interop {
            self.interop.write_to(&mut write)?;
        }

        self.write_thumbnail(thumbnail, &mut write)?;
        self.write_image(&mut write)?;

        if write.byte_position() != end {
            return Err(Error::invalid("internal error: file offsets do not match the written bytes"));
        }

        Ok(())
    }

    /// The embedded thumbnail appears to have a garbled jpeg start marker,
    /// so the first two bytes are replaced.
    fn write_thumbnail(&self, thumbnail: Thumbnail, write: &mut impl Write) -> UnitResult {
        if thumbnail.length < 2 {
            return Err(Error::invalid("thumbnail size"));
        }

        let bytes = &self.mrw.ttw.data[thumbnail.offset .. thumbnail.offset + thumbnail.length];

        u8::write_slice(write, &[0xff, 0xd8])?;
        u8::write_slice(write, &bytes[2 ..])?;
        Ok(())
    }

    fn write_image(&self, write: &mut impl Write) -> UnitResult {
        if self.tiles.is_empty() {
            u16::write_slice(write, &self.mrw.raw)?;
        }
        else {
            for tile in &self.tiles {
                tile.write_to(write)?;
            }
        }

        Ok(())
    }
}


/// The region of the image that one tile declares.
/// Tiles at the right and bottom edges may reach beyond the image.
#[derive(Debug, Clone, Copy)]
struct TileRegion {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// Compress every tile independently.
/// Each tile reads from its own view of the image and owns its output,
/// so the tiles are compressed on all cores when threading is enabled.
#[cfg(feature = "rayon")]
fn compress_tiles(mrw: &Mrw, tables: TableMode, regions: &[TileRegion]) -> Vec<ChunkedBuffer> {
    use rayon::prelude::*;

    regions.par_iter()
        .map(|&region| encode_region(mrw, tables, region))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn compress_tiles(mrw: &Mrw, tables: TableMode, regions: &[TileRegion]) -> Vec<ChunkedBuffer> {
    regions.iter()
        .map(|&region| encode_region(mrw, tables, region))
        .collect()
}

/// Encode one tile and pad it to an even length,
/// so that every following tile starts on an even offset.
fn encode_region(mrw: &Mrw, tables: TableMode, region: TileRegion) -> ChunkedBuffer {
    let present_width = region.width.min(mrw.width - region.x);
    let present_height = region.height.min(mrw.height - region.y);

    let samples = &mrw.raw[(region.y * mrw.width + region.x) as usize ..];

    let source = TileSource::new(
        samples, mrw.width as usize,
        present_height as usize, (present_width / 2) as usize,
    );

    let declared = DeclaredSize {
        rows: region.height as usize,
        pairs: (region.width / 2) as usize,
    };

    let mut stream = jpeg::encode_tile(&source, declared, mrw::BIT_DEPTH, tables);

    if stream.len() % 2 != 0 {
        stream.push(0);
    }

    stream
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tile_configuration_is_validated() {
        let valid = ConvertOptions::default();
        assert!(valid.validate().is_ok());

        let too_small = ConvertOptions {
            tiling: Tiling::Tiles { width: 8, height: 256 },
            .. ConvertOptions::default()
        };
        assert!(too_small.validate().is_err());

        let odd = ConvertOptions {
            tiling: Tiling::Tiles { width: 256, height: 17 },
            .. ConvertOptions::default()
        };
        assert!(odd.validate().is_err());

        let strip = ConvertOptions {
            tiling: Tiling::SingleStrip,
            .. ConvertOptions::default()
        };
        assert!(strip.validate().is_ok());
    }
}
