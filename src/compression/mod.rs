
//! Contains the compression method definition
//! and the lossless jpeg encoder for the raw sensor data.


// private modules make non-breaking changes easier
pub mod jpeg;


/// Specifies how the raw sensor data is stored in the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {

    /// Store the samples as plain little-endian 16 bit integers.
    /// Produces large files that can be read and written very quickly.
    Uncompressed,

    /// Entropy-code prediction residuals with huffman tables
    /// that are optimized for the image. This compression method is lossless
    /// and typically halves the file size of a raw photograph.
    LosslessJpeg,
}

impl Compression {

    /// The value of the tiff `Compression` tag.
    pub fn tiff_code(self) -> u16 {
        match self {
            Compression::Uncompressed => 1,
            Compression::LosslessJpeg => 7,
        }
    }
}


/// Whether both bayer sample lanes share one huffman table.
/// Separate tables compress better when the two color channels
/// inside a row have different residual distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMode {

    /// One huffman table for both sample lanes.
    Single,

    /// An independent huffman table per sample lane.
    PerLane,
}

impl TableMode {

    pub fn table_count(self) -> usize {
        match self {
            TableMode::Single => 1,
            TableMode::PerLane => 2,
        }
    }

    /// Which table the specified sample lane is entropy-coded with.
    pub fn table_for_lane(self, lane: usize) -> usize {
        match self {
            TableMode::Single => 0,
            TableMode::PerLane => lane,
        }
    }
}


/// A read-only view of the sensor samples that one tile encodes.
/// The view may be smaller than the declared tile size,
/// in which case the encoder pads the shortfall.
#[derive(Debug, Clone, Copy)]
pub struct TileSource<'s> {

    /// All samples of the image, row-major.
    samples: &'s [u16],

    /// Number of samples from one image row to the next.
    row_stride: usize,

    /// Number of image rows present in this tile.
    enc_rows: usize,

    /// Number of two-sample pairs present in each row of this tile.
    enc_pairs: usize,
}

impl<'s> TileSource<'s> {

    /// View of the tile at the specified sample position.
    /// The first sample of the tile must be the first sample of some image row pair.
    pub fn new(samples: &'s [u16], row_stride: usize, enc_rows: usize, enc_pairs: usize) -> Self {
        debug_assert!(enc_rows > 0 && enc_pairs > 0, "empty tile");
        debug_assert!((enc_rows - 1) * row_stride + enc_pairs * 2 <= samples.len(), "tile exceeds the image");
        Self { samples, row_stride, enc_rows, enc_pairs }
    }

    pub fn enc_rows(&self) -> usize { self.enc_rows }
    pub fn enc_pairs(&self) -> usize { self.enc_pairs }

    /// The samples of one tile row. Empty if the row is below the present region.
    pub fn row(&self, index: usize) -> &'s [u16] {
        if index >= self.enc_rows { return &[] }
        &self.samples[index * self.row_stride .. index * self.row_stride + self.enc_pairs * 2]
    }
}


/// The tile size that the container declares, in row pairs and sample pairs.
/// Everything beyond the present source region is padded by the encoder.
#[derive(Debug, Clone, Copy)]
pub struct DeclaredSize {

    /// Declared number of physical rows. Always even.
    pub rows: usize,

    /// Declared number of two-sample pairs per physical row.
    pub pairs: usize,
}
