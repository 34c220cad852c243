
//! Numeric tag ids and value types of the tiff directories
//! that appear in the converted file or in the source exif data.

use crate::error::{Error, Result};


/// The value type of a directory entry, as defined by tiff 6.0.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TagType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Float = 11,
    Double = 12,
}

impl TagType {

    /// The serialized size of a single value of this type.
    pub fn byte_size(self) -> usize {
        match self {
            TagType::Byte | TagType::Ascii | TagType::SByte | TagType::Undefined => 1,
            TagType::Short | TagType::SShort => 2,
            TagType::Long | TagType::SLong | TagType::Float => 4,
            TagType::Rational | TagType::SRational | TagType::Double => 8,
        }
    }

    /// Interpret a type code read from a source directory entry.
    pub fn from_code(code: u16) -> Result<Self> {
        Ok(match code {
            1 => TagType::Byte,
            2 => TagType::Ascii,
            3 => TagType::Short,
            4 => TagType::Long,
            5 => TagType::Rational,
            6 => TagType::SByte,
            7 => TagType::Undefined,
            8 => TagType::SShort,
            9 => TagType::SLong,
            10 => TagType::SRational,
            11 => TagType::Float,
            12 => TagType::Double,
            _ => return Err(Error::invalid(format!("directory entry type #{}", code))),
        })
    }
}


// baseline tiff
pub const NEW_SUBFILE_TYPE: u16 = 254;
pub const IMAGE_WIDTH: u16 = 256;
pub const IMAGE_LENGTH: u16 = 257;
pub const BITS_PER_SAMPLE: u16 = 258;
pub const COMPRESSION: u16 = 259;
pub const PHOTOMETRIC_INTERPRETATION: u16 = 262;
pub const IMAGE_DESCRIPTION: u16 = 270;
pub const MAKE: u16 = 271;
pub const MODEL: u16 = 272;
pub const STRIP_OFFSETS: u16 = 273;
pub const ORIENTATION: u16 = 274;
pub const SAMPLES_PER_PIXEL: u16 = 277;
pub const ROWS_PER_STRIP: u16 = 278;
pub const STRIP_BYTE_COUNTS: u16 = 279;
pub const X_RESOLUTION: u16 = 282;
pub const Y_RESOLUTION: u16 = 283;
pub const PLANAR_CONFIGURATION: u16 = 284;
pub const RESOLUTION_UNIT: u16 = 296;
pub const SOFTWARE: u16 = 305;
pub const DATE_TIME: u16 = 306;

// tiled images and sub directories
pub const TILE_WIDTH: u16 = 322;
pub const TILE_LENGTH: u16 = 323;
pub const TILE_OFFSETS: u16 = 324;
pub const TILE_BYTE_COUNTS: u16 = 325;
pub const SUB_IFDS: u16 = 330;

// ycbcr thumbnail description
pub const YCBCR_COEFFICIENTS: u16 = 529;
pub const YCBCR_SUB_SAMPLING: u16 = 530;
pub const YCBCR_POSITIONING: u16 = 531;
pub const REFERENCE_BLACK_WHITE: u16 = 532;

// tiff/ep and exif
pub const CFA_REPEAT_PATTERN_DIM: u16 = 33421;
pub const CFA_PATTERN: u16 = 33422;
pub const EXIF_IFD: u16 = 34665;
pub const MAKER_NOTE: u16 = 37500;
pub const INTEROPERABILITY_IFD: u16 = 40965;
pub const PRINT_IM: u16 = 50341;

// dng
pub const DNG_VERSION: u16 = 50706;
pub const DNG_BACKWARD_VERSION: u16 = 50707;
pub const UNIQUE_CAMERA_MODEL: u16 = 50708;
pub const LOCALIZED_CAMERA_MODEL: u16 = 50709;
pub const CFA_PLANE_COLOR: u16 = 50710;
pub const CFA_LAYOUT: u16 = 50711;
pub const BLACK_LEVEL_REPEAT_DIM: u16 = 50713;
pub const BLACK_LEVEL: u16 = 50714;
pub const WHITE_LEVEL: u16 = 50717;
pub const DEFAULT_SCALE: u16 = 50718;
pub const DEFAULT_CROP_ORIGIN: u16 = 50719;
pub const DEFAULT_CROP_SIZE: u16 = 50720;
pub const COLOR_MATRIX_1: u16 = 50721;
pub const COLOR_MATRIX_2: u16 = 50722;
pub const ANALOG_BALANCE: u16 = 50727;
pub const AS_SHOT_NEUTRAL: u16 = 50728;
pub const BASELINE_EXPOSURE: u16 = 50730;
pub const BASELINE_NOISE: u16 = 50731;
pub const BASELINE_SHARPNESS: u16 = 50732;
pub const BAYER_GREEN_SPLIT: u16 = 50733;
pub const LINEAR_RESPONSE_LIMIT: u16 = 50734;
pub const ANTI_ALIAS_STRENGTH: u16 = 50738;
pub const SHADOW_SCALE: u16 = 50739;
pub const DNG_PRIVATE_DATA: u16 = 50740;
pub const CALIBRATION_ILLUMINANT_1: u16 = 50778;
pub const CALIBRATION_ILLUMINANT_2: u16 = 50779;
pub const BEST_QUALITY_SCALE: u16 = 50780;
pub const ORIGINAL_RAW_FILE_NAME: u16 = 50827;
pub const ACTIVE_AREA: u16 = 50829;

// minolta maker note
pub const MLT_THUMBNAIL_OFFSET: u16 = 0x0088;
pub const MLT_THUMBNAIL_LENGTH: u16 = 0x0089;
