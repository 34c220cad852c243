
//! Integer helpers for tile layout computations.


/// Whether to round up or down when dividing.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RoundingMode {
    Down, Up,
}

impl RoundingMode {
    pub fn divide(self, dividend: u32, divisor: u32) -> u32 {
        match self {
            RoundingMode::Up => (dividend + divisor - 1) / divisor, // only works for positive numbers
            RoundingMode::Down => dividend / divisor,
        }
    }
}

pub fn compute_tile_count(full_res: u32, tile_size: u32) -> u32 {
    // round up, because if the image is not evenly divisible by the tiles,
    // we add another tile at the end (which is only partially used)
    RoundingMode::Up.divide(full_res, tile_size)
}

/// Round up to the next even number.
#[inline]
pub fn round_up_even(size: u32) -> u32 {
    (size + 1) & !1
}

/// Round up to the next multiple of four.
#[inline]
pub fn round_up_to_long(size: u32) -> u32 {
    (size + 3) & !3
}
