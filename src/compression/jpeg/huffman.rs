
//! Optimal huffman table construction as defined by the jpeg specification,
//! ITU-T.81 Annex K (code length derivation and limiting)
//! and Annex C (canonical code generation).

/// No code word is ever longer than this, as required by the table segment format.
pub const MAX_CODE_LENGTH: usize = 16;

/// The index of the reserved code point that is added during construction.
/// It guarantees that no real code word consists of all one bits,
/// which in turn keeps unescaped `0xff` bytes out of the entropy-coded data.
const RESERVED: usize = 256;


/// A generated encoding table. For each symbol with a non-zero `code_length`,
/// `code` yields the canonical code word. Symbols with length zero never
/// occur in the data and have no code assigned.
#[derive(Debug, Clone)]
pub struct HuffmanEncoder {

    /// How many codes exist of each length. Only indices 1 to 16 are ever non-zero.
    bits: [u32; 33],

    /// The symbols in order of ascending code length,
    /// ascending by symbol value within the same length.
    huffval: [u8; 256],

    /// Number of symbols that have a code assigned.
    value_count: usize,

    /// The code word for each symbol.
    ehufco: [u16; 256],

    /// The code length for each symbol. Zero means the symbol is unused.
    ehufsi: [u8; 256],
}

impl HuffmanEncoder {

    /// Build the optimal table for the specified symbol frequencies.
    pub fn from_frequencies(frequencies: &[u64; 256]) -> Self {
        let codesize = derive_code_sizes(frequencies);

        let mut bits = length_histogram(&codesize);
        limit_code_lengths(&mut bits);

        let (huffval, value_count) = sort_symbols_by_length(&codesize);

        let mut encoder = HuffmanEncoder {
            bits, huffval, value_count,
            ehufco: [0; 256],
            ehufsi: [0; 256],
        };

        encoder.generate_canonical_codes();
        encoder
    }

    /// The code word and its length for the specified symbol.
    /// The length is zero if the symbol never occurred.
    pub fn code(&self, symbol: u8) -> (u32, u32) {
        (u32::from(self.ehufsi[symbol as usize]), u32::from(self.ehufco[symbol as usize]))
    }

    /// The code length for the specified symbol, zero if unused.
    pub fn code_length(&self, symbol: u8) -> u32 {
        u32::from(self.ehufsi[symbol as usize])
    }

    /// The sixteen per-length code counts of the table segment.
    pub fn length_counts(&self) -> &[u32] {
        &self.bits[1 ..= MAX_CODE_LENGTH]
    }

    /// The symbols of the table segment, ordered by ascending code length.
    pub fn symbols(&self) -> &[u8] {
        &self.huffval[.. self.value_count]
    }

    /// Annex C Figures C.1 to C.3: expand the length counts into per-code sizes,
    /// derive the canonical code for each, and index them by symbol.
    fn generate_canonical_codes(&mut self) {

        // Figure C.1: one length entry per code, plus a zero terminator
        let mut huffsize = [0_u32; 257];
        let mut count = 0;

        for length in 1 ..= MAX_CODE_LENGTH {
            for _ in 0 .. self.bits[length] {
                huffsize[count] = length as u32;
                count += 1;
            }
        }

        debug_assert_eq!(count, self.value_count, "length counts disagree with sorted symbols");
        if count == 0 { return }

        // Figure C.2: counting up within a length, shifting left when the length grows
        let mut huffcode = [0_u32; 257];
        let mut code = 0_u32;
        let mut size = huffsize[0];
        let mut index = 0;

        'all_codes: loop {
            loop {
                huffcode[index] = code;
                code += 1;
                index += 1;
                if huffsize[index] != size { break }
            }

            if huffsize[index] == 0 { break 'all_codes }

            loop {
                code <<= 1;
                size += 1;
                if huffsize[index] == size { break }
            }
        }

        // Figure C.3: order the codes by symbol
        for index in 0 .. count {
            let symbol = self.huffval[index] as usize;
            self.ehufco[symbol] = huffcode[index] as u16;
            self.ehufsi[symbol] = huffsize[index] as u8;
        }
    }
}


/// Annex K Figure K.1: repeatedly merge the two least frequent entries,
/// tracking the code length of every symbol through chained index lists.
/// Index 256 is the reserved entry with a frequency of one.
/// When the least frequency is shared, the highest index wins.
fn derive_code_sizes(frequencies: &[u64; 256]) -> [u32; 257] {
    let mut freq = [0_u64; 257];
    freq[.. 256].copy_from_slice(frequencies);
    freq[RESERVED] = 1;

    let mut codesize = [0_u32; 257];
    let mut others = [-1_i32; 257];

    loop {
        let least_index = |exclude: i32| {
            let mut found = -1_i32;
            let mut least = u64::MAX;

            for index in 0 .. 257 {
                if index as i32 != exclude && freq[index] > 0 && freq[index] <= least {
                    least = freq[index];
                    found = index as i32;
                }
            }

            found
        };

        let v1 = least_index(-1);
        let v2 = least_index(v1);
        if v2 < 0 { break }

        let (v1, v2) = (v1 as usize, v2 as usize);

        freq[v1] += freq[v2];
        freq[v2] = 0;

        let mut chain = v1;
        codesize[chain] += 1;
        while others[chain] >= 0 {
            chain = others[chain] as usize;
            codesize[chain] += 1;
        }

        others[chain] = v2 as i32;

        let mut chain = v2;
        codesize[chain] += 1;
        while others[chain] >= 0 {
            chain = others[chain] as usize;
            codesize[chain] += 1;
        }
    }

    codesize
}

/// Annex K Figure K.2: count how many symbols were assigned each code length.
/// Lengths up to 32 can occur before the limiting step.
fn length_histogram(codesize: &[u32; 257]) -> [u32; 33] {
    let mut bits = [0_u32; 33];

    for &size in codesize.iter() {
        if size > 0 {
            bits[size as usize] += 1;
        }
    }

    bits
}

/// Annex K Figure K.3: limit all code lengths to 16 bits.
/// Symbols at the longest length are removed in pairs: the pair's prefix
/// is given to one of them, and a code from the next shorter non-zero
/// length is split into two codes one bit longer. The final step removes
/// the reserved code point from the longest used length.
fn limit_code_lengths(bits: &mut [u32; 33]) {
    let mut i = 32;

    while i > MAX_CODE_LENGTH {
        if bits[i] > 0 {
            let mut j = i - 2;
            while bits[j] == 0 { j -= 1 }

            bits[i] -= 2;
            bits[i - 1] += 1;
            bits[j + 1] += 2;
            bits[j] -= 1;
        }
        else {
            i -= 1;
        }
    }

    while i > 0 && bits[i] == 0 { i -= 1 }
    if i > 0 { bits[i] -= 1 }
}

/// Annex K Figure K.4: list the symbols ordered by code length,
/// ordered by symbol value within a length class.
/// The reserved index 256 is not a symbol and is skipped.
fn sort_symbols_by_length(codesize: &[u32; 257]) -> ([u8; 256], usize) {
    let mut huffval = [0_u8; 256];
    let mut count = 0;

    for length in 1 ..= 32 {
        for symbol in 0 .. 256 {
            if codesize[symbol] == length {
                huffval[count] = symbol as u8;
                count += 1;
            }
        }
    }

    (huffval, count)
}


#[cfg(test)]
mod test {
    use super::*;

    fn frequencies(counts: &[u64]) -> [u64; 256] {
        let mut freq = [0_u64; 256];
        freq[.. counts.len()].copy_from_slice(counts);
        freq
    }

    fn assert_table_invariants(encoder: &HuffmanEncoder, freq: &[u64; 256]) {
        let assigned: Vec<(u16, u8)> = (0 .. 256)
            .filter(|&symbol| encoder.ehufsi[symbol] > 0)
            .map(|symbol| (encoder.ehufco[symbol], encoder.ehufsi[symbol]))
            .collect();

        for &(code, length) in &assigned {
            // length bound
            assert!(length as usize <= MAX_CODE_LENGTH);

            // the code fits its length
            assert_eq!(u32::from(code) >> length, 0);

            // no code is all one bits
            assert_ne!(u32::from(code), (1_u32 << length) - 1, "all-one code assigned");
        }

        // no code is a prefix of a longer code
        for &(code, length) in &assigned {
            for &(other, other_length) in &assigned {
                if other_length > length {
                    assert_ne!(
                        u32::from(other) >> (other_length - length), u32::from(code),
                        "code {:b} is a prefix of {:b}", code, other
                    );
                }
            }
        }

        // every symbol that occurs has a code
        for symbol in 0 .. 256 {
            if freq[symbol] > 0 {
                assert!(encoder.ehufsi[symbol] > 0, "frequent symbol {} has no code", symbol);
            }
        }
    }

    #[test]
    fn small_frequency_list() {
        let freq = frequencies(&[3, 2, 1, 1, 1]);
        let encoder = HuffmanEncoder::from_frequencies(&freq);

        assert_eq!(encoder.length_counts(), &[0, 2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(encoder.symbols(), &[0, 1, 2, 3, 4]);

        assert_eq!(&encoder.ehufsi[.. 6], &[2, 2, 3, 3, 3, 0]);
        assert_eq!(&encoder.ehufco[.. 5], &[0b00, 0b01, 0b100, 0b101, 0b110]);

        assert_table_invariants(&encoder, &freq);
    }

    #[test]
    fn single_symbol_still_receives_a_code() {
        let freq = frequencies(&[9]);
        let encoder = HuffmanEncoder::from_frequencies(&freq);

        assert_eq!(encoder.symbols(), &[0]);
        assert_eq!(encoder.code(0), (1, 0));
        assert_table_invariants(&encoder, &freq);
    }

    #[test]
    fn more_frequent_symbols_get_shorter_codes() {
        let freq = frequencies(&[100, 50, 20, 10, 5, 2, 1]);
        let encoder = HuffmanEncoder::from_frequencies(&freq);

        for a in 0 .. 256 {
            for b in 0 .. 256 {
                if freq[a] > freq[b] && freq[b] > 0 {
                    assert!(
                        encoder.ehufsi[a] <= encoder.ehufsi[b],
                        "symbol {} is more frequent than {} but has a longer code", a, b
                    );
                }
            }
        }

        assert_table_invariants(&encoder, &freq);
    }

    #[test]
    fn random_frequencies_uphold_all_invariants() {
        use rand::prelude::*;
        let mut random = rand::rngs::StdRng::seed_from_u64(42);

        for _ in 0 .. 200 {
            let mut freq = [0_u64; 256];
            let used_categories = random.random_range(1 ..= 17);

            for category in 0 .. used_categories {
                freq[category] = random.random_range(0 .. 10_000);
            }

            if freq.iter().all(|&count| count == 0) {
                freq[0] = 1;
            }

            let encoder = HuffmanEncoder::from_frequencies(&freq);
            assert_table_invariants(&encoder, &freq);
        }
    }

    #[test]
    fn length_counts_sum_matches_symbol_count() {
        let freq = frequencies(&[7, 7, 7, 3, 3, 1, 1, 1, 1, 1, 1]);
        let encoder = HuffmanEncoder::from_frequencies(&freq);

        let total: u32 = encoder.length_counts().iter().sum();
        assert_eq!(total as usize, encoder.symbols().len());
        assert!(total <= 256);
    }
}
