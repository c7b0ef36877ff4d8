//! Row bitmasks shared by the filter mask and the partition boundary mask.


///
/// RowMask
///
/// One bit per row packed into 64-bit words. A mask that was never
/// materialized reports every row as valid.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RowMask {
    words: Option<Vec<u64>>,
}

impl RowMask {
    pub const BITS_PER_WORD: usize = u64::BITS as usize;

    /// Mask with every row valid and no backing storage.
    #[must_use]
    pub const fn all_valid() -> Self {
        Self { words: None }
    }

    /// Materialized mask of `len` rows, all invalid.
    #[must_use]
    pub fn none_valid(len: usize) -> Self {
        Self {
            words: Some(vec![0; Self::word_count(len)]),
        }
    }

    /// Materialized mask with exactly the listed rows valid.
    #[must_use]
    pub fn from_valid_rows(len: usize, rows: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::none_valid(len);
        for row in rows {
            mask.set_valid(row);
        }

        mask
    }

    #[must_use]
    pub const fn word_count(len: usize) -> usize {
        len.div_ceil(Self::BITS_PER_WORD)
    }

    #[must_use]
    pub const fn is_materialized(&self) -> bool {
        self.words.is_some()
    }

    #[must_use]
    pub fn words(&self) -> Option<&[u64]> {
        self.words.as_deref()
    }

    /// Mark one row valid, growing the backing storage when needed.
    pub fn set_valid(&mut self, row: usize) {
        let (word, shift) = Self::entry(row);
        let words = self.words.get_or_insert_with(Vec::new);
        if words.len() <= word {
            words.resize(word + 1, 0);
        }
        words[word] |= 1 << shift;
    }

    #[must_use]
    pub fn row_is_valid(&self, row: usize) -> bool {
        let Some(words) = self.words.as_deref() else {
            return true;
        };
        let (word, shift) = Self::entry(row);

        words.get(word).is_some_and(|bits| bits & (1 << shift) != 0)
    }

    /// Ascending valid rows in `[0, len)`, skipping blank words whole.
    #[must_use]
    pub fn valid_rows(&self, len: usize) -> Vec<usize> {
        let Some(words) = self.words.as_deref() else {
            return (0..len).collect();
        };

        let mut rows = Vec::new();
        let mut start = 0;
        while start < len {
            let (word, shift) = Self::entry(start);
            let bits = words.get(word).copied().unwrap_or(0);
            if bits == 0 && shift == 0 {
                start += Self::BITS_PER_WORD;
                continue;
            }

            for bit in shift..Self::BITS_PER_WORD {
                if start >= len {
                    break;
                }
                if bits & (1 << bit) != 0 {
                    rows.push(start);
                }
                start += 1;
            }
        }

        rows
    }

    const fn entry(row: usize) -> (usize, usize) {
        (row / Self::BITS_PER_WORD, row % Self::BITS_PER_WORD)
    }
}
