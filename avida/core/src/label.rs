//! NOP labels: the symbolic addressing used by jumps, searches and the
//! "compute a value from the following nops" instructions.

use crate::{CoreError, Result};
use std::fmt;
use std::hash::{Hash, Hasher};

pub const MAX_LABEL_SIZE: usize = 10;

/// Fixed-capacity sequence of NOP modifiers. Appending to a full label is
/// silently ignored.
#[derive(Clone, Copy, Default)]
pub struct Label {
    nops: [u8; MAX_LABEL_SIZE],
    len: u8,
}

impl Label {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from modifiers, keeping at most [`MAX_LABEL_SIZE`] of them.
    pub fn from_nops(nops: &[u8]) -> Self {
        let mut label = Self::new();
        for &nop in nops {
            label.add_nop(nop);
        }
        label
    }

    /// Parse the letter form, `A` for modifier 0, `B` for 1 and so on.
    pub fn parse(text: &str) -> Result<Self> {
        if text.chars().count() > MAX_LABEL_SIZE {
            return Err(CoreError::InvalidLabel(format!(
                "'{text}' is longer than {MAX_LABEL_SIZE} symbols"
            )));
        }
        let mut label = Self::new();
        for c in text.chars() {
            if !c.is_ascii_uppercase() {
                return Err(CoreError::InvalidLabel(format!("bad label symbol '{c}'")));
            }
            label.add_nop(c as u8 - b'A');
        }
        Ok(label)
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == MAX_LABEL_SIZE
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.nops[..self.len()]
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.as_slice().get(index).copied()
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Returns false when the label was already full.
    pub fn add_nop(&mut self, nop: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.nops[self.len()] = nop;
        self.len += 1;
        true
    }

    /// Shift every symbol by `amount` within an alphabet of `base` symbols.
    /// With `amount == 1` this produces the complement label used by
    /// template matching.
    pub fn rotate(&mut self, amount: i32, base: usize) {
        if base == 0 {
            return;
        }
        let base = base as i32;
        let len = self.len();
        for nop in &mut self.nops[..len] {
            *nop = (*nop as i32 + amount).rem_euclid(base) as u8;
        }
    }

    pub fn rotated(mut self, amount: i32, base: usize) -> Self {
        self.rotate(amount, base);
        self
    }

    /// First offset at which `sub` occurs contiguously. An empty `sub` is
    /// found at offset 0.
    pub fn find_sub_label(&self, sub: &Label) -> Option<usize> {
        let hay = self.as_slice();
        let needle = sub.as_slice();
        if needle.is_empty() {
            return Some(0);
        }
        if needle.len() > hay.len() {
            return None;
        }
        'offsets: for offset in 0..=hay.len() - needle.len() {
            for (i, &nop) in needle.iter().enumerate() {
                if hay[offset + i] != nop {
                    continue 'offsets;
                }
            }
            return Some(offset);
        }
        None
    }

    /// Positional value with each symbol as a base-`base` digit.
    pub fn as_int(&self, base: usize) -> i32 {
        let base = base as i32;
        self.as_slice().iter().fold(0i32, |value, &nop| {
            value.wrapping_mul(base).wrapping_add(nop as i32)
        })
    }

    pub fn as_int_direct(&self, base: usize) -> i32 {
        self.as_int(base)
    }

    /// Bijective base-`base` value: digits run 1..=base so labels of
    /// different lengths never collide.
    pub fn as_int_unique(&self, base: usize) -> i32 {
        let base = base as i32;
        self.as_slice().iter().fold(0i32, |value, &nop| {
            value.wrapping_mul(base).wrapping_add(nop as i32 + 1)
        })
    }

    /// Reflected grey code generalised to `base`: a digit is mirrored when
    /// an odd number of odd digits precede it.
    pub fn as_int_grey_code(&self, base: usize) -> i32 {
        let base_i = base as i32;
        let mut value = 0i32;
        let mut odd_count = 0u32;
        for &nop in self.as_slice() {
            let digit = if odd_count % 2 == 0 {
                nop as i32
            } else {
                base_i - 1 - nop as i32
            };
            value = value.wrapping_mul(base_i).wrapping_add(digit);
            if nop % 2 == 1 {
                odd_count += 1;
            }
        }
        value
    }

    /// Sum of symbol values weighted by Fibonacci numbers 1, 2, 3, 5, 8, ...
    pub fn as_int_fib(&self) -> i32 {
        let (mut prev, mut weight) = (1i32, 1i32);
        let mut value = 0i32;
        for &nop in self.as_slice() {
            value = value.wrapping_add((nop as i32).wrapping_mul(weight));
            let next = prev.wrapping_add(weight);
            prev = weight;
            weight = next;
        }
        value
    }

    pub fn as_int_additive_polynomial(&self) -> i32 {
        let size = self.len() as f64;
        let exponent = 0.4 * (size - 1.0);
        let mut value = 0.0f64;
        for (i, &nop) in self.as_slice().iter().enumerate() {
            let i = i as f64;
            value += ((nop as f64) + 1.0).powf(exponent) + 0.3 * i * (size - 1.0) + 0.45 * i;
        }
        (value + 0.5) as i32
    }

    /// Runs of identical symbols become polynomial terms: run `j` of symbol
    /// `s` and length `r` contributes `r * (s + 1)^(j + 1)`.
    pub fn as_int_polynomial_coefficient(&self) -> i32 {
        let mut value = 0i32;
        let mut term = 0u32;
        let nops = self.as_slice();
        let mut i = 0;
        while i < nops.len() {
            let symbol = nops[i];
            let mut run = 1;
            while i + run < nops.len() && nops[i + run] == symbol {
                run += 1;
            }
            term += 1;
            let power = (symbol as i32 + 1).wrapping_pow(term);
            value = value.wrapping_add((run as i32).wrapping_mul(power));
            i += run;
        }
        value
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &nop in self.as_slice() {
            write!(f, "{}", char::from(b'A'.wrapping_add(nop)))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_wraps_symbols_past_the_alphabet() {
        assert_eq!(Label::from_nops(&[0, 2, 25]).to_string(), "ACZ");
        let wide = Label::from_nops(&[200]).to_string();
        assert_eq!(wide.chars().count(), 1);
    }

    #[test]
    fn add_nop_ignores_symbols_past_capacity() {
        let mut label = Label::new();
        for i in 0..12 {
            label.add_nop(i % 3);
        }
        assert_eq!(label.len(), MAX_LABEL_SIZE);
        assert!(!label.add_nop(1));
    }

    #[test]
    fn rotate_complements_within_alphabet() {
        let label = Label::parse("CAB").expect("label").rotated(1, 3);
        assert_eq!(label.to_string(), "ABC");
    }

    #[test]
    fn find_sub_label_returns_first_offset() {
        let label = Label::parse("ABABC").expect("label");
        assert_eq!(label.find_sub_label(&Label::parse("AB").expect("sub")), Some(0));
        assert_eq!(label.find_sub_label(&Label::parse("BC").expect("sub")), Some(3));
        assert_eq!(label.find_sub_label(&Label::parse("CA").expect("sub")), None);
        assert_eq!(label.find_sub_label(&Label::new()), Some(0));
    }

    #[test]
    fn equality_ignores_unused_capacity() {
        let mut a = Label::parse("AB").expect("label");
        a.add_nop(2);
        a.clear();
        a.add_nop(0);
        a.add_nop(1);
        assert_eq!(a, Label::parse("AB").expect("label"));
    }

    #[test]
    fn numeric_encodings_match_hand_computed_values() {
        let label = Label::from_nops(&[1, 2, 0]);
        assert_eq!(label.as_int(3), 9 + 6);
        assert_eq!(label.as_int_unique(3), (2 * 3 + 3) * 3 + 1);
        // 1 -> 1 (odd seen), 2 -> mirrored 0, 0 -> mirrored 2
        assert_eq!(label.as_int_grey_code(3), 9 + 2);
        assert_eq!(label.as_int_fib(), 1 + 2 * 2);
        let runs = Label::from_nops(&[1, 1, 2]);
        assert_eq!(runs.as_int_polynomial_coefficient(), 2 * 2 + 3 * 3);
        assert_eq!(Label::from_nops(&[0]).as_int_additive_polynomial(), 1);
    }
}
