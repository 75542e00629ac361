//! Instructions and the genome text format.
//!
//! A genome is written one symbol per instruction: `a-z`, `A-Z`, `0-9` cover
//! opcodes 0..62, and opcodes 62..=254 take a one-character prefix
//! (`+`, `-`, `~`, `?`) selecting the block of 62. Opcode 255 is `_`.

use crate::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const SYMBOLS: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const PREFIXES: [char; 4] = ['+', '-', '~', '?'];
const BLOCK: usize = SYMBOLS.len();

/// Opcode reserved for "no instruction" (past the end of memory, bad symbol).
pub const ERROR_OP: u8 = 255;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instruction(u8);

impl Instruction {
    pub const ERROR: Instruction = Instruction(ERROR_OP);

    pub const fn new(op: u8) -> Self {
        Self(op)
    }

    pub const fn op(self) -> u8 {
        self.0
    }

    pub fn is_error(self) -> bool {
        self.0 == ERROR_OP
    }

    pub fn write_symbol(self, out: &mut String) {
        if self.0 == ERROR_OP {
            out.push('_');
            return;
        }
        let op = self.0 as usize;
        let block = op / BLOCK;
        if block > 0 {
            out.push(PREFIXES[block - 1]);
        }
        out.push(SYMBOLS[op % BLOCK] as char);
    }

    pub fn symbol(self) -> String {
        let mut out = String::with_capacity(2);
        self.write_symbol(&mut out);
        out
    }

    fn symbol_index(c: char) -> Option<usize> {
        match c {
            'a'..='z' => Some(c as usize - 'a' as usize),
            'A'..='Z' => Some(c as usize - 'A' as usize + 26),
            '0'..='9' => Some(c as usize - '0' as usize + 52),
            _ => None,
        }
    }

    /// Decode one symbol with an optional prefix. Returns `None` for symbols
    /// that do not name an opcode.
    pub fn from_symbol(prefix: Option<char>, c: char) -> Option<Self> {
        if prefix.is_none() && c == '_' {
            return Some(Self::ERROR);
        }
        let index = Self::symbol_index(c)?;
        let block = match prefix {
            None => 0,
            Some(p) => PREFIXES.iter().position(|&x| x == p)? + 1,
        };
        let op = block * BLOCK + index;
        if op >= ERROR_OP as usize {
            return None;
        }
        Some(Self(op as u8))
    }
}

impl From<u8> for Instruction {
    fn from(op: u8) -> Self {
        Self(op)
    }
}

/// An organism's genome: the instruction sequence it was born with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Genome {
    insts: Vec<Instruction>,
}

impl Genome {
    pub fn new(insts: Vec<Instruction>) -> Self {
        Self { insts }
    }

    pub fn from_ops(ops: &[u8]) -> Self {
        Self {
            insts: ops.iter().copied().map(Instruction::new).collect(),
        }
    }

    /// Parse symbol text, skipping characters that are not valid symbols.
    pub fn parse_lossy(text: &str) -> Self {
        let mut insts = Vec::with_capacity(text.len());
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            let decoded = if PREFIXES.contains(&c) {
                chars.next().and_then(|next| Instruction::from_symbol(Some(c), next))
            } else {
                Instruction::from_symbol(None, c)
            };
            if let Some(inst) = decoded {
                insts.push(inst);
            }
        }
        Self { insts }
    }

    /// Parse symbol text, rejecting anything that is not a symbol. Whitespace
    /// is ignored so genomes can be wrapped across lines.
    pub fn parse(text: &str) -> Result<Self> {
        let mut insts = Vec::with_capacity(text.len());
        let mut chars = text.chars().filter(|c| !c.is_whitespace()).enumerate();
        while let Some((idx, c)) = chars.next() {
            let decoded = if PREFIXES.contains(&c) {
                match chars.next() {
                    Some((_, next)) => Instruction::from_symbol(Some(c), next),
                    None => None,
                }
            } else {
                Instruction::from_symbol(None, c)
            };
            match decoded {
                Some(inst) => insts.push(inst),
                None => {
                    return Err(CoreError::InvalidGenome(format!(
                        "bad symbol '{c}' at offset {idx}"
                    )))
                }
            }
        }
        Ok(Self { insts })
    }

    /// Read the `'A' + opcode` form used by older genome dumps.
    pub fn from_upper_ascii(text: &str) -> Result<Self> {
        text.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| {
                if c.is_ascii_uppercase() {
                    Ok(Instruction::new(c as u8 - b'A'))
                } else {
                    Err(CoreError::InvalidGenome(format!(
                        "'{c}' is not in the A..Z opcode alphabet"
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Write the `'A' + opcode` form; `None` if an opcode is 26 or above.
    pub fn to_upper_ascii(&self) -> Option<String> {
        self.insts
            .iter()
            .map(|inst| (inst.op() < 26).then(|| (b'A' + inst.op()) as char))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.insts
    }

    pub fn iter(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.insts.iter().copied()
    }

    pub fn into_inner(self) -> Vec<Instruction> {
        self.insts
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(self.insts.len());
        for inst in &self.insts {
            inst.write_symbol(&mut out);
        }
        f.write_str(&out)
    }
}

impl FromIterator<Instruction> for Genome {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Serialize for Genome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Genome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Genome::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_round_trips_through_its_symbol() {
        let ops: Vec<u8> = (0..=255).collect();
        let genome = Genome::from_ops(&ops);
        let text = genome.to_string();
        assert_eq!(Genome::parse(&text).expect("parse"), genome);
    }

    #[test]
    fn prefixed_symbols_decode_as_one_instruction() {
        let genome = Genome::parse("a+a-b~c?a_").expect("parse");
        let ops: Vec<u8> = genome.iter().map(Instruction::op).collect();
        assert_eq!(ops, vec![0, 62, 125, 188, 248, 255]);
    }

    #[test]
    fn lossy_parse_skips_unknown_characters() {
        let genome = Genome::parse_lossy("a*b#c");
        assert_eq!(genome.to_string(), "abc");
        assert!(Genome::parse("a*b").is_err());
    }

    #[test]
    fn upper_ascii_form_is_offset_from_capital_a() {
        let genome = Genome::from_upper_ascii("ABZ").expect("parse");
        assert_eq!(genome, Genome::from_ops(&[0, 1, 25]));
        assert_eq!(genome.to_upper_ascii().as_deref(), Some("ABZ"));
        assert!(Genome::from_ops(&[26]).to_upper_ascii().is_none());
    }

    #[test]
    fn genome_serializes_as_symbol_string() {
        let genome = Genome::parse("wzcag").expect("parse");
        let json = serde_json::to_string(&genome).expect("serialize");
        assert_eq!(json, "\"wzcag\"");
        let back: Genome = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, genome);
    }
}
