use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_STACK_SIZE: usize = 10;
const DEFAULT_MAX_THREADS: usize = 12;
const DEFAULT_MIN_GENOME_LEN: usize = 8;
const DEFAULT_MAX_GENOME_LEN: usize = 2048;
const DEFAULT_OFFSPRING_SIZE_RANGE: f64 = 2.0;
const DEFAULT_MIN_EXE_LINES: f64 = 0.5;
const DEFAULT_MIN_COPIED_LINES: f64 = 0.5;
const DEFAULT_MAX_LABEL_EXE_SIZE: usize = 1;
const CLASSIC_REGISTERS: usize = 3;
const EXPERIMENTAL_REGISTERS: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuVariant {
    /// Three registers, heads-based copy loop, template jumps.
    #[default]
    Classic,
    /// Eight registers, `label` instructions, wait conditions and
    /// speculative execution.
    Experimental,
}

impl CpuVariant {
    pub fn default_registers(self) -> usize {
        match self {
            CpuVariant::Classic => CLASSIC_REGISTERS,
            CpuVariant::Experimental => EXPERIMENTAL_REGISTERS,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivideMethod {
    /// Parent state is reset after a successful divide.
    #[default]
    Split,
    /// Parent keeps running from where it was.
    Keep,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocMethod {
    /// New cells hold instruction 0.
    #[default]
    Default,
    /// New cells revive whatever the memory last held there.
    Necro,
    /// New cells get random instructions.
    Random,
}

/// Per-event probabilities. `copy_*` apply to each copied instruction,
/// `divide_*` once per divide, `div_mut` to every offspring site and
/// `point_mut` to every site when point mutations are requested.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationRates {
    pub copy_mut: f64,
    pub copy_ins: f64,
    pub copy_del: f64,
    pub copy_uniform: f64,
    pub copy_slip: f64,
    pub div_mut: f64,
    pub divide_mut: f64,
    pub divide_ins: f64,
    pub divide_del: f64,
    pub divide_uniform: f64,
    pub divide_slip: f64,
    pub divide_translocation: f64,
    pub point_mut: f64,
}

impl MutationRates {
    pub fn none() -> Self {
        Self::default()
    }

    fn rates(&self) -> [(&'static str, f64); 13] {
        [
            ("copy_mut", self.copy_mut),
            ("copy_ins", self.copy_ins),
            ("copy_del", self.copy_del),
            ("copy_uniform", self.copy_uniform),
            ("copy_slip", self.copy_slip),
            ("div_mut", self.div_mut),
            ("divide_mut", self.divide_mut),
            ("divide_ins", self.divide_ins),
            ("divide_del", self.divide_del),
            ("divide_uniform", self.divide_uniform),
            ("divide_slip", self.divide_slip),
            ("divide_translocation", self.divide_translocation),
            ("point_mut", self.point_mut),
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.rates().iter().all(|(_, rate)| *rate == 0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub variant: CpuVariant,
    /// Register count; `None` takes the variant's default.
    pub num_registers: Option<usize>,
    pub stack_size: usize,
    pub max_threads: usize,
    pub min_genome_len: usize,
    pub max_genome_len: usize,
    pub offspring_size_range: f64,
    pub min_exe_lines: f64,
    pub min_copied_lines: f64,
    /// Label nops beyond this length are read but not flagged executed.
    pub max_label_exe_size: usize,
    pub require_allocate: bool,
    pub alloc_method: AllocMethod,
    pub divide_method: DivideMethod,
    /// Instructions per gestation before the organism dies; 0 disables.
    pub max_executed: u64,
    /// Experimental `IO` refuses to output a value older than the last output.
    pub io_expire: bool,
    /// h-copy slip mutations move the read head instead of the memory.
    pub slip_read_head: bool,
    pub mutation: MutationRates,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            variant: CpuVariant::Classic,
            num_registers: None,
            stack_size: DEFAULT_STACK_SIZE,
            max_threads: DEFAULT_MAX_THREADS,
            min_genome_len: DEFAULT_MIN_GENOME_LEN,
            max_genome_len: DEFAULT_MAX_GENOME_LEN,
            offspring_size_range: DEFAULT_OFFSPRING_SIZE_RANGE,
            min_exe_lines: DEFAULT_MIN_EXE_LINES,
            min_copied_lines: DEFAULT_MIN_COPIED_LINES,
            max_label_exe_size: DEFAULT_MAX_LABEL_EXE_SIZE,
            require_allocate: true,
            alloc_method: AllocMethod::Default,
            divide_method: DivideMethod::Split,
            max_executed: 0,
            io_expire: false,
            slip_read_head: false,
            mutation: MutationRates::default(),
        }
    }
}

impl HardwareConfig {
    pub fn classic() -> Self {
        Self::default()
    }

    pub fn experimental() -> Self {
        Self {
            variant: CpuVariant::Experimental,
            ..Self::default()
        }
    }

    pub fn registers(&self) -> usize {
        self.num_registers
            .unwrap_or_else(|| self.variant.default_registers())
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config.normalized())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CoreError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings no organism could run under.
    pub fn validate(&self) -> Result<()> {
        if self.min_genome_len > self.max_genome_len {
            return Err(CoreError::InvalidConfig(format!(
                "min_genome_len {} exceeds max_genome_len {}",
                self.min_genome_len, self.max_genome_len
            )));
        }
        if self.offspring_size_range < 1.0 {
            return Err(CoreError::InvalidConfig(format!(
                "offspring_size_range {} must be at least 1.0",
                self.offspring_size_range
            )));
        }
        if let Some(regs) = self.num_registers {
            if !(3..=16).contains(&regs) {
                return Err(CoreError::InvalidConfig(format!(
                    "num_registers {regs} outside 3..=16"
                )));
            }
        }
        for (name, rate) in self.mutation.rates() {
            if !(0.0..=1.0).contains(&rate) {
                return Err(CoreError::InvalidConfig(format!(
                    "mutation rate {name} = {rate} is not a probability"
                )));
            }
        }
        Ok(())
    }

    /// Clamp values that are meaningless rather than invalid.
    pub fn normalized(self) -> Self {
        Self {
            stack_size: self.stack_size.max(1),
            max_threads: self.max_threads.clamp(1, crate::thread::ThreadIdChart::MAX_IDS),
            min_genome_len: self.min_genome_len.max(1),
            min_exe_lines: self.min_exe_lines.clamp(0.0, 1.0),
            min_copied_lines: self.min_copied_lines.clamp(0.0, 1.0),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_nonzero_rate_makes_mutation_live() {
        let mut rates = MutationRates::none();
        assert!(rates.is_zero());
        rates.divide_slip = 0.25;
        assert!(!rates.is_zero());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            HardwareConfig::from_json_str(r#"{"variant":"experimental","mutation":{"copy_mut":0.01}}"#)
                .expect("parse config");
        assert_eq!(config.variant, CpuVariant::Experimental);
        assert_eq!(config.registers(), 8);
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(config.mutation.copy_mut, 0.01);
        assert_eq!(config.mutation.divide_ins, 0.0);
    }

    #[test]
    fn invalid_rates_are_rejected() {
        let err = HardwareConfig::from_json_str(r#"{"mutation":{"div_mut":1.5}}"#)
            .expect_err("rate above one");
        assert!(err.to_string().contains("div_mut"), "{err}");
    }

    #[test]
    fn normalized_clamps_thread_limit() {
        let config = HardwareConfig {
            max_threads: 0,
            stack_size: 0,
            ..HardwareConfig::default()
        }
        .normalized();
        assert_eq!(config.max_threads, 1);
        assert_eq!(config.stack_size, 1);
    }
}
