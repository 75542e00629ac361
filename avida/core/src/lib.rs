//! Virtual CPU for self-replicating digital organisms.
//!
//! Each organism owns a [`HardwareCore`]: a circular instruction memory, a set
//! of cooperative threads driven by heads, and the allocate/copy/divide
//! protocol that produces offspring genomes. Scheduling across organisms,
//! the environment and genotype bookkeeping are supplied by the caller
//! through [`OrganismContext`].

use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod context;
pub mod divide;
pub mod hardware;
pub mod head;
pub mod inst;
pub mod inst_lib;
pub mod label;
pub mod memory;
pub mod mutation;
pub mod register;
pub mod stack;
pub mod thread;
pub mod trace;

pub use config::{AllocMethod, CpuVariant, DivideMethod, HardwareConfig, MutationRates};
pub use context::{OrganismContext, SimpleContext};
pub use divide::{DivideLimits, DivideReject};
pub use hardware::HardwareCore;
pub use head::{Head, HeadId, NUM_HEADS};
pub use inst::{Genome, Instruction};
pub use inst_lib::{InstEntry, InstKind, InstSet, InstSpec, SearchFrom, DEFAULT_ANCESTOR};
pub use label::{Label, MAX_LABEL_SIZE};
pub use memory::{InstFlag, InstFlags, InstMemory};
pub use mutation::MutationEvent;
pub use register::{DataValue, RegisterFile, REG_AX, REG_BX, REG_CX, REG_DX};
pub use stack::CpuStack;
pub use thread::{CpuThread, ThreadIdChart, WaitCondition, WaitState};
pub use trace::{JsonTrace, NullTrace, TraceRecord, TraceSink};

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unknown instruction '{0}'")]
    UnknownInstruction(String),
    #[error("invalid genome: {0}")]
    InvalidGenome(String),
    #[error("invalid label: {0}")]
    InvalidLabel(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Other(String),
}
