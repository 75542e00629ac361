//! Register cells with value provenance.

use serde::{Deserialize, Serialize};

pub const REG_AX: usize = 0;
pub const REG_BX: usize = 1;
pub const REG_CX: usize = 2;
pub const REG_DX: usize = 3;

/// A register or stack value plus the bookkeeping used to age values:
/// the cycle it was written, whether it came straight from the environment,
/// and the oldest cycle among the values it was computed from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataValue {
    pub value: i32,
    pub originated: u64,
    pub from_env: bool,
    pub env_component: bool,
    pub oldest_component: u64,
}

impl DataValue {
    pub fn plain(value: i32) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn fresh(value: i32, cycle: u64, from_env: bool) -> Self {
        Self {
            value,
            originated: cycle,
            from_env,
            env_component: from_env,
            oldest_component: cycle,
        }
    }

    /// Result of a unary operation on `src`.
    pub fn derived(value: i32, cycle: u64, src: &DataValue) -> Self {
        Self {
            value,
            originated: cycle,
            from_env: false,
            env_component: src.env_component,
            oldest_component: src.oldest_component,
        }
    }

    /// Result of a binary operation: the older component wins.
    pub fn combined(value: i32, cycle: u64, a: &DataValue, b: &DataValue) -> Self {
        Self {
            value,
            originated: cycle,
            from_env: false,
            env_component: a.env_component || b.env_component,
            oldest_component: a.oldest_component.min(b.oldest_component),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    cells: Vec<DataValue>,
}

impl RegisterFile {
    pub fn new(count: usize) -> Self {
        Self {
            cells: vec![DataValue::default(); count],
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, reg: usize) -> &DataValue {
        &self.cells[reg]
    }

    pub fn value(&self, reg: usize) -> i32 {
        self.cells[reg].value
    }

    pub fn set(&mut self, reg: usize, value: DataValue) {
        self.cells[reg] = value;
    }

    pub fn values(&self) -> Vec<i32> {
        self.cells.iter().map(|cell| cell.value).collect()
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = DataValue::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_keeps_oldest_component_and_env_taint() {
        let env = DataValue::fresh(7, 3, true);
        let local = DataValue::fresh(2, 9, false);
        let sum = DataValue::combined(9, 12, &env, &local);
        assert_eq!(sum.originated, 12);
        assert_eq!(sum.oldest_component, 3);
        assert!(sum.env_component);
        assert!(!sum.from_env);
    }

    #[test]
    fn derived_inherits_source_age() {
        let src = DataValue::fresh(4, 5, false);
        let shifted = DataValue::derived(8, 6, &src);
        assert_eq!(shifted.oldest_component, 5);
        assert_eq!(shifted.originated, 6);
    }
}
