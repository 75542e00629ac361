//! Per-instruction execution traces.

use crate::{CoreError, Result};
use serde::Serialize;
use std::io::Write;

/// Snapshot of the executing thread around one instruction.
#[derive(Clone, Debug, Serialize)]
pub struct TraceRecord {
    pub cycle: u64,
    pub thread: usize,
    pub ip: i32,
    pub opcode: u8,
    pub name: String,
    pub regs: Vec<i32>,
    pub heads: [i32; 4],
    pub stack_top: i32,
    pub memory_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Receiver for trace records. The core only builds records when
/// [`TraceSink::enabled`] is true, so [`NullTrace`] costs nothing.
pub trait TraceSink {
    fn enabled(&self) -> bool {
        false
    }
    fn pre_execute(&mut self, _record: &TraceRecord) {}
    fn post_execute(&mut self, _record: &TraceRecord) {}
}

#[derive(Default)]
pub struct NullTrace;

impl TraceSink for NullTrace {}

/// Writes one JSON object per executed instruction.
pub struct JsonTrace<W: Write> {
    out: W,
    records: u64,
    error: Option<std::io::Error>,
}

impl<W: Write> JsonTrace<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            records: 0,
            error: None,
        }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush and hand back the writer, surfacing the first write error.
    pub fn finish(mut self) -> Result<W> {
        if let Some(err) = self.error.take() {
            return Err(CoreError::Io(err));
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> TraceSink for JsonTrace<W> {
    fn enabled(&self) -> bool {
        self.error.is_none()
    }

    fn post_execute(&mut self, record: &TraceRecord) {
        let written = serde_json::to_writer(&mut self.out, record)
            .map_err(std::io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"));
        match written {
            Ok(()) => self.records += 1,
            Err(err) => self.error = Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TraceRecord {
        TraceRecord {
            cycle: 3,
            thread: 0,
            ip: 7,
            opcode: 21,
            name: "h-copy".to_string(),
            regs: vec![1, 2, 3],
            heads: [7, 0, 100, 92],
            stack_top: 0,
            memory_len: 300,
            success: Some(true),
        }
    }

    #[test]
    fn json_trace_writes_one_line_per_record() {
        let mut trace = JsonTrace::new(Vec::new());
        trace.post_execute(&record());
        trace.post_execute(&record());
        assert_eq!(trace.records(), 2);
        let bytes = trace.finish().expect("finish");
        let text = String::from_utf8(bytes).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(value["name"], "h-copy");
        assert_eq!(value["heads"][2], 100);
    }

    #[test]
    fn null_trace_is_disabled() {
        assert!(!NullTrace.enabled());
    }
}
