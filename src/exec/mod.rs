//! Per-call instruction list of a program in executor encoding.
//!
//! A program is serialized into a compact sequence of u64 words ([serialize]),
//! which is what syz-executor runs, and decoded back ([deserialize]) into
//! `ExecProg`, the form c source generation works on.
use crate::targets::{SId, Syscall, Target};

use iota::iota;

/// Decoding of executor encoding.
pub mod deserialize;
/// Prog Serialization.
pub mod serialize;

pub use deserialize::{deserialize, DecodeError};
pub use serialize::{serialize, SerializeError};

iota! {
    const EXEC_INSTR_EOF : u64 = (u64::MAX) ^ (iota);
        , EXEC_INSTR_COPY_IN
        , EXEC_INSTR_COPY_OUT
}

iota! {
    const EXEC_ARG_CONST: u64 = iota;
        , EXEC_ARG_RESULT
        , EXEC_ARG_DATA
        , EXEC_ARG_CSUM
}

const EXEC_ARG_DATA_READABLE: u64 = 1 << 63;

iota! {
    const EXEC_ARG_CSUM_INET: u64 = iota;
}

iota! {
    const EXEC_ARG_CSUM_CHUNK_DATA: u64 = iota;
        , EXEC_ARG_CSUM_CHUNK_CONST
}

iota! {
    const BIN_FMT_NATIVE: u64 = iota;
        , BIN_FMT_BIG_ENDIAN
}

const EXEC_NO_COPYOUT: u64 = u64::MAX;
/// Max number of result slots one program can use.
pub const EXEC_MAX_COMMANDS: u64 = 1000;
/// Size of buffer used for serializing one program.
pub const EXEC_BUFFER_SIZE: usize = 2 << 20;

/// Abstract program that can be written in executor encoding.
pub trait ExecSerialize {
    /// Serialize self into `buf`, returns number of bytes written.
    fn serialize_for_exec(&self, target: &Target, buf: &mut [u8]) -> Result<usize, SerializeError>;
}

/// Decoded program, calls and initial value of the result table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecProg {
    pub calls: Vec<ExecCall>,
    /// Default value of each result slot, len is the size of result table.
    pub vars: Vec<u64>,
}

impl ExecProg {
    /// Build prog from calls, the result table is sized by the highest used index.
    pub fn new(calls: Vec<ExecCall>) -> Self {
        let mut vars = Vec::new();
        for call in &calls {
            let slots = call
                .index
                .iter()
                .copied()
                .chain(call.copyout.iter().map(|c| c.index));
            for idx in slots {
                if idx as usize >= vars.len() {
                    vars.resize(idx as usize + 1, 0);
                }
            }
        }
        let mut p = Self { calls, vars };
        p.fill_defaults();
        p
    }

    /// Record the default value carried by result references into result table.
    pub(crate) fn fill_defaults(&mut self) {
        let vars = &mut self.vars;
        let mut record = |r: &ExecArgResult| {
            if let Some(v) = vars.get_mut(r.index as usize) {
                *v = r.default;
            }
        };
        for call in &self.calls {
            for copyin in &call.copyin {
                if let ExecCopyinArg::Result(r) = &copyin.arg {
                    record(r);
                }
            }
            for arg in &call.args {
                if let ExecArg::Result(r) = arg {
                    record(r);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl ExecSerialize for ExecProg {
    fn serialize_for_exec(&self, target: &Target, buf: &mut [u8]) -> Result<usize, SerializeError> {
        serialize(target, self, buf)
    }
}

/// One call, with resolved memory operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub sid: SId,
    /// Syscall number, 0 for pseudo syscalls.
    pub nr: u64,
    /// Name of the underlying syscall or pseudo syscall.
    pub call_name: Box<str>,
    /// Memory writes before the call, executed in order.
    pub copyin: Vec<ExecCopyin>,
    pub args: Vec<ExecArg>,
    /// Result slot of the return value.
    pub index: Option<u64>,
    /// Memory reads after a successful call.
    pub copyout: Vec<ExecCopyout>,
}

impl ExecCall {
    pub fn new(meta: &Syscall) -> Self {
        Self {
            sid: meta.id,
            nr: meta.nr,
            call_name: Box::clone(&meta.call_name),
            copyin: Vec::new(),
            args: Vec::new(),
            index: None,
            copyout: Vec::new(),
        }
    }

    pub fn is_pseudo(&self) -> bool {
        crate::targets::is_pseudo(&self.call_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCopyin {
    pub addr: u64,
    pub arg: ExecCopyinArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecCopyout {
    /// Result slot to store the value to.
    pub index: u64,
    pub addr: u64,
    pub size: u64,
}

/// Direct argument of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecArg {
    Const(ExecArgConst),
    Result(ExecArgResult),
}

/// Value written to memory before a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecCopyinArg {
    Const(ExecArgConst),
    Result(ExecArgResult),
    Data(ExecArgData),
    Csum(ExecArgCsum),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecArgConst {
    /// Size in bytes, unit size for bitfields.
    pub size: u64,
    pub value: u64,
    pub bf_off: u64,
    pub bf_len: u64,
    /// Added `procid * pid_stride` in multi-process mode.
    pub pid_stride: u64,
    pub big_endian: bool,
}

impl ExecArgConst {
    pub fn new(size: u64, value: u64) -> Self {
        Self {
            size,
            value,
            bf_off: 0,
            bf_len: 0,
            pid_stride: 0,
            big_endian: false,
        }
    }

    #[inline]
    pub fn is_bitfield(&self) -> bool {
        self.bf_off != 0 || self.bf_len != 0
    }
}

/// Reference to a result slot, `r[index] / div_op + add_op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecArgResult {
    pub size: u64,
    pub index: u64,
    pub div_op: u64,
    pub add_op: u64,
    /// Value used if the producer call failed.
    pub default: u64,
}

impl ExecArgResult {
    pub fn new(size: u64, index: u64) -> Self {
        Self {
            size,
            index,
            div_op: 0,
            add_op: 0,
            default: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecArgData {
    pub data: Vec<u8>,
    pub readable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsumKind {
    /// 16-bit internet checksum, rfc 1071.
    Inet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecArgCsum {
    pub size: u64,
    pub kind: CsumKind,
    pub chunks: Vec<ExecCsumChunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecCsumChunk {
    /// Memory region `[addr, addr + size)`.
    Data { addr: u64, size: u64 },
    /// Constant value of `size` bytes.
    Const { value: u64, size: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::dummy_target;

    #[test]
    fn result_table_sized_by_highest_index() {
        let target = dummy_target("amd64", 8);
        let mut open = ExecCall::new(target.syscall_of_name("open").unwrap());
        open.index = Some(0);
        let mut pipe = ExecCall::new(target.syscall_of_name("read").unwrap());
        pipe.copyout.push(ExecCopyout {
            index: 3,
            addr: 0x2000_0000,
            size: 4,
        });
        let mut close = ExecCall::new(target.syscall_of_name("close").unwrap());
        let mut fd = ExecArgResult::new(4, 3);
        fd.default = 0xffff_ffff;
        close.args.push(ExecArg::Result(fd));

        let p = ExecProg::new(vec![open, pipe, close]);
        assert_eq!(p.vars, vec![0, 0, 0, 0xffff_ffff]);
        assert!(ExecProg::new(Vec::new()).vars.is_empty());
    }
}
