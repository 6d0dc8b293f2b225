//! Emitting c statements for decoded calls.
use super::fmt::{c_string, call_arg, const_arg, result_arg};
use super::options::Options;
use super::stmt::Block;
use crate::exec::{
    CsumKind, ExecArgCsum, ExecCall, ExecCopyin, ExecCopyinArg, ExecCsumChunk, ExecProg,
};
use crate::targets::Target;

use rustc_hash::FxHashSet;
use std::fmt::Write;

lazy_static! {
    /// Pseudo syscalls that only work with tun device set up.
    static ref TUN_CALLS: FxHashSet<&'static str> = fxhashset! {
        "syz_emit_ethernet",
        "syz_extract_tcp_res",
    };
}

pub(crate) struct CallEmitter<'a> {
    target: &'a Target,
    opts: &'a Options,
    /// Sequence number of checksum accumulators, unique in one program.
    csum_seq: usize,
}

impl<'a> CallEmitter<'a> {
    pub(crate) fn new(target: &'a Target, opts: &'a Options) -> Self {
        Self {
            target,
            opts,
            csum_seq: 0,
        }
    }

    /// Emit one block per call, in the order of calls.
    pub(crate) fn emit_prog(&mut self, p: &ExecProg) -> Vec<Block> {
        self.csum_seq = 0;
        p.calls
            .iter()
            .enumerate()
            .map(|(i, call)| self.emit_call(i, call))
            .collect()
    }

    fn emit_call(&mut self, call_index: usize, call: &ExecCall) -> Block {
        let mut b = Block::new();
        for copyin in &call.copyin {
            self.emit_copyin(&mut b, copyin);
        }

        if self.opts.is_fault_call(call_index) {
            b.plain(
                1,
                "write_file(\"/sys/kernel/debug/failslab/ignore-gfp-wait\", \"N\");",
            );
            b.plain(
                1,
                "write_file(\"/sys/kernel/debug/fail_futex/ignore-private\", \"N\");",
            );
            b.plain(1, format!("inject_fault({});", self.opts.fault_nth));
        }

        let res_copyout = call.index.is_some();
        let arg_copyout = !call.copyout.is_empty();
        let emit_call = self.opts.enable_tun || !TUN_CALLS.contains(&*call.call_name);
        if !emit_call {
            log::warn!("{} needs tun device, call suppressed", call.call_name);
            return b;
        }
        b.plain(1, self.invocation(call, res_copyout || arg_copyout));

        if res_copyout || arg_copyout {
            let multiple = call.copyout.len() > 1 || res_copyout && arg_copyout;
            if multiple {
                b.plain(1, "if (res != -1) {");
            } else {
                b.plain(1, "if (res != -1)");
            }
            if let Some(idx) = call.index {
                b.plain(2, format!("r[{}] = res;", idx));
            }
            for copyout in &call.copyout {
                b.guarded(
                    2,
                    format!(
                        "r[{}] = *(uint{}_t*)0x{:x}",
                        copyout.index,
                        copyout.size * 8,
                        copyout.addr
                    ),
                );
            }
            if multiple {
                b.plain(1, "}");
            }
        }
        b
    }

    /// Native syscalls go through `syscall` with a leading number, pseudo syscalls
    /// are called by name.
    fn invocation(&self, call: &ExecCall, assign_res: bool) -> String {
        let mut s = String::new();
        if assign_res {
            s.push_str("res = ");
        }
        let native = !call.is_pseudo();
        if native {
            write!(s, "syscall({}{}", self.target.syscall_prefix, call.call_name).unwrap();
        } else {
            write!(s, "{}(", call.call_name).unwrap();
        }
        for (i, arg) in call.args.iter().enumerate() {
            if native || i > 0 {
                s.push_str(", ");
            }
            s.push_str(&call_arg(arg, self.opts.procs));
        }
        s.push_str(");");
        s
    }

    fn emit_copyin(&mut self, b: &mut Block, copyin: &ExecCopyin) {
        let addr = copyin.addr;
        match &copyin.arg {
            ExecCopyinArg::Const(arg) => {
                let val = const_arg(arg, self.opts.procs);
                if arg.is_bitfield() {
                    b.guarded(
                        1,
                        format!(
                            "STORE_BY_BITMASK(uint{}_t, 0x{:x}, {}, {}, {})",
                            arg.size * 8,
                            addr,
                            val,
                            arg.bf_off,
                            arg.bf_len
                        ),
                    );
                } else {
                    b.guarded(1, format!("*(uint{}_t*)0x{:x} = {}", arg.size * 8, addr, val));
                }
            }
            ExecCopyinArg::Result(arg) => {
                b.guarded(
                    1,
                    format!(
                        "*(uint{}_t*)0x{:x} = {}",
                        arg.size * 8,
                        addr,
                        result_arg(arg)
                    ),
                );
            }
            ExecCopyinArg::Data(arg) => {
                b.guarded(
                    1,
                    format!(
                        "memcpy((void*)0x{:x}, \"{}\", {})",
                        addr,
                        c_string(&arg.data),
                        arg.data.len()
                    ),
                );
            }
            ExecCopyinArg::Csum(arg) => self.emit_csum(b, addr, arg),
        }
    }

    fn emit_csum(&mut self, b: &mut Block, addr: u64, arg: &ExecArgCsum) {
        match arg.kind {
            CsumKind::Inet => {
                self.csum_seq += 1;
                let seq = self.csum_seq;
                b.plain(1, format!("struct csum_inet csum_{};", seq));
                b.plain(1, format!("csum_inet_init(&csum_{});", seq));
                for (i, chunk) in arg.chunks.iter().enumerate() {
                    match *chunk {
                        ExecCsumChunk::Data { addr, size } => b.guarded(
                            1,
                            format!(
                                "csum_inet_update(&csum_{}, (const uint8_t*)0x{:x}, {})",
                                seq, addr, size
                            ),
                        ),
                        ExecCsumChunk::Const { value, size } => {
                            b.plain(
                                1,
                                format!(
                                    "uint{}_t csum_{}_chunk_{} = 0x{:x};",
                                    size * 8,
                                    seq,
                                    i,
                                    value
                                ),
                            );
                            b.plain(
                                1,
                                format!(
                                    "csum_inet_update(&csum_{}, (const uint8_t*)&csum_{}_chunk_{}, {});",
                                    seq, seq, i, size
                                ),
                            );
                        }
                    }
                }
                b.guarded(
                    1,
                    format!(
                        "*(uint16_t*)0x{:x} = csum_inet_digest(&csum_{})",
                        addr, seq
                    ),
                );
            }
        }
    }
}
