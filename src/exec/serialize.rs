use super::*;
use crate::targets::Target;

use bytes::BufMut;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("buffer two small to serialize the prog, provided size: {provided} bytes")]
    BufferTooSmall { provided: usize },
    #[error("too many result slots: {0}")]
    TooManyResults(usize),
}

/// Serialize a prog into packed binary format, returns number of bytes written.
pub fn serialize(target: &Target, p: &ExecProg, buf: &mut [u8]) -> Result<usize, SerializeError> {
    if p.vars.len() as u64 > EXEC_MAX_COMMANDS {
        return Err(SerializeError::TooManyResults(p.vars.len()));
    }
    let provided = buf.len();
    let mut ctx = ExecCtx {
        le_endian: target.le_endian,
        buf,
        eof: false,
    };

    for call in &p.calls {
        ctx.serialize_call(call);
    }
    ctx.write_u64(EXEC_INSTR_EOF);

    if ctx.eof {
        Err(SerializeError::BufferTooSmall { provided })
    } else {
        Ok(provided - ctx.buf.remaining_mut())
    }
}

struct ExecCtx<'a> {
    le_endian: bool,
    buf: &'a mut [u8],
    eof: bool,
}

impl ExecCtx<'_> {
    fn serialize_call(&mut self, c: &ExecCall) {
        for copyin in &c.copyin {
            self.write_u64(EXEC_INSTR_COPY_IN);
            self.write_u64(copyin.addr);
            self.write_copyin_arg(&copyin.arg);
        }
        self.write_u64(c.sid as u64);
        self.write_u64(c.index.unwrap_or(EXEC_NO_COPYOUT));
        self.write_u64(c.args.len() as u64);
        for arg in &c.args {
            match arg {
                ExecArg::Const(arg) => self.write_const_arg(arg),
                ExecArg::Result(arg) => self.write_result_arg(arg),
            }
        }
        for copyout in &c.copyout {
            self.write_u64(EXEC_INSTR_COPY_OUT);
            self.write_u64(copyout.index);
            self.write_u64(copyout.addr);
            self.write_u64(copyout.size);
        }
    }

    fn write_copyin_arg(&mut self, arg: &ExecCopyinArg) {
        match arg {
            ExecCopyinArg::Const(arg) => self.write_const_arg(arg),
            ExecCopyinArg::Result(arg) => self.write_result_arg(arg),
            ExecCopyinArg::Data(arg) => {
                self.write_u64(EXEC_ARG_DATA);
                let mut flags = arg.data.len() as u64;
                if arg.readable {
                    flags |= EXEC_ARG_DATA_READABLE;
                }
                self.write_u64(flags);
                self.write_slice(&arg.data);
                let pad = 8 - arg.data.len() % 8;
                if pad != 8 {
                    static PAD: [u8; 8] = [0; 8];
                    self.write_slice(&PAD[0..pad]);
                }
            }
            ExecCopyinArg::Csum(arg) => {
                self.write_u64(EXEC_ARG_CSUM);
                self.write_u64(arg.size);
                match arg.kind {
                    CsumKind::Inet => self.write_u64(EXEC_ARG_CSUM_INET),
                }
                self.write_u64(arg.chunks.len() as u64);
                for chunk in &arg.chunks {
                    let (kind, value, size) = match *chunk {
                        ExecCsumChunk::Data { addr, size } => (EXEC_ARG_CSUM_CHUNK_DATA, addr, size),
                        ExecCsumChunk::Const { value, size } => {
                            (EXEC_ARG_CSUM_CHUNK_CONST, value, size)
                        }
                    };
                    self.write_u64(kind);
                    self.write_u64(value);
                    self.write_u64(size);
                }
            }
        }
    }

    fn write_const_arg(&mut self, arg: &ExecArgConst) {
        self.write_u64(EXEC_ARG_CONST);
        let meta = arg.size
            | bin_fmt(arg.big_endian) << 8
            | arg.bf_off << 16
            | arg.bf_len << 24
            | arg.pid_stride << 32;
        self.write_u64(meta);
        self.write_u64(arg.value);
    }

    fn write_result_arg(&mut self, arg: &ExecArgResult) {
        self.write_u64(EXEC_ARG_RESULT);
        self.write_u64(arg.size | BIN_FMT_NATIVE << 8);
        self.write_u64(arg.index);
        self.write_u64(arg.div_op);
        self.write_u64(arg.add_op);
        self.write_u64(arg.default);
    }

    fn write_u64(&mut self, val: u64) {
        if self.buf.len() >= 8 {
            if self.le_endian {
                self.buf.put_u64_le(val);
            } else {
                self.buf.put_u64(val);
            }
        } else {
            self.eof = true;
        }
    }

    fn write_slice<T: AsRef<[u8]>>(&mut self, slice: T) {
        if self.buf.len() >= slice.as_ref().len() {
            self.buf.put_slice(slice.as_ref());
        } else {
            self.eof = true;
        }
    }
}

#[inline]
fn bin_fmt(big_endian: bool) -> u64 {
    if big_endian {
        BIN_FMT_BIG_ENDIAN
    } else {
        BIN_FMT_NATIVE
    }
}
