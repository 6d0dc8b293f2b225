use super::*;
use crate::targets::Target;

use bytes::Buf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of program at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("unknown syscall id: {id}")]
    UnknownSyscall { id: u64 },
    #[error("unknown argument kind {kind} at offset {offset}")]
    UnknownArgKind { offset: usize, kind: u64 },
    #[error("unknown checksum kind: {0}")]
    UnknownCsumKind(u64),
    #[error("unknown checksum chunk kind: {0}")]
    UnknownChunkKind(u64),
    #[error("unsupported binary format {fmt} at offset {offset}")]
    BadBinaryFormat { offset: usize, fmt: u64 },
    #[error("bad argument size {size} at offset {offset}")]
    BadSize { offset: usize, size: u64 },
    #[error("{kind} argument can't be passed to call directly, offset {offset}")]
    BadCallArg { offset: usize, kind: &'static str },
    #[error("reference to unset result slot {index} at offset {offset}")]
    DanglingResult { offset: usize, index: u64 },
    #[error("copyout without call at offset {offset}")]
    CopyoutWithoutCall { offset: usize },
    #[error("too many result slots: {0}")]
    TooManyResults(u64),
}

/// Decode packed binary program, the target must be the one used for serialization.
pub fn deserialize(target: &Target, buf: &[u8]) -> Result<ExecProg, DecodeError> {
    let mut dec = Decoder {
        target,
        total: buf.len(),
        buf,
        num_vars: 0,
    };
    let mut calls = Vec::new();
    let mut call: Option<ExecCall> = None;
    let mut copyin = Vec::new();

    loop {
        let instr = dec.read_u64()?;
        match instr {
            EXEC_INSTR_EOF => break,
            EXEC_INSTR_COPY_IN => {
                if let Some(c) = call.take() {
                    calls.push(c);
                }
                let addr = dec.read_u64()?;
                let arg = dec.read_copyin_arg()?;
                copyin.push(ExecCopyin { addr, arg });
            }
            EXEC_INSTR_COPY_OUT => {
                let offset = dec.offset();
                let c = call
                    .as_mut()
                    .ok_or(DecodeError::CopyoutWithoutCall { offset })?;
                let index = dec.read_u64()?;
                let addr = dec.read_u64()?;
                let size = dec.read_size()?;
                dec.use_slot(index)?;
                c.copyout.push(ExecCopyout { index, addr, size });
            }
            id => {
                if let Some(c) = call.take() {
                    calls.push(c);
                }
                let meta = target
                    .syscall(id as usize)
                    .ok_or(DecodeError::UnknownSyscall { id })?;
                let mut c = ExecCall::new(meta);
                c.copyin = std::mem::take(&mut copyin);
                let index = dec.read_u64()?;
                let nargs = dec.read_u64()?;
                for _ in 0..nargs {
                    c.args.push(dec.read_call_arg()?);
                }
                if index != EXEC_NO_COPYOUT {
                    dec.use_slot(index)?;
                    c.index = Some(index);
                }
                call = Some(c);
            }
        }
    }
    if let Some(c) = call.take() {
        calls.push(c);
    }
    if !copyin.is_empty() {
        // copyin without call.
        return Err(DecodeError::UnexpectedEof {
            offset: dec.offset(),
        });
    }

    let mut p = ExecProg {
        calls,
        vars: vec![0; dec.num_vars as usize],
    };
    p.fill_defaults();
    Ok(p)
}

struct Decoder<'a, 'b> {
    target: &'a Target,
    buf: &'b [u8],
    total: usize,
    num_vars: u64,
}

impl Decoder<'_, '_> {
    fn read_call_arg(&mut self) -> Result<ExecArg, DecodeError> {
        let offset = self.offset();
        match self.read_copyin_arg()? {
            ExecCopyinArg::Const(arg) => Ok(ExecArg::Const(arg)),
            ExecCopyinArg::Result(arg) => Ok(ExecArg::Result(arg)),
            ExecCopyinArg::Data(_) => Err(DecodeError::BadCallArg {
                offset,
                kind: "data",
            }),
            ExecCopyinArg::Csum(_) => Err(DecodeError::BadCallArg {
                offset,
                kind: "checksum",
            }),
        }
    }

    fn read_copyin_arg(&mut self) -> Result<ExecCopyinArg, DecodeError> {
        let offset = self.offset();
        let kind = self.read_u64()?;
        let arg = match kind {
            EXEC_ARG_CONST => {
                let meta = self.read_u64()?;
                let value = self.read_u64()?;
                ExecCopyinArg::Const(ExecArgConst {
                    size: check_size(offset, meta & 0xff)?,
                    big_endian: self.bin_fmt(offset, (meta >> 8) & 0xff)?,
                    bf_off: (meta >> 16) & 0xff,
                    bf_len: (meta >> 24) & 0xff,
                    pid_stride: meta >> 32,
                    value,
                })
            }
            EXEC_ARG_RESULT => {
                let meta = self.read_u64()?;
                let size = check_size(offset, meta & 0xff)?;
                if self.bin_fmt(offset, (meta >> 8) & 0xff)? {
                    return Err(DecodeError::BadBinaryFormat {
                        offset,
                        fmt: BIN_FMT_BIG_ENDIAN,
                    });
                }
                let index = self.read_u64()?;
                if index >= self.num_vars {
                    return Err(DecodeError::DanglingResult { offset, index });
                }
                ExecCopyinArg::Result(ExecArgResult {
                    size,
                    index,
                    div_op: self.read_u64()?,
                    add_op: self.read_u64()?,
                    default: self.read_u64()?,
                })
            }
            EXEC_ARG_DATA => {
                let flags = self.read_u64()?;
                let len = (flags & !EXEC_ARG_DATA_READABLE) as usize;
                let padded = len.saturating_add(7) & !7;
                if self.buf.remaining() < padded {
                    return Err(DecodeError::UnexpectedEof {
                        offset: self.offset(),
                    });
                }
                let data = self.buf[..len].to_vec();
                self.buf.advance(padded);
                ExecCopyinArg::Data(ExecArgData {
                    data,
                    readable: flags & EXEC_ARG_DATA_READABLE != 0,
                })
            }
            EXEC_ARG_CSUM => {
                let size = self.read_u64()?;
                let kind = match self.read_u64()? {
                    EXEC_ARG_CSUM_INET => CsumKind::Inet,
                    k => return Err(DecodeError::UnknownCsumKind(k)),
                };
                let n = self.read_u64()?;
                let mut chunks = Vec::new();
                for _ in 0..n {
                    let kind = self.read_u64()?;
                    let value = self.read_u64()?;
                    let size = self.read_u64()?;
                    let chunk = match kind {
                        EXEC_ARG_CSUM_CHUNK_DATA => ExecCsumChunk::Data { addr: value, size },
                        EXEC_ARG_CSUM_CHUNK_CONST => ExecCsumChunk::Const {
                            value,
                            size: check_size(offset, size)?,
                        },
                        k => return Err(DecodeError::UnknownChunkKind(k)),
                    };
                    chunks.push(chunk);
                }
                ExecCopyinArg::Csum(ExecArgCsum { size, kind, chunks })
            }
            kind => return Err(DecodeError::UnknownArgKind { offset, kind }),
        };
        Ok(arg)
    }

    fn read_size(&mut self) -> Result<u64, DecodeError> {
        let offset = self.offset();
        let size = self.read_u64()?;
        check_size(offset, size)
    }

    /// Returns true for big endian.
    fn bin_fmt(&self, offset: usize, fmt: u64) -> Result<bool, DecodeError> {
        match fmt {
            BIN_FMT_NATIVE => Ok(false),
            BIN_FMT_BIG_ENDIAN => Ok(true),
            fmt => Err(DecodeError::BadBinaryFormat { offset, fmt }),
        }
    }

    fn use_slot(&mut self, index: u64) -> Result<(), DecodeError> {
        if index >= EXEC_MAX_COMMANDS {
            return Err(DecodeError::TooManyResults(index + 1));
        }
        self.num_vars = std::cmp::max(self.num_vars, index + 1);
        Ok(())
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        if self.buf.remaining() < 8 {
            return Err(DecodeError::UnexpectedEof {
                offset: self.offset(),
            });
        }
        if self.target.le_endian {
            Ok(self.buf.get_u64_le())
        } else {
            Ok(self.buf.get_u64())
        }
    }

    #[inline]
    fn offset(&self) -> usize {
        self.total - self.buf.remaining()
    }
}

fn check_size(offset: usize, size: u64) -> Result<u64, DecodeError> {
    match size {
        1 | 2 | 4 | 8 => Ok(size),
        _ => Err(DecodeError::BadSize { offset, size }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::dummy_target;

    fn sample_prog(target: &Target) -> ExecProg {
        let socket = target.syscall_of_name("socket$inet_tcp").unwrap();
        let mut c0 = ExecCall::new(socket);
        c0.args = vec![
            ExecArg::Const(ExecArgConst::new(8, 2)),
            ExecArg::Const(ExecArgConst::new(8, 1)),
            ExecArg::Const(ExecArgConst::new(8, 0)),
        ];
        c0.index = Some(0);

        let write = target.syscall_of_name("write").unwrap();
        let mut c1 = ExecCall::new(write);
        let mut port = ExecArgConst::new(2, 0x4e20);
        port.big_endian = true;
        port.pid_stride = 4;
        c1.copyin = vec![
            ExecCopyin {
                addr: 0x2000_0000,
                arg: ExecCopyinArg::Data(ExecArgData {
                    data: b"GET / HTTP/1.1\r\n\0".to_vec(),
                    readable: true,
                }),
            },
            ExecCopyin {
                addr: 0x2000_0040,
                arg: ExecCopyinArg::Const(port),
            },
            ExecCopyin {
                addr: 0x2000_0042,
                arg: ExecCopyinArg::Csum(ExecArgCsum {
                    size: 2,
                    kind: CsumKind::Inet,
                    chunks: vec![
                        ExecCsumChunk::Data {
                            addr: 0x2000_0000,
                            size: 17,
                        },
                        ExecCsumChunk::Const { value: 6, size: 4 },
                    ],
                }),
            },
        ];
        let mut fd = ExecArgResult::new(4, 0);
        fd.default = 0xffff_ffff;
        c1.args = vec![
            ExecArg::Result(fd),
            ExecArg::Const(ExecArgConst::new(8, 0x2000_0000)),
            ExecArg::Const(ExecArgConst::new(8, 17)),
        ];
        c1.copyout.push(ExecCopyout {
            index: 1,
            addr: 0x2000_0080,
            size: 4,
        });
        ExecProg::new(vec![c0, c1])
    }

    #[test]
    fn decode_serialized() {
        for (arch, le) in &[("amd64", true), ("s390x", false)] {
            let mut target = dummy_target(arch, 8);
            target.le_endian = *le;
            let p = sample_prog(&target);
            let mut buf = vec![0u8; EXEC_BUFFER_SIZE];
            let n = serialize(&target, &p, &mut buf).unwrap();
            let decoded = deserialize(&target, &buf[..n]).unwrap();
            assert_eq!(decoded, p);
            assert_eq!(decoded.vars, vec![0xffff_ffff, 0]);
        }
    }

    #[test]
    fn decode_truncated() {
        let target = dummy_target("amd64", 8);
        let p = sample_prog(&target);
        let mut buf = vec![0u8; EXEC_BUFFER_SIZE];
        let n = serialize(&target, &p, &mut buf).unwrap();
        let err = deserialize(&target, &buf[..n - 8]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { .. }));
        assert!(deserialize(&target, &buf[..3]).is_err());
    }

    #[test]
    fn decode_unknown_syscall() {
        let target = dummy_target("amd64", 8);
        let mut buf = Vec::new();
        buf.extend_from_slice(&4096u64.to_le_bytes());
        let err = deserialize(&target, &buf).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownSyscall { id: 4096 }));
    }

    #[test]
    fn decode_bad_arg() {
        let target = dummy_target("amd64", 8);
        let words: [u64; 7] = [1, EXEC_NO_COPYOUT, 1, EXEC_ARG_CONST, 3, 0, EXEC_INSTR_EOF];
        let buf = words
            .iter()
            .flat_map(|w| w.to_le_bytes().to_vec())
            .collect::<Vec<_>>();
        let err = deserialize(&target, &buf).unwrap_err();
        assert!(matches!(err, DecodeError::BadSize { size: 3, .. }));

        let words: [u64; 6] = [1, EXEC_NO_COPYOUT, 1, EXEC_ARG_RESULT, 4, 0];
        let buf = words
            .iter()
            .flat_map(|w| w.to_le_bytes().to_vec())
            .collect::<Vec<_>>();
        let err = deserialize(&target, &buf).unwrap_err();
        assert!(matches!(err, DecodeError::DanglingResult { index: 0, .. }));
    }

    #[test]
    fn decode_empty_prog() {
        let target = dummy_target("amd64", 8);
        let p = deserialize(&target, &EXEC_INSTR_EOF.to_le_bytes()).unwrap();
        assert!(p.is_empty());
        assert!(p.vars.is_empty());
    }
}
