//! Generate standalone c reproducer of a program.
//!
//! The program is first written in executor encoding and decoded back, so that generated
//! source performs exactly what the executor would perform. Each decoded call becomes a
//! block of tagged statements, the blocks are placed in a dispatch function and a `main`
//! whose shape follows [Options], then everything is rendered and cleaned up.
use crate::exec::{
    deserialize, DecodeError, ExecProg, ExecSerialize, SerializeError, EXEC_BUFFER_SIZE,
};
use crate::targets::Target;

use std::fmt::Write;
use thiserror::Error;

mod calls;
mod defines;
mod fmt;
mod header;
pub mod options;
mod post;
mod skeleton;
mod stmt;

pub use options::{Options, OptionsError, Sandbox};

use calls::CallEmitter;
use stmt::Block;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] OptionsError),
    #[error("failed to serialize {prog} prog: {source}")]
    Serialize {
        prog: &'static str,
        source: SerializeError,
    },
    #[error("failed to decode {prog} prog: {source}")]
    Decode {
        prog: &'static str,
        source: DecodeError,
    },
}

/// Generate c source of `p` with default preamble, which includes the runtime header
/// `common_<os>.h` of the target.
pub fn write<P: ExecSerialize + ?Sized>(
    target: &Target,
    p: &P,
    opts: &Options,
) -> Result<String, Error> {
    write_with_header(target, p, opts, &header::common_header(target, opts))
}

/// Generate c source of `p`, with `common` as the shared preamble.
pub fn write_with_header<P: ExecSerialize + ?Sized>(
    target: &Target,
    p: &P,
    opts: &Options,
    common: &str,
) -> Result<String, Error> {
    opts.check()?;

    let mut buf = vec![0; EXEC_BUFFER_SIZE];
    let prog = decode(target, p, &mut buf, "main")?;
    let mmap = if let Some(mmap) = target.mmap_prog() {
        decode(target, &mmap, &mut buf, "mmap")?
    } else {
        log::warn!("no mmap call on {}/{}, data area not mapped", target.os, target.arch);
        ExecProg::default()
    };

    let mut emitter = CallEmitter::new(target, opts);
    let calls = emitter.emit_prog(&prog);
    let mmap_calls = emitter.emit_prog(&mmap);
    log::debug!(
        "generating: {} calls, {} result slots, {} mmap calls",
        calls.len(),
        prog.vars.len(),
        mmap_calls.len()
    );

    let mut body = defines::syscall_defines(target, &defines::call_numbers(&[&mmap, &prog]));
    if !prog.vars.is_empty() {
        body.plain(0, result_table(&prog.vars));
    }
    if opts.procs > 1 {
        body.plain(0, "unsigned long long procid;");
    }
    let name = skeleton::loop_name(opts);
    body.append(
        &skeleton::test_func(&calls, !prog.vars.is_empty(), name, opts),
        0,
    );
    body.append(&skeleton::main_func(&mmap_calls, name, opts), 0);

    let mut src = String::from(header::BANNER);
    src.push_str(&post::clean_preamble(common, opts.handle_segv, opts.debug));
    src.push('\n');
    src.push_str(&body.render(opts.handle_segv, opts.debug));
    Ok(post::finalize(src))
}

fn decode<P: ExecSerialize + ?Sized>(
    target: &Target,
    p: &P,
    buf: &mut [u8],
    prog: &'static str,
) -> Result<ExecProg, Error> {
    let n = p
        .serialize_for_exec(target, buf)
        .map_err(|source| Error::Serialize { prog, source })?;
    deserialize(target, &buf[..n]).map_err(|source| Error::Decode { prog, source })
}

fn result_table(vars: &[u64]) -> String {
    let mut s = format!("uint64_t r[{}] = {{", vars.len());
    for (i, v) in vars.iter().enumerate() {
        if i != 0 {
            s.push_str(", ");
        }
        write!(s, "0x{:x}", v).unwrap();
    }
    s.push_str("};");
    s
}
