use super::options::Options;
use crate::targets::Target;

use std::fmt::Write;

pub(crate) const BANNER: &str =
    "// autogenerated by healer (https://github.com/SunHao-0/healer)\n\n";

/// Default shared preamble: feature macros, system headers, and the runtime header
/// providing `NONFAILING`, `csum_inet_*`, sandboxes and the other helpers.
pub(crate) fn common_header(target: &Target, opts: &Options) -> String {
    let mut incs = vec![
        "endian.h",
        "stdint.h",
        "stdio.h",
        "stdlib.h",
        "string.h",
        "sys/syscall.h",
        "unistd.h",
    ];
    if opts.sandbox.is_some() {
        incs.push("sys/wait.h");
    }
    if opts.threaded {
        incs.push("pthread.h");
    }
    if opts.handle_segv {
        incs.push("setjmp.h");
        incs.push("signal.h");
    }
    incs.sort_unstable();

    let mut hdr = String::new();
    writeln!(hdr, "#define _GNU_SOURCE").unwrap();
    writeln!(hdr).unwrap();
    for inc in incs {
        writeln!(hdr, "#include <{}>", inc).unwrap();
    }
    writeln!(hdr).unwrap();
    writeln!(hdr, "#include \"common_{}.h\"", target.os).unwrap();
    hdr
}
