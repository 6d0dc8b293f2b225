//! Rendering of argument values and data blocks as c expressions.
use crate::exec::{ExecArg, ExecArgConst, ExecArgResult};

use std::fmt::Write;

#[inline]
fn mask(size: u64) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1 << (size * 8)) - 1
    }
}

/// Render constant argument, `procs` is the number of parallel processes.
pub(crate) fn const_arg(arg: &ExecArgConst, procs: u64) -> String {
    let mask = mask(arg.size);
    let v = arg.value & mask;
    let mut val = if v == mask {
        "-1".to_string()
    } else if v >= 10 {
        format!("0x{:x}", v)
    } else {
        v.to_string()
    };
    if procs > 1 && arg.pid_stride != 0 {
        write!(val, " + procid*{}", arg.pid_stride).unwrap();
    }
    if arg.big_endian {
        val = format!("htobe{}({})", arg.size * 8, val);
    }
    val
}

/// Render reference to result table, division goes first.
pub(crate) fn result_arg(arg: &ExecArgResult) -> String {
    let mut res = format!("r[{}]", arg.index);
    if arg.div_op != 0 {
        write!(res, "/{}", arg.div_op).unwrap();
    }
    if arg.add_op != 0 {
        write!(res, "+{}", arg.add_op).unwrap();
    }
    res
}

pub(crate) fn call_arg(arg: &ExecArg, procs: u64) -> String {
    match arg {
        ExecArg::Const(arg) => const_arg(arg, procs),
        ExecArg::Result(arg) => result_arg(arg),
    }
}

#[inline]
fn is_readable(v: u8) -> bool {
    (0x20..0x7f).contains(&v) || v == b'\t' || v == b'\r' || v == b'\n'
}

/// Render data as the content of a c string literal.
///
/// Readable data is escaped minimally and loses its trailing zero, which c strings
/// carry implicitly. Everything else is rendered as `\xNN` bytes.
pub(crate) fn c_string(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }
    let last = data.len() - 1;
    let readable = data
        .iter()
        .enumerate()
        .all(|(i, &v)| is_readable(v) || (i == last && v == 0));

    let mut buf = String::with_capacity(data.len() * 4);
    if !readable {
        for v in data {
            write!(buf, "\\x{:02x}", v).unwrap();
        }
        return buf;
    }

    let data = if data[last] == 0 { &data[..last] } else { data };
    for &v in data {
        match v {
            b'\t' => buf.push_str("\\t"),
            b'\r' => buf.push_str("\\r"),
            b'\n' => buf.push_str("\\n"),
            b'\\' => buf.push_str("\\\\"),
            b'"' => buf.push_str("\\\""),
            _ => buf.push(char::from(v)),
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{prelude::SmallRng, Rng, SeedableRng};

    fn parse_literal(lit: &str, size: u64) -> u64 {
        if lit == "-1" {
            mask(size)
        } else if let Some(hex) = lit.strip_prefix("0x") {
            u64::from_str_radix(hex, 16).unwrap()
        } else {
            lit.parse().unwrap()
        }
    }

    fn unescape(s: &str) -> Vec<u8> {
        let mut out = Vec::new();
        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'\\' {
                out.push(bytes[i]);
                i += 1;
                continue;
            }
            match bytes[i + 1] {
                b't' => out.push(b'\t'),
                b'r' => out.push(b'\r'),
                b'n' => out.push(b'\n'),
                b'x' => {
                    let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).unwrap();
                    out.push(u8::from_str_radix(hex, 16).unwrap());
                    i += 2;
                }
                c => out.push(c),
            }
            i += 2;
        }
        out
    }

    #[test]
    fn const_small_and_hex() {
        assert_eq!(const_arg(&ExecArgConst::new(4, 7), 1), "7");
        assert_eq!(const_arg(&ExecArgConst::new(4, 9), 1), "9");
        assert_eq!(const_arg(&ExecArgConst::new(4, 10), 1), "0xa");
        assert_eq!(const_arg(&ExecArgConst::new(2, 0x12345), 1), "0x2345");
        assert_eq!(const_arg(&ExecArgConst::new(1, 0x100), 1), "0");
    }

    #[test]
    fn const_all_ones() {
        for &size in &[1, 2, 4, 8] {
            let arg = ExecArgConst::new(size, u64::MAX);
            assert_eq!(const_arg(&arg, 1), "-1");
            let arg = ExecArgConst::new(size, mask(size));
            assert_eq!(const_arg(&arg, 1), "-1");
        }
    }

    #[test]
    fn const_stride_and_endian() {
        let mut arg = ExecArgConst::new(2, 0x4e20);
        arg.pid_stride = 4;
        assert_eq!(const_arg(&arg, 1), "0x4e20");
        assert_eq!(const_arg(&arg, 8), "0x4e20 + procid*4");
        arg.big_endian = true;
        assert_eq!(const_arg(&arg, 8), "htobe16(0x4e20 + procid*4)");
        arg.pid_stride = 0;
        assert_eq!(const_arg(&arg, 8), "htobe16(0x4e20)");
    }

    #[test]
    fn const_literal_value() {
        let mut rng = SmallRng::from_entropy();
        for _ in 0..4096 {
            let size = [1, 2, 4, 8][rng.gen_range(0..4)];
            let v: u64 = if rng.gen() { rng.gen() } else { rng.gen_range(0..32) };
            let lit = const_arg(&ExecArgConst::new(size, v), 1);
            assert_eq!(parse_literal(&lit, size), v & mask(size), "{}", lit);
        }
    }

    #[test]
    fn result_ops_order() {
        let mut arg = ExecArgResult::new(4, 2);
        assert_eq!(result_arg(&arg), "r[2]");
        arg.add_op = 3;
        assert_eq!(result_arg(&arg), "r[2]+3");
        arg.div_op = 4;
        assert_eq!(result_arg(&arg), "r[2]/4+3");
        arg.add_op = 0;
        assert_eq!(result_arg(&arg), "r[2]/4");
    }

    #[test]
    fn c_string_readable() {
        assert_eq!(c_string(b""), "");
        assert_eq!(c_string(b"/dev/null\0"), "/dev/null");
        assert_eq!(c_string(b"a\tb\r\n\"\\"), "a\\tb\\r\\n\\\"\\\\");
        assert_eq!(c_string(b"\0"), "");
    }

    #[test]
    fn c_string_binary() {
        assert_eq!(c_string(b"\x01\xff"), "\\x01\\xff");
        assert_eq!(c_string(b"ab\0c"), "\\x61\\x62\\x00\\x63");
        assert_eq!(c_string(b"ab\0\0"), "\\x61\\x62\\x00\\x00");
    }

    #[test]
    fn c_string_unescape() {
        let mut rng = SmallRng::from_entropy();
        for _ in 0..1024 {
            let len = rng.gen_range(1..64);
            let printable = rng.gen::<bool>();
            let mut data = (0..len)
                .map(|_| {
                    if printable {
                        rng.gen_range(0x20..0x7f)
                    } else {
                        rng.gen()
                    }
                })
                .collect::<Vec<u8>>();
            if !printable {
                data[0] |= 0x80;
            }
            let escaped = c_string(&data);
            assert_eq!(unescape(&escaped), data);
            if data.iter().all(|&b| is_readable(b)) {
                data.push(0);
                let mut unescaped = unescape(&c_string(&data));
                unescaped.push(0);
                assert_eq!(unescaped, data);
            }
        }
    }
}
