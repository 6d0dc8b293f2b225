//! Final text clean-up of generated source.

/// Attribute markers of the runtime header, meaningless in standalone source.
const MARKERS: [&str; 2] = ["NORETURN", "PRINTF"];

pub(crate) fn finalize(mut src: String) -> String {
    for marker in MARKERS.iter() {
        if src.contains(marker) {
            src = src.replace(marker, "");
        }
    }
    collapse_blank_lines(src)
}

/// Filter the shared preamble line by line: `NONFAILING(x);` becomes `x;` unless
/// `nonfailing`, and lines calling `debug` or `debug_dump_data` are dropped unless `debug`.
pub(crate) fn clean_preamble(text: &str, nonfailing: bool, debug: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if !debug && is_debug_stmt(line) {
            continue;
        }
        if !nonfailing {
            if let Some(unwrapped) = unwrap_nonfailing(line) {
                out.push_str(&unwrapped);
                out.push('\n');
                continue;
            }
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn is_debug_stmt(line: &str) -> bool {
    let stmt = line.trim();
    (stmt.starts_with("debug(") || stmt.starts_with("debug_dump_data(")) && stmt.ends_with(");")
}

/// `\t*NONFAILING(x);` to `x;`, None if the line has no such wrapper.
fn unwrap_nonfailing(line: &str) -> Option<String> {
    const WRAPPER: &str = "NONFAILING(";
    let start = line.find(WRAPPER)?;
    let inner = line[start + WRAPPER.len()..].trim_end().strip_suffix(");")?;
    let prefix = line[..start].trim_end_matches('\t');
    Some(format!("{}{};", prefix, inner))
}

/// Collapse 3+ newlines into 2 and drop blank lines before `#include`, until nothing changes.
fn collapse_blank_lines(mut src: String) -> String {
    loop {
        let next = src
            .replace("\n\n\n", "\n\n")
            .replace("\n\n#include", "\n#include");
        if next.len() == src.len() {
            return next;
        }
        src = next;
    }
}
