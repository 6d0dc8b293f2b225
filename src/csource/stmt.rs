//! Statements of generated program.
//!
//! Generated code is kept as a list of tagged statements until rendering, so that
//! fault tolerant wrappers and debug output can be dropped structurally.
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StmtKind {
    /// Rendered verbatim, text carries its own terminator.
    Plain,
    /// Memory access that may fault, wrapped in `NONFAILING` when faults are tolerated.
    Guarded,
    /// Call of `debug` or `debug_dump_data`, only kept in debug mode.
    Debug,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Stmt {
    indent: usize,
    kind: StmtKind,
    text: String,
}

/// Statements of one call, or of any other unit of generated code.
#[derive(Debug, Clone, Default)]
pub(crate) struct Block {
    stmts: Vec<Stmt>,
}

impl Block {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn plain<T: Into<String>>(&mut self, indent: usize, text: T) {
        self.push(indent, StmtKind::Plain, text.into());
    }

    pub(crate) fn guarded<T: Into<String>>(&mut self, indent: usize, text: T) {
        self.push(indent, StmtKind::Guarded, text.into());
    }

    pub(crate) fn debug<T: Into<String>>(&mut self, indent: usize, text: T) {
        self.push(indent, StmtKind::Debug, text.into());
    }

    pub(crate) fn blank(&mut self) {
        self.push(0, StmtKind::Plain, String::new());
    }

    fn push(&mut self, indent: usize, kind: StmtKind, text: String) {
        self.stmts.push(Stmt { indent, kind, text })
    }

    /// Append `other`, shifted right by `indent` levels.
    pub(crate) fn append(&mut self, other: &Block, indent: usize) {
        self.stmts.extend(other.stmts.iter().map(|s| Stmt {
            indent: s.indent + indent,
            kind: s.kind,
            text: s.text.clone(),
        }))
    }

    /// Render statements as c source, `nonfailing` keeps the fault tolerant wrappers
    /// and `debug` keeps debug output.
    pub(crate) fn render(&self, nonfailing: bool, debug: bool) -> String {
        let mut out = String::new();
        for s in &self.stmts {
            if s.kind == StmtKind::Debug && !debug {
                continue;
            }
            if s.text.is_empty() {
                out.push('\n');
                continue;
            }
            for _ in 0..s.indent {
                out.push('\t');
            }
            match s.kind {
                StmtKind::Plain => out.push_str(&s.text),
                StmtKind::Guarded if nonfailing => write!(out, "NONFAILING({});", s.text).unwrap(),
                StmtKind::Guarded | StmtKind::Debug => write!(out, "{};", s.text).unwrap(),
            }
            out.push('\n');
        }
        out
    }
}
