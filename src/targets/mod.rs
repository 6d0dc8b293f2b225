//! Description of the test target: os, arch, memory layout and syscall table.
use crate::exec::{ExecArg, ExecArgConst, ExecCall, ExecProg};
use crate::utils::to_boxed_str;

use rustc_hash::FxHashMap;
use thiserror::Error;

pub mod sys_json;

/// System call id, index into the syscall table of a target.
pub type SId = usize;

/// Name prefix of pseudo syscalls.
pub const PSEUDO_PREFIX: &str = "syz_";

/// Pseudo syscalls are implemented by the executor, invoked by name directly.
#[inline]
pub fn is_pseudo(call_name: &str) -> bool {
    call_name.starts_with(PSEUDO_PREFIX)
}

/// Information related to particular system call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syscall {
    /// Index of system call, diffierent from nr.
    pub id: SId,
    /// Call number, set to 0 for system that doesn't use nr.
    pub nr: u64,
    /// Name of specialized call, e.g. `ioctl$KVM_RUN`.
    pub name: Box<str>,
    /// Name of system call, e.g. `ioctl`.
    pub call_name: Box<str>,
}

impl Syscall {
    pub fn new<T: AsRef<str>>(id: SId, nr: u64, name: T, call_name: T) -> Self {
        Self {
            id,
            nr,
            name: to_boxed_str(name),
            call_name: to_boxed_str(call_name),
        }
    }

    pub fn is_pseudo(&self) -> bool {
        is_pseudo(&self.call_name)
    }
}

/// Which syscall numbers need a fallback `#define` in generated source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallDefine {
    /// Every call number may be missing from target headers.
    Always,
    /// Only calls added after the oldest supported headers, i.e. `nr >= since`.
    Since(u64),
}

impl SyscallDefine {
    fn for_target(os: &str, arch: &str) -> Self {
        match (os, arch) {
            ("linux", "amd64") => SyscallDefine::Since(313),
            ("linux", "386") => SyscallDefine::Since(385),
            _ => SyscallDefine::Always,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("parse: {0}")]
    Parse(String),
    #[error("missing field: {0}")]
    Missing(&'static str),
}

/// Target maintain all information related to current test target.
#[derive(Debug, Clone)]
pub struct Target {
    pub os: Box<str>,
    pub arch: Box<str>,
    /// Syzlang description revision.
    pub revision: Box<str>,
    pub ptr_sz: u64,
    pub page_sz: u64,
    pub page_num: u64,
    /// Start of the data region used by copyin/copyout addresses.
    pub data_offset: u64,
    pub le_endian: bool,
    /// Prefix of syscall number symbols in target headers, `__NR_` or `SYS_`.
    pub syscall_prefix: Box<str>,
    pub syscall_define: SyscallDefine,
    /// All syscalls, sorted by `SId`.
    syscalls: Vec<Syscall>,
    /// Syscall name to syscall id mapping.
    syscall_name_mapping: FxHashMap<Box<str>, SId>,
}

lazy_static! {
    /// `MAP_ANONYMOUS | MAP_PRIVATE | MAP_FIXED` of each os.
    static ref MMAP_FLAGS: FxHashMap<&'static str, u64> = fxhashmap! {
        "linux" => 0x32,
        "akaros" => 0x32,
        "freebsd" => 0x1012,
        "netbsd" => 0x1012,
        "openbsd" => 0x1012,
    };
}

const PROT_READ_WRITE: u64 = 0x3;

impl Target {
    #[inline]
    pub fn syscall(&self, id: SId) -> Option<&Syscall> {
        self.syscalls.get(id)
    }

    pub fn syscall_of_name(&self, name: &str) -> Option<&Syscall> {
        self.syscall_name_mapping
            .get(name)
            .map(|&id| &self.syscalls[id])
    }

    #[inline]
    pub fn syscalls(&self) -> &[Syscall] {
        &self.syscalls
    }

    pub fn need_syscall_define(&self, nr: u64) -> bool {
        match self.syscall_define {
            SyscallDefine::Always => true,
            SyscallDefine::Since(since) => nr >= since,
        }
    }

    /// Auxiliary program that maps the whole data region, it runs before any other call.
    ///
    /// Returns None if the target has no plain `mmap` or unknown mapping flags.
    pub fn mmap_prog(&self) -> Option<ExecProg> {
        let mmap = self.syscall_of_name("mmap")?;
        let flags = *MMAP_FLAGS.get(&*self.os)?;
        let ptr = |value| ExecArg::Const(ExecArgConst::new(self.ptr_sz, value));
        let mut call = ExecCall::new(mmap);
        call.args = vec![
            ptr(self.data_offset),
            ptr(self.page_num * self.page_sz),
            ptr(PROT_READ_WRITE),
            ptr(flags),
            ExecArg::Const(ExecArgConst::new(4, u64::MAX)),
            ptr(0),
        ];
        Some(ExecProg::new(vec![call]))
    }
}

#[derive(Debug, Default)]
pub struct TargetBuilder {
    os: Option<String>,
    arch: Option<String>,
    revision: Option<String>,
    ptr_sz: Option<u64>,
    page_sz: Option<u64>,
    page_num: Option<u64>,
    data_offset: Option<u64>,
    le_endian: bool,
    syscalls: Vec<Syscall>,
}

impl TargetBuilder {
    pub fn new() -> Self {
        Self {
            le_endian: true,
            ..Self::default()
        }
    }

    pub fn os<T: Into<String>>(&mut self, os: T) -> &mut Self {
        self.os = Some(os.into());
        self
    }

    pub fn arch<T: Into<String>>(&mut self, arch: T) -> &mut Self {
        self.arch = Some(arch.into());
        self
    }

    pub fn revision<T: Into<String>>(&mut self, revision: T) -> &mut Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn ptr_sz(&mut self, sz: u64) -> &mut Self {
        self.ptr_sz = Some(sz);
        self
    }

    pub fn page_sz(&mut self, sz: u64) -> &mut Self {
        self.page_sz = Some(sz);
        self
    }

    pub fn page_num(&mut self, num: u64) -> &mut Self {
        self.page_num = Some(num);
        self
    }

    pub fn data_offset(&mut self, data_offset: u64) -> &mut Self {
        self.data_offset = Some(data_offset);
        self
    }

    pub fn le_endian(&mut self, le: bool) -> &mut Self {
        self.le_endian = le;
        self
    }

    pub fn syscalls(&mut self, syscalls: Vec<Syscall>) -> &mut Self {
        self.syscalls = syscalls;
        self
    }

    pub fn build(&mut self) -> Result<Target, LoadError> {
        let os = self.os.take().ok_or(LoadError::Missing("os"))?;
        let arch = self.arch.take().ok_or(LoadError::Missing("arch"))?;
        let mut syscalls = std::mem::take(&mut self.syscalls);
        syscalls.sort_unstable_by_key(|s| s.id);
        if syscalls.iter().enumerate().any(|(i, s)| s.id != i) {
            return Err(LoadError::Parse("syscall ids are not continuous".to_string()));
        }
        let syscall_name_mapping = syscalls
            .iter()
            .map(|s| (Box::clone(&s.name), s.id))
            .collect();
        let syscall_prefix = if os == "linux" { "__NR_" } else { "SYS_" };

        Ok(Target {
            syscall_define: SyscallDefine::for_target(&os, &arch),
            syscall_prefix: to_boxed_str(syscall_prefix),
            revision: to_boxed_str(self.revision.take().unwrap_or_default()),
            ptr_sz: self.ptr_sz.ok_or(LoadError::Missing("ptr_sz"))?,
            page_sz: self.page_sz.ok_or(LoadError::Missing("page_sz"))?,
            page_num: self.page_num.ok_or(LoadError::Missing("page_num"))?,
            data_offset: self.data_offset.ok_or(LoadError::Missing("data_offset"))?,
            le_endian: self.le_endian,
            os: os.into_boxed_str(),
            arch: arch.into_boxed_str(),
            syscalls,
            syscall_name_mapping,
        })
    }
}

/// Small linux target used by tests and benches.
#[doc(hidden)]
pub fn dummy_target(arch: &str, ptr_sz: u64) -> Target {
    const CALLS: [(&str, &str, u64); 10] = [
        ("mmap", "mmap", 9),
        ("open", "open", 2),
        ("read", "read", 0),
        ("write", "write", 1),
        ("close", "close", 3),
        ("socket$inet_tcp", "socket", 41),
        ("ioctl$TUNSETIFF", "ioctl", 16),
        ("syz_emit_ethernet", "syz_emit_ethernet", 0),
        ("syz_open_dev$tty", "syz_open_dev", 0),
        ("memfd_secret", "memfd_secret", 447),
    ];
    let syscalls = CALLS
        .iter()
        .enumerate()
        .map(|(id, (name, call_name, nr))| Syscall::new(id, *nr, *name, *call_name))
        .collect();
    let mut builder = TargetBuilder::new();
    builder
        .os("linux")
        .arch(arch)
        .revision("dummy")
        .ptr_sz(ptr_sz)
        .page_sz(4 << 10)
        .page_num(4 << 10)
        .data_offset(512 << 20)
        .syscalls(syscalls);
    // all fields are set above.
    builder.build().unwrap()
}
