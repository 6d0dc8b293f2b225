use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Isolation strategy applied before running the calls in a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sandbox {
    /// Plain child process without extra isolation.
    None,
    /// Impersonate nobody user.
    Setuid,
    /// Use namespaces for sandboxing.
    Namespace,
    /// Use Android sandboxing for the untrusted_app domain.
    Android,
}

impl fmt::Display for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sandbox::None => "none",
            Sandbox::Setuid => "setuid",
            Sandbox::Namespace => "namespace",
            Sandbox::Android => "android",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Sandbox {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &s.to_ascii_lowercase()[..] {
            "none" => Ok(Sandbox::None),
            "setuid" => Ok(Sandbox::Setuid),
            "namespace" => Ok(Sandbox::Namespace),
            "android" => Ok(Sandbox::Android),
            _ => Err(OptionsError::UnknownSandbox(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("unknown sandbox: {0}")]
    UnknownSandbox(String),
    #[error("option procs must be at least 1")]
    ZeroProcs,
    #[error("option collide without threaded")]
    CollideWithoutThreaded,
    #[error("option procs>1 without repeat")]
    ProcsWithoutRepeat,
    #[error("option sandbox=namespace without use_tmp_dir")]
    NamespaceWithoutTmpDir,
}

/// Option for controlling the shape of generated program.
#[derive(Debug, Clone)]
pub struct Options {
    /// Run calls in an addressable dispatch function, driven by the runtime's worker threads.
    pub threaded: bool,
    /// Run the whole program a second time, concurrently with itself.
    pub collide: bool,
    /// Repeat the program forever.
    pub repeat: bool,
    /// Number of parallel processes, each runs the program independently.
    pub procs: u64,
    pub sandbox: Option<Sandbox>,
    /// Inject fault for `fault_call`.
    pub fault: bool,
    pub fault_call: usize,
    /// Inject fault at the `fault_nth` eligible site of `fault_call`.
    pub fault_nth: usize,
    /// Setup tun device and network devices before running.
    pub enable_tun: bool,
    /// Run in a fresh temporary directory.
    pub use_tmp_dir: bool,
    /// Survive faults during memory access, requires segv handler.
    pub handle_segv: bool,
    /// Keep debug output of generated program.
    pub debug: bool,
    /// Print `executing program` at each run, used by reproducing.
    pub repro: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            threaded: false,
            collide: false,
            repeat: false,
            procs: 1,
            sandbox: None,
            fault: false,
            fault_call: 0,
            fault_nth: 0,
            enable_tun: false,
            use_tmp_dir: false,
            handle_segv: false,
            debug: false,
            repro: false,
        }
    }
}

impl Options {
    pub fn check(&self) -> Result<(), OptionsError> {
        if self.procs == 0 {
            return Err(OptionsError::ZeroProcs);
        }
        if self.collide && !self.threaded {
            return Err(OptionsError::CollideWithoutThreaded);
        }
        if self.procs > 1 && !self.repeat {
            return Err(OptionsError::ProcsWithoutRepeat);
        }
        if self.sandbox == Some(Sandbox::Namespace) && !self.use_tmp_dir {
            return Err(OptionsError::NamespaceWithoutTmpDir);
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn is_fault_call(&self, call_index: usize) -> bool {
        self.fault && self.fault_call == call_index
    }
}
