use healer_csource::{
    csource::{self, Options, Sandbox},
    exec,
    targets::Target,
    utils::init_logger,
};
use std::fs::{read, read_to_string, write};
use std::path::PathBuf;
use std::process::exit;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "healer-csource",
    about = "Generate standalone C reproducer of a serialized prog."
)]
struct Settings {
    /// Syzkaller json description of target, e.g. linux/amd64.json.
    #[structopt(short = "t", long)]
    target: PathBuf,
    /// Prog in executor encoding.
    #[structopt(short = "p", long)]
    prog: PathBuf,
    /// Output file, default is stdout.
    #[structopt(short = "o", long)]
    output: Option<PathBuf>,
    /// Run calls in a dispatch function addressable by call index.
    #[structopt(long)]
    threaded: bool,
    /// Run the prog a second time, concurrently with itself.
    #[structopt(long)]
    collide: bool,
    /// Repeat the prog forever.
    #[structopt(long)]
    repeat: bool,
    /// Number of parallel processes.
    #[structopt(long, default_value = "1")]
    procs: u64,
    /// Sandbox for running the prog: none, setuid, namespace or android.
    #[structopt(long)]
    sandbox: Option<Sandbox>,
    /// Index of call to inject fault into.
    #[structopt(long)]
    fault_call: Option<usize>,
    /// Inject fault at the n-th eligible site.
    #[structopt(long, default_value = "0")]
    fault_nth: usize,
    /// Setup tun device before running.
    #[structopt(long)]
    tun: bool,
    /// Run in a temporary directory.
    #[structopt(long)]
    tmpdir: bool,
    /// Survive faults during memory access.
    #[structopt(long)]
    segv: bool,
    /// Keep debug output in generated prog.
    #[structopt(long)]
    debug: bool,
    /// Print 'executing program' before each run.
    #[structopt(long)]
    repro: bool,
    /// Log generation details.
    #[structopt(short, long)]
    verbose: bool,
}

impl Settings {
    fn options(&self) -> Options {
        Options {
            threaded: self.threaded,
            collide: self.collide,
            repeat: self.repeat,
            procs: self.procs,
            sandbox: self.sandbox,
            fault: self.fault_call.is_some(),
            fault_call: self.fault_call.unwrap_or(0),
            fault_nth: self.fault_nth,
            enable_tun: self.tun,
            use_tmp_dir: self.tmpdir,
            handle_segv: self.segv,
            debug: self.debug,
            repro: self.repro,
        }
    }
}

pub fn main() {
    let settings = Settings::from_args();
    init_logger(settings.verbose).unwrap();

    let desc = read_to_string(&settings.target).unwrap_or_else(|e| {
        eprintln!("failed to read {}: {}", settings.target.display(), e);
        exit(1)
    });
    let target = Target::from_json(&desc).unwrap_or_else(|e| {
        eprintln!("failed to load target: {}", e);
        exit(1)
    });
    log::info!(
        "{}/{} (revision {}): {} syscalls, {} pseudo",
        target.os,
        target.arch,
        target.revision,
        target.syscalls().len(),
        target.syscalls().iter().filter(|s| s.is_pseudo()).count()
    );
    let bin = read(&settings.prog).unwrap_or_else(|e| {
        eprintln!("failed to read {}: {}", settings.prog.display(), e);
        exit(1)
    });
    let p = exec::deserialize(&target, &bin).unwrap_or_else(|e| {
        eprintln!("failed to decode {}: {}", settings.prog.display(), e);
        exit(1)
    });
    log::info!(
        "{}/{}: {} calls loaded from {}",
        target.os,
        target.arch,
        p.len(),
        settings.prog.display()
    );

    let src = csource::write(&target, &p, &settings.options()).unwrap_or_else(|e| {
        eprintln!("{}", e);
        exit(1)
    });
    if let Some(out) = settings.output.as_ref() {
        if let Err(e) = write(out, &src) {
            eprintln!("failed to write {}: {}", out.display(), e);
            exit(1)
        }
        log::info!("c source written to {}", out.display());
    } else {
        print!("{}", src);
    }
}
