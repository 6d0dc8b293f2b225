//! Dispatch functions and `main` of generated program.
use super::options::Options;
use super::stmt::Block;

/// Name of the function running all calls once.
pub(crate) fn loop_name(opts: &Options) -> &'static str {
    if opts.repeat {
        "execute_one"
    } else {
        "loop"
    }
}

/// Build the function(s) running `calls`. Threaded and collide mode get an addressable
/// `execute_call` plus a wrapper handing the call count to the runtime.
pub(crate) fn test_func(calls: &[Block], has_vars: bool, name: &str, opts: &Options) -> Block {
    let mut b = Block::new();
    if !opts.threaded && !opts.collide {
        b.plain(0, format!("void {}()", name));
        b.plain(0, "{");
        if has_vars {
            b.plain(1, "long res;");
        }
        prologue(&mut b, name, opts);
        for c in calls {
            b.append(c, 0);
        }
        b.plain(0, "}");
        b.blank();
        return b;
    }

    b.plain(0, "void execute_call(int call)");
    b.plain(0, "{");
    if has_vars {
        b.plain(1, "long res;");
    }
    b.plain(1, "switch (call) {");
    for (i, c) in calls.iter().enumerate() {
        b.plain(1, format!("case {}:", i));
        b.append(c, 1);
        b.plain(2, "break;");
    }
    b.plain(1, "}");
    b.plain(0, "}");
    b.blank();

    b.plain(0, format!("void {}()", name));
    b.plain(0, "{");
    prologue(&mut b, name, opts);
    b.plain(1, format!("execute({});", calls.len()));
    if opts.collide {
        b.plain(1, "collide = 1;");
        b.plain(1, format!("execute({});", calls.len()));
    }
    b.plain(0, "}");
    b.blank();
    b
}

fn prologue(b: &mut Block, name: &str, opts: &Options) {
    b.debug(1, format!("debug(\"{}\\n\")", name));
    if opts.repro {
        b.plain(
            1,
            "syscall(SYS_write, 1, \"executing program\\n\", strlen(\"executing program\\n\"));",
        );
    }
}

/// Build `main`, the shape is decided by `repeat` and `procs`.
pub(crate) fn main_func(mmap_calls: &[Block], name: &str, opts: &Options) -> Block {
    let mut b = Block::new();
    b.plain(0, "int main()");
    b.plain(0, "{");
    for c in mmap_calls {
        b.append(c, 0);
    }

    if !opts.repeat {
        if opts.handle_segv {
            b.plain(1, "install_segv_handler();");
        }
        if opts.use_tmp_dir {
            b.plain(1, "use_temporary_dir();");
        }
        run(&mut b, 1, name, opts);
        b.plain(1, "return 0;");
    } else if opts.procs <= 1 {
        if opts.handle_segv {
            b.plain(1, "install_segv_handler();");
        }
        if opts.use_tmp_dir {
            b.plain(1, "char *cwd = get_current_dir_name();");
        }
        repeat(&mut b, 1, name, opts);
    } else {
        if opts.use_tmp_dir {
            b.plain(1, "char *cwd = get_current_dir_name();");
        }
        b.plain(
            1,
            format!("for (procid = 0; procid < {}; procid++) {{", opts.procs),
        );
        b.plain(2, "if (fork() == 0) {");
        if opts.handle_segv {
            b.plain(3, "install_segv_handler();");
        }
        repeat(&mut b, 3, name, opts);
        b.plain(2, "}");
        b.plain(1, "}");
        b.plain(1, "sleep(1000000);");
        b.plain(1, "return 0;");
    }
    b.plain(0, "}");
    b
}

/// Endless loop re-entering the temporary dir before each run.
fn repeat(b: &mut Block, indent: usize, name: &str, opts: &Options) {
    b.plain(indent, "for (;;) {");
    if opts.use_tmp_dir {
        b.plain(indent + 1, "if (chdir(cwd))");
        b.plain(indent + 2, "fail(\"failed to chdir\");");
        b.plain(indent + 1, "use_temporary_dir();");
    }
    run(b, indent + 1, name, opts);
    b.plain(indent, "}");
}

/// Run calls once, inside the sandbox if there is one.
fn run(b: &mut Block, indent: usize, name: &str, opts: &Options) {
    if let Some(sandbox) = opts.sandbox {
        b.plain(indent, format!("int pid = do_sandbox_{}();", sandbox));
        b.plain(indent, "int status = 0;");
        b.plain(indent, "while (waitpid(pid, &status, __WALL) != pid) {}");
    } else {
        if opts.enable_tun {
            b.plain(indent, "initialize_tun();");
            b.plain(indent, "initialize_netdevices();");
        }
        b.plain(indent, format!("{}();", name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csource::Sandbox;

    fn call(text: &str) -> Block {
        let mut b = Block::new();
        b.plain(1, text);
        b
    }

    fn gen_main(opts: &Options) -> String {
        let mmap = vec![call("syscall(__NR_mmap, 0x20000000, 0x1000000, 3, 0x32, -1, 0);")];
        main_func(&mmap, loop_name(opts), opts).render(opts.handle_segv, opts.debug)
    }

    #[test]
    fn flat_test_func() {
        let opts = Options {
            debug: true,
            repro: true,
            ..Options::default()
        };
        let calls = vec![call("syscall(__NR_close, 7);"), call("res = syscall(__NR_open);")];
        let out = test_func(&calls, true, "loop", &opts).render(false, true);
        let expected = "\
void loop()
{
\tlong res;
\tdebug(\"loop\\n\");
\tsyscall(SYS_write, 1, \"executing program\\n\", strlen(\"executing program\\n\"));
\tsyscall(__NR_close, 7);
\tres = syscall(__NR_open);
}

";
        assert_eq!(out, expected);
        assert!(!test_func(&calls, true, "loop", &opts)
            .render(false, false)
            .contains("debug("));
    }

    #[test]
    fn threaded_dispatch() {
        let opts = Options {
            threaded: true,
            repeat: true,
            ..Options::default()
        };
        let calls = vec![call("syscall(__NR_close, 7);"), call("syscall(__NR_close, 8);")];
        let out = test_func(&calls, false, loop_name(&opts), &opts).render(false, false);
        let expected = "\
void execute_call(int call)
{
\tswitch (call) {
\tcase 0:
\t\tsyscall(__NR_close, 7);
\t\tbreak;
\tcase 1:
\t\tsyscall(__NR_close, 8);
\t\tbreak;
\t}
}

void execute_one()
{
\texecute(2);
}

";
        assert_eq!(out, expected);
        assert!(!out.contains("collide"));
    }

    #[test]
    fn collide_runs_twice() {
        let opts = Options {
            threaded: true,
            collide: true,
            ..Options::default()
        };
        let calls = vec![call("syscall(__NR_close, 7);")];
        let out = test_func(&calls, false, "loop", &opts).render(false, false);
        let toggle = out.find("collide = 1;").unwrap();
        let first = out.find("execute(1);").unwrap();
        let second = out.rfind("execute(1);").unwrap();
        assert!(first < toggle && toggle < second);
        assert_eq!(out.matches("execute(1);").count(), 2);
    }

    #[test]
    fn run_once() {
        let opts = Options {
            handle_segv: true,
            use_tmp_dir: true,
            enable_tun: true,
            ..Options::default()
        };
        let expected = "\
int main()
{
\tsyscall(__NR_mmap, 0x20000000, 0x1000000, 3, 0x32, -1, 0);
\tinstall_segv_handler();
\tuse_temporary_dir();
\tinitialize_tun();
\tinitialize_netdevices();
\tloop();
\treturn 0;
}
";
        assert_eq!(gen_main(&opts), expected);
    }

    #[test]
    fn run_once_in_sandbox() {
        let opts = Options {
            sandbox: Some(Sandbox::Setuid),
            enable_tun: true,
            ..Options::default()
        };
        let out = gen_main(&opts);
        assert!(out.contains("\tint pid = do_sandbox_setuid();\n"));
        assert!(out.contains("\twhile (waitpid(pid, &status, __WALL) != pid) {}\n"));
        assert!(!out.contains("loop();"));
        assert!(!out.contains("initialize_tun"));
        assert!(!out.contains("for (;;)"));
    }

    #[test]
    fn repeat_single_proc() {
        let opts = Options {
            repeat: true,
            use_tmp_dir: true,
            sandbox: Some(Sandbox::Namespace),
            ..Options::default()
        };
        let expected = "\
int main()
{
\tsyscall(__NR_mmap, 0x20000000, 0x1000000, 3, 0x32, -1, 0);
\tchar *cwd = get_current_dir_name();
\tfor (;;) {
\t\tif (chdir(cwd))
\t\t\tfail(\"failed to chdir\");
\t\tuse_temporary_dir();
\t\tint pid = do_sandbox_namespace();
\t\tint status = 0;
\t\twhile (waitpid(pid, &status, __WALL) != pid) {}
\t}
}
";
        assert_eq!(gen_main(&opts), expected);
    }

    #[test]
    fn repeat_many_procs() {
        let opts = Options {
            repeat: true,
            procs: 3,
            handle_segv: true,
            ..Options::default()
        };
        let out = gen_main(&opts);
        assert!(out.contains("for (procid = 0; procid < 3; procid++) {"));
        assert_eq!(out.matches("fork()").count(), 1);
        assert!(!out.contains("waitpid"));
        assert!(out.contains("\t\t\tinstall_segv_handler();\n\t\t\tfor (;;) {\n\t\t\t\texecute_one();\n"));
        assert!(out.ends_with("\tsleep(1000000);\n\treturn 0;\n}\n"));
    }

    #[test]
    fn one_shape_per_config() {
        for &(repeat, procs) in &[(false, 1), (true, 1), (true, 4)] {
            let opts = Options {
                repeat,
                procs,
                ..Options::default()
            };
            let out = gen_main(&opts);
            assert_eq!(out.matches("int main()").count(), 1);
            assert_eq!(out.contains("for (;;)"), repeat);
            assert_eq!(out.contains("fork()"), procs > 1);
            assert_eq!(out.contains("sleep(1000000);"), procs > 1);
        }
    }
}
