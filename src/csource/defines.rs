use super::stmt::Block;
use crate::exec::ExecProg;
use crate::targets::{is_pseudo, Target};

use rustc_hash::FxHashMap;

/// Call name to call number, over all given programs. Sorted by name.
pub(crate) fn call_numbers(progs: &[&ExecProg]) -> Vec<(Box<str>, u64)> {
    let mut calls: FxHashMap<&str, u64> = FxHashMap::default();
    for p in progs {
        for c in &p.calls {
            calls.insert(&*c.call_name, c.nr);
        }
    }
    let mut calls = calls
        .into_iter()
        .map(|(name, nr)| (Box::from(name), nr))
        .collect::<Vec<_>>();
    calls.sort_unstable();
    calls
}

/// Fallback definitions of syscall numbers that target headers may lack.
pub(crate) fn syscall_defines(target: &Target, calls: &[(Box<str>, u64)]) -> Block {
    let prefix = &target.syscall_prefix;
    let mut b = Block::new();
    for (name, nr) in calls {
        if is_pseudo(name) || !target.need_syscall_define(*nr) {
            continue;
        }
        b.plain(0, format!("#ifndef {}{}", prefix, name));
        b.plain(0, format!("#define {}{} {}", prefix, name, nr));
        b.plain(0, "#endif");
    }
    if &*target.os == "linux" && target.ptr_sz == 4 {
        // On 32-bit linux mmap is old_mmap, which takes a pointer to args. mmap2 has the
        // signature used by generated calls.
        b.plain(0, "#undef __NR_mmap");
        b.plain(0, "#define __NR_mmap __NR_mmap2");
    }
    b.blank();
    b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecCall;
    use crate::targets::dummy_target;

    fn prog(target: &Target, names: &[&str]) -> ExecProg {
        let calls = names
            .iter()
            .map(|n| ExecCall::new(target.syscall_of_name(n).unwrap()))
            .collect();
        ExecProg::new(calls)
    }

    #[test]
    fn call_numbers_union_sorted() {
        let target = dummy_target("amd64", 8);
        let mmap = target.mmap_prog().unwrap();
        let p = prog(&target, &["write", "open", "write", "socket$inet_tcp"]);
        let calls = call_numbers(&[&mmap, &p]);
        let names = calls.iter().map(|(n, _)| &**n).collect::<Vec<_>>();
        assert_eq!(names, vec!["mmap", "open", "socket", "write"]);
    }

    #[test]
    fn defines_only_for_new_calls() {
        let target = dummy_target("amd64", 8);
        let p = prog(&target, &["open", "memfd_secret", "syz_open_dev$tty"]);
        let out = syscall_defines(&target, &call_numbers(&[&p])).render(false, false);
        assert_eq!(
            out,
            "#ifndef __NR_memfd_secret\n#define __NR_memfd_secret 447\n#endif\n\n"
        );
    }

    #[test]
    fn defines_all_calls() {
        let target = dummy_target("arm64", 8);
        let p = prog(&target, &["open", "syz_emit_ethernet"]);
        let out = syscall_defines(&target, &call_numbers(&[&p])).render(false, false);
        assert_eq!(out, "#ifndef __NR_open\n#define __NR_open 2\n#endif\n\n");
    }

    #[test]
    fn mmap2_on_32bit() {
        let target = dummy_target("386", 4);
        let out = syscall_defines(&target, &[]).render(false, false);
        assert_eq!(out, "#undef __NR_mmap\n#define __NR_mmap __NR_mmap2\n\n");
        let target = dummy_target("arm", 4);
        let out = syscall_defines(&target, &[]).render(false, false);
        assert!(out.contains("#define __NR_mmap __NR_mmap2"));
    }
}
