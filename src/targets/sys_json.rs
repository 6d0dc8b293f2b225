//! Load target from syzkaller json description.
//!
//! Only the parts needed for generating c source are parsed: target layout and
//! the syscall table. Type descriptions are ignored.
use super::{LoadError, Syscall, Target, TargetBuilder};
use json::JsonValue;

impl Target {
    pub fn from_json<T: AsRef<str>>(desc: T) -> Result<Target, LoadError> {
        let desc = json::parse(desc.as_ref()).map_err(|e| LoadError::Parse(e.to_string()))?;
        parse_target(&desc)
    }
}

fn parse_target(desc: &JsonValue) -> Result<Target, LoadError> {
    /*
     Target: {OS, Arch, PtrSize, PageSize, NumPages, LittleEndian},
     DataOffset: u64,
     Revision: &str,
     Syscalls: [{NR, Name, CallName, ..}*]
    */
    let target = get(desc, "Target")?;
    let syscalls = get(desc, "Syscalls")?
        .members()
        .enumerate()
        .map(|(id, call)| parse_syscall(id, call))
        .collect::<Result<Vec<_>, _>>()?;

    let mut builder = TargetBuilder::new();
    builder
        .os(as_str(target, "OS")?)
        .arch(as_str(target, "Arch")?)
        .ptr_sz(as_u64(target, "PtrSize")?)
        .page_sz(as_u64(target, "PageSize")?)
        .page_num(as_u64(target, "NumPages")?)
        .le_endian(get(target, "LittleEndian")?.as_bool().unwrap_or(true))
        .data_offset(as_u64(desc, "DataOffset")?)
        .syscalls(syscalls);
    if let Some(revision) = desc["Revision"].as_str() {
        builder.revision(revision);
    }
    builder.build()
}

fn parse_syscall(id: usize, val: &JsonValue) -> Result<Syscall, LoadError> {
    let nr = as_u64(val, "NR")?;
    let name = as_str(val, "Name")?;
    let call_name = as_str(val, "CallName")?;
    Ok(Syscall::new(id, nr, name, call_name))
}

#[inline]
fn get<'a>(val: &'a JsonValue, key: &'static str) -> Result<&'a JsonValue, LoadError> {
    let v = &val[key];
    if v.is_null() {
        Err(LoadError::Missing(key))
    } else {
        Ok(v)
    }
}

fn as_u64(val: &JsonValue, key: &'static str) -> Result<u64, LoadError> {
    get(val, key)?
        .as_u64()
        .ok_or_else(|| LoadError::Parse(format!("'{}' is not an integer", key)))
}

fn as_str<'a>(val: &'a JsonValue, key: &'static str) -> Result<&'a str, LoadError> {
    get(val, key)?
        .as_str()
        .ok_or_else(|| LoadError::Parse(format!("'{}' is not a string", key)))
}
