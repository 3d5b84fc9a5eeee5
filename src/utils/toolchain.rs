/// Toolchain discovery on the host PATH
use std::env;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Resolve `program` the way `execvp` would.
///
/// Names containing a slash are checked as given; bare names are looked up
/// in each `PATH` directory in order. Only regular files with an execute
/// bit count.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    find_executable_in(program, env::var_os("PATH").as_deref())
}

pub fn find_executable_in(program: &str, path: Option<&OsStr>) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }

    if program.contains('/') {
        let candidate = PathBuf::from(program);
        return is_executable(&candidate).then_some(candidate);
    }

    env::split_paths(path?)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}
