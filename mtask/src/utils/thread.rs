use crate::runtime::runtime::ThreadNameFn;
use anyhow::{Result, anyhow};
use std::ffi::CStr;
use std::io;

const MAX_PTHREAD_NAME_LEN: usize = 16;

/// Pins the calling thread to a single CPU core.
#[cfg(target_os = "linux")]
pub(crate) fn pin_current_thread(core: usize) -> io::Result<()> {
    // Safety: `cpu_set_t` is a plain bitmask, all-zero is a valid empty set.
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };

    let ret = unsafe {
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };

    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn pin_current_thread(_core: usize) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "core pinning is only supported on linux",
    ))
}

/// Generates the next worker thread name. Names are truncated to what pthread
/// accepts, 15 bytes plus the null terminator.
pub(crate) fn next_thread_name(thread_name_fn: &ThreadNameFn) -> String {
    let mut name = (thread_name_fn.0)();
    if name.len() >= MAX_PTHREAD_NAME_LEN {
        let mut end = MAX_PTHREAD_NAME_LEN - 1;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Gets the name of the current thread as seen by the OS.
#[cfg(target_os = "linux")]
#[allow(unused)]
pub(crate) fn get_current_thread_name() -> Result<String> {
    // Zero-initialized, so it is guaranteed to be null-terminated.
    let mut c_name_buf: [libc::c_char; MAX_PTHREAD_NAME_LEN] = [0; MAX_PTHREAD_NAME_LEN];

    let ret = unsafe {
        let thread = libc::pthread_self();
        libc::pthread_getname_np(thread, c_name_buf.as_mut_ptr(), MAX_PTHREAD_NAME_LEN)
    };

    if ret != 0 {
        return Err(anyhow!(
            "pthread_getname_np failed with error code: {}",
            ret
        ));
    }

    let c_str = unsafe { CStr::from_ptr(c_name_buf.as_ptr()) };
    c_str
        .to_str()
        .map(|s| s.to_string())
        .map_err(|e| anyhow!("Failed to convert thread name from CStr: {}", e))
}

#[cfg(not(target_os = "linux"))]
#[allow(unused)]
pub(crate) fn get_current_thread_name() -> Result<String> {
    std::thread::current()
        .name()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("current thread has no name"))
}
