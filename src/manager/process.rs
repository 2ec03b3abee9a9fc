use std::io;

use libc;

fn raw_pid(pid: u32) -> Option<libc::pid_t> {
    // 0 and negative values address process groups, never a single task.
    libc::pid_t::try_from(pid).ok().filter(|pid| *pid > 0)
}

/// Zero-signal probe. A recycled pid reads as alive; callers accept that.
pub fn is_process_alive(pid: u32) -> bool {
    let Some(pid) = raw_pid(pid) else {
        return false;
    };

    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

pub fn terminate(pid: u32) -> io::Result<()> {
    send_signal(pid, libc::SIGTERM)
}

pub fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let Some(pid) = raw_pid(pid) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal pid {pid}"),
        ));
    };

    if unsafe { libc::kill(pid, signal) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
