use super::Liveness;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::{setpgid, Pid};
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Put the worker in its own process group so a Ctrl-C aimed at the
/// operator's terminal does not interrupt it between its locked steps.
pub fn prepare_command(cmd: &mut Command) {
    // SAFETY: setpgid is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(io::Error::from)?;
            Ok(())
        });
    }
}

/// Check if process is alive with the null signal.
pub fn liveness(pid: u32) -> Liveness {
    let Ok(raw) = i32::try_from(pid) else {
        return Liveness::Inconclusive(format!("pid {pid} out of range"));
    };

    match kill(Pid::from_raw(raw), None) {
        Ok(()) => Liveness::Alive,
        // EPERM means process exists but no permission
        Err(Errno::EPERM) => Liveness::Alive,
        Err(Errno::ESRCH) => Liveness::Dead,
        Err(errno) => Liveness::Inconclusive(errno.desc().to_string()),
    }
}
