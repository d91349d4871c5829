use super::Liveness;
use ::windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, STILL_ACTIVE,
};
use ::windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, CREATE_NEW_PROCESS_GROUP, PROCESS_QUERY_LIMITED_INFORMATION,
};
use std::os::windows::process::CommandExt;
use std::process::Command;

/// New process group: console Ctrl-C is not delivered to workers.
pub fn prepare_command(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP.0);
}

/// Open a query handle and look at the exit code without waiting.
pub fn liveness(pid: u32) -> Liveness {
    let handle = match unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) } {
        Ok(handle) => handle,
        Err(err) if err.code() == ERROR_INVALID_PARAMETER.to_hresult() => return Liveness::Dead,
        Err(err) if err.code() == ERROR_ACCESS_DENIED.to_hresult() => return Liveness::Alive,
        Err(err) => return Liveness::Inconclusive(err.to_string()),
    };

    let mut exit_code = 0u32;
    let result = unsafe { GetExitCodeProcess(handle, &mut exit_code) };
    unsafe {
        let _ = CloseHandle(handle);
    }

    match result {
        Ok(()) if exit_code == STILL_ACTIVE.0 as u32 => Liveness::Alive,
        Ok(()) => Liveness::Dead,
        Err(err) => Liveness::Inconclusive(err.to_string()),
    }
}
