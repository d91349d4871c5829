//! Termination signals
//!
//! SIGINT, SIGTERM (and console close events on Windows) request the same
//! orderly shutdown as typing `exit`. The OS handler is registered once per
//! process; [`install`] points it at the current session and the returned
//! guard disarms it again.

use crate::error::{WardenError, WardenResult};
use crate::tasks::CancellationToken;
use crossbeam::channel::Sender;
use parking_lot::{const_mutex, Mutex};
use std::io;
use std::sync::OnceLock;
use tracing::info;

struct ShutdownHook {
    token: CancellationToken,
    notify: Sender<()>,
}

static HOOK: Mutex<Option<ShutdownHook>> = const_mutex(None);
static HANDLER: OnceLock<Result<(), String>> = OnceLock::new();

pub struct SignalGuard;

impl Drop for SignalGuard {
    fn drop(&mut self) {
        HOOK.lock().take();
    }
}

pub fn install(token: CancellationToken, notify: Sender<()>) -> WardenResult<SignalGuard> {
    HANDLER
        .get_or_init(|| ctrlc::set_handler(request_shutdown).map_err(|e| e.to_string()))
        .clone()
        .map_err(|message| WardenError::Io(io::Error::other(message)))?;

    *HOOK.lock() = Some(ShutdownHook { token, notify });
    Ok(SignalGuard)
}

/// What the signal handler does. Also reachable directly for tests.
pub fn request_shutdown() {
    if let Some(hook) = HOOK.lock().as_ref() {
        info!("termination signal received, shutting down");
        hook.token.cancel();
        // the console may already be gone
        let _ = hook.notify.try_send(());
    }
}
