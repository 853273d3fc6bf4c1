use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signal: nix::libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Process-wide shutdown request, raised by SIGINT or SIGTERM.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownFlag(&'static AtomicBool);

impl ShutdownFlag {
    #[cfg(test)]
    pub fn new(flag: &'static AtomicBool) -> Self {
        Self(flag)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Route SIGINT and SIGTERM to the process-wide shutdown flag.
///
/// No `SA_RESTART`: a blocking camera read returns early so the loop can
/// notice the request.
pub fn install_handlers() -> nix::Result<ShutdownFlag> {
    let action = SigAction::new(
        SigHandler::Handler(request_shutdown),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs an atomic store.
        unsafe { sigaction(signal, &action) }?;
    }
    tracing::debug!("signal handlers installed");
    Ok(ShutdownFlag(&SHUTDOWN_REQUESTED))
}
