//! Ctrl-C handling
//!
//! The first SIGINT cancels the running task tree; the runtime then kills the
//! active child and unwinds with `Cancelled`. The handler resets itself, so a
//! second SIGINT terminates the process.

use crate::runner::CancelToken;
use std::sync::OnceLock;

static TOKEN: OnceLock<CancelToken> = OnceLock::new();
#[cfg(unix)]
static INSTALL: std::sync::Once = std::sync::Once::new();

#[cfg(unix)]
extern "C" fn on_sigint(_: libc::c_int) {
    // Only an atomic store and signal(2) happen here; both are async-signal-safe.
    if let Some(token) = TOKEN.get() {
        token.cancel();
    }
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

/// Route SIGINT to `token`. Only the first call installs a handler.
#[cfg(unix)]
pub fn install(token: &CancelToken) {
    let _ = TOKEN.set(token.clone());
    INSTALL.call_once(|| {
        let handler = on_sigint as extern "C" fn(libc::c_int);
        unsafe {
            libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        }
    });
}

#[cfg(not(unix))]
pub fn install(token: &CancelToken) {
    let _ = TOKEN.set(token.clone());
}
