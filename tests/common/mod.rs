//! Shared helpers for the integration suites
#![allow(dead_code)]

use parking_lot::{Mutex, MutexGuard};
use parteam::ExceptionModel;

lazy_static::lazy_static! {
    static ref GLOBAL_SETTINGS: Mutex<()> = Mutex::new(());
}

/// Holds exclusive access to the process-wide settings and restores the
/// defaults when dropped, so suites running in parallel do not interfere.
pub struct SettingsGuard {
    _lock: MutexGuard<'static, ()>,
}

impl Drop for SettingsGuard {
    fn drop(&mut self) {
        parteam::set_team_size(parteam::default_team_size());
        parteam::set_exception_model(ExceptionModel::Default);
        parteam::set_exception_handler(None);
    }
}

pub fn exclusive_settings() -> SettingsGuard {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    SettingsGuard {
        _lock: GLOBAL_SETTINGS.lock(),
    }
}

/// Sleep for a few random microseconds to shake up interleavings
pub fn jitter() {
    std::thread::sleep(std::time::Duration::from_micros(fastrand::u64(0..200)));
}
