use nix::libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::*;

const INTERRUPTIONS: [Signal; 4] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
];

#[allow(clippy::declare_interior_mutable_const)]
const NONE_CAUGHT: AtomicUsize = AtomicUsize::new(0);

static CAUGHT: [AtomicUsize; 4] = [NONE_CAUGHT; 4];

extern "C" fn record(signal: c_int) {
    if let Some(index) = INTERRUPTIONS.iter().position(|s| *s as c_int == signal) {
        CAUGHT[index].fetch_add(1, Ordering::SeqCst);
    }
}

/// Records interruption signals instead of letting them terminate the process, for as long as it
/// is alive. The previous dispositions are restored on drop.
///
/// The handler is installed without `SA_RESTART`, so a blocking wait returns with `EINTR` when a
/// signal arrives.
///
pub(crate) struct SignalGuard {
    previous: Vec<(Signal, SigAction)>,
}

impl SignalGuard {
    pub(crate) fn install() -> Self {
        for caught in &CAUGHT {
            caught.store(0, Ordering::SeqCst);
        }

        let action = SigAction::new(
            SigHandler::Handler(record),
            SaFlags::empty(),
            SigSet::empty(),
        );
        let mut previous = vec![];
        for signal in INTERRUPTIONS {
            // SAFETY: the handler only touches atomics.
            match unsafe { sigaction(signal, &action) } {
                Ok(old) => previous.push((signal, old)),
                Err(err) => warn!("Could not handle {:?}: {}", signal, err),
            }
        }
        Self { previous }
    }

    /// Every signal caught since the last call, once per delivery.
    pub(crate) fn drain(&self) -> Vec<Signal> {
        let mut caught = vec![];
        for (signal, count) in INTERRUPTIONS.iter().zip(&CAUGHT) {
            let count = count.swap(0, Ordering::SeqCst);
            caught.extend(std::iter::repeat(*signal).take(count));
        }
        caught
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        for (signal, old) in self.previous.drain(..).rev() {
            // SAFETY: restoring a disposition that was in place before we replaced it.
            if let Err(err) = unsafe { sigaction(signal, &old) } {
                warn!("Could not restore the handler of {:?}: {}", signal, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::exclusive;
    use nix::sys::signal::raise;

    #[test]
    fn records_each_delivery() {
        let _lock = exclusive();
        let guard = SignalGuard::install();
        raise(Signal::SIGTERM).unwrap();
        raise(Signal::SIGTERM).unwrap();
        raise(Signal::SIGHUP).unwrap();
        assert_eq!(
            guard.drain(),
            vec![Signal::SIGHUP, Signal::SIGTERM, Signal::SIGTERM]
        );
        assert!(guard.drain().is_empty());
    }

    #[test]
    fn restores_the_previous_handlers() {
        let _lock = exclusive();
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        let original = unsafe { sigaction(Signal::SIGHUP, &ignore) }.unwrap();

        drop(SignalGuard::install());

        let restored = unsafe { sigaction(Signal::SIGHUP, &original) }.unwrap();
        assert_eq!(restored.handler(), SigHandler::SigIgn);
    }
}
