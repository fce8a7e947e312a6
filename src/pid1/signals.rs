//! Signal handling for the supervisor
//!
//! - SIGCHLD: reap, then restart objects that asked for it
//! - SIGINT: abort the in-flight wait, or reboot when idle
//! - SIGTERM / SIGUSR2: power off / reboot
//! - SIGUSR1: dump object state
//! - SIGHUP: re-run the start pass
//! - SIGRTMIN+0 / SIGRTMIN+1: switch to the default / rescue runlevel

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

/// Signals the supervisor handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSignal {
    /// Child process exited (SIGCHLD)
    Child,
    /// Power off (SIGTERM)
    Term,
    /// Interrupt (SIGINT, also Ctrl-Alt-Del when disabled in the kernel)
    Int,
    /// Re-run the start pass (SIGHUP)
    Hup,
    /// State dump (SIGUSR1)
    Usr1,
    /// Reboot (SIGUSR2)
    Usr2,
    /// Switch to the default runlevel (SIGRTMIN)
    DefaultRunlevel,
    /// Switch to the rescue runlevel (SIGRTMIN+1)
    RescueRunlevel,
}

/// Signal streams, multiplexed by `wait`
pub struct SignalHandler {
    sigchld: Signal,
    sigterm: Signal,
    sigint: Signal,
    sighup: Signal,
    sigusr1: Signal,
    sigusr2: Signal,
    sigrt_default: Signal,
    sigrt_rescue: Signal,
}

impl SignalHandler {
    /// Register every handled signal. Must run inside a tokio runtime.
    pub fn new() -> std::io::Result<Self> {
        let rtmin = libc::SIGRTMIN();
        Ok(Self {
            sigchld: signal(SignalKind::child())?,
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
            sighup: signal(SignalKind::hangup())?,
            sigusr1: signal(SignalKind::user_defined1())?,
            sigusr2: signal(SignalKind::user_defined2())?,
            sigrt_default: signal(SignalKind::from_raw(rtmin))?,
            sigrt_rescue: signal(SignalKind::from_raw(rtmin + 1))?,
        })
    }

    /// Wait for the next signal
    pub async fn wait(&mut self) -> InitSignal {
        tokio::select! {
            _ = self.sigchld.recv() => InitSignal::Child,
            _ = self.sigterm.recv() => InitSignal::Term,
            _ = self.sigint.recv() => InitSignal::Int,
            _ = self.sighup.recv() => InitSignal::Hup,
            _ = self.sigusr1.recv() => InitSignal::Usr1,
            _ = self.sigusr2.recv() => InitSignal::Usr2,
            _ = self.sigrt_default.recv() => InitSignal::DefaultRunlevel,
            _ = self.sigrt_rescue.recv() => InitSignal::RescueRunlevel,
        }
    }

    /// Spawn a task that forwards signals to a channel
    pub fn spawn_forwarder(mut self) -> mpsc::Receiver<InitSignal> {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            loop {
                let sig = self.wait().await;
                if tx.send(sig).await.is_err() {
                    // Receiver dropped, exit
                    break;
                }
            }
        });

        rx
    }
}
