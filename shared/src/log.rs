//! Logging targets for the `nifi` crates.
//!
//! Every crate logs through `tracing` using one of these targets, the same
//! way the reference codebase tags every log line with a `Log::SlippiOnline`-
//! style constant rather than relying on module paths alone.

/// A logical subsystem used as a `tracing` `target:`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Shared,
    RingBuffer,
    Dispatch,
    Proto,
    LocalMp,
    Lan,
    Discovery,
    Netplay,
    Rollback,
    Blob,
}

impl Target {
    pub const fn as_str(self) -> &'static str {
        match self {
            Target::Shared => "nifi::shared",
            Target::RingBuffer => "nifi::ringbuf",
            Target::Dispatch => "nifi::dispatch",
            Target::Proto => "nifi::proto",
            Target::LocalMp => "nifi::localmp",
            Target::Lan => "nifi::lan",
            Target::Discovery => "nifi::lan::discovery",
            Target::Netplay => "nifi::netplay",
            Target::Rollback => "nifi::netplay::rollback",
            Target::Blob => "nifi::netplay::blob",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installs a `tracing-subscriber` `fmt` layer driven by `RUST_LOG`
/// (defaulting to `info`). Intended for binaries/examples embedding `nifi`;
/// library code should never call this itself.
#[cfg(feature = "init-tracing")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
