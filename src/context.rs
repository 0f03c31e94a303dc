use log::LevelFilter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const MAX_THREAD_COUNT: usize = 20;

const ENGINE_TARGETS: &[&str] = &["ironroast::kerberos::kdc", "ironroast::ldap"];

/// Process-wide settings, built once from the global flags and handed by
/// reference to the orchestrator and to both engines.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub verbosity: u8,
    pub timeout: Duration,
    pub threads: usize,
    cancel: CancelFlag,
}

impl RunContext {
    pub fn new(verbosity: u8, timeout_secs: u64, threads: usize) -> Self {
        Self {
            verbosity,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            threads: threads.clamp(1, MAX_THREAD_COUNT),
            cancel: CancelFlag::default(),
        }
    }

    pub fn core_level(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn engine_level(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }

    /// Whether raw protocol messages should be dumped by the engines.
    pub fn trace_packets(&self) -> bool {
        self.verbosity >= 2
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Installs the logger. `RUST_LOG` still takes precedence when set.
    pub fn init_logging(&self) {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(LevelFilter::Warn);
        builder.filter_module("ironroast", self.core_level());
        for target in ENGINE_TARGETS {
            builder.filter_module(target, self.engine_level());
        }
        if let Ok(spec) = std::env::var("RUST_LOG") {
            builder.parse_filters(&spec);
        }
        let _ = builder.format_timestamp(None).try_init();
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(0, DEFAULT_TIMEOUT_SECS, 1)
    }
}

/// Best-effort cancellation shared between the signal listener and the batch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Listens for Ctrl-C on a helper thread. The first interrupt flags the batch
/// so finished results still get rendered, the second one exits right away.
pub fn install_interrupt_handler(flag: CancelFlag) {
    let spawned = std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::warn!("Interrupt handler unavailable: {}", e);
                    return;
                }
            };

            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                eprintln!("\n[!] Interrupted, finishing in-flight requests (Ctrl-C again to abort)");
                flag.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        });

    if let Err(e) = spawned {
        log::warn!("Interrupt handler unavailable: {}", e);
    }
}
