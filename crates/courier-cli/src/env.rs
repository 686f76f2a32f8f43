//! The process-wide managers every subcommand shares.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use courier::trust::{ChallengeHandler, ChallengeResponder};
use courier::{CourierConfig, DispatchManager, TlsChallenge, TransferManager};
use once_cell::sync::OnceCell;

pub struct CourierEnv {
    pub config:    CourierConfig,
    pub dispatch:  DispatchManager,
    pub transfers: TransferManager,
}

static ENV: OnceCell<CourierEnv> = OnceCell::new();

/// Load configuration from `path` and build the default managers. Later
/// calls return the instance built first.
pub fn init(path: &Path) -> Result<&'static CourierEnv> {
    ENV.get_or_try_init(|| {
        let config = CourierConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))?;
        let dispatch = config
            .dispatch_manager(Arc::new(config.transport()))
            .context("Invalid endpoint table")?;
        if config.tls_policy.prompts() {
            dispatch.set_default_tls_policy(config.tls_policy, Some(Arc::new(TerminalPrompt)));
        }
        let transfers = config.transfer_manager(dispatch.clone());
        tracing::debug!(cache_dir = %config.cache_dir().display(), "courier environment ready");
        Ok(CourierEnv {
            config,
            dispatch,
            transfers,
        })
    })
}

pub fn get() -> Result<&'static CourierEnv> { ENV.get().context("courier environment is not initialised") }

/// Asks on the terminal whether an untrusted certificate may be used.
struct TerminalPrompt;

impl ChallengeHandler for TerminalPrompt {
    fn on_challenge(&self, challenge: TlsChallenge, responder: ChallengeResponder) {
        std::thread::spawn(move || {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(
                stderr,
                "The certificate for {} is not trusted ({}).\nFingerprint: {}",
                challenge.host(),
                challenge.reason(),
                challenge.fingerprint()
            );
            let _ = write!(stderr, "Continue anyway? [y/N] ");
            let _ = stderr.flush();

            let mut answer = String::new();
            let allowed = std::io::stdin().lock().read_line(&mut answer).is_ok()
                && matches!(answer.trim(), "y" | "Y" | "yes");
            responder.respond(allowed);
        });
    }
}
