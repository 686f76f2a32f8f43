use std::path::Path;

use anyhow::{Result, bail};
use clap::Args;
use courier::DownloadOptions;
use url::Url;

use crate::env;
use crate::ui::tracker::ProgressTracker;

#[derive(Args, Clone, Debug)]
pub struct DownloadArg {
    url: Url,
    #[arg(long, help = "Refresh the cached copy if the remote file changed")]
    update: bool,
    #[arg(long, help = "Download to a temporary file, bypassing the cache")]
    no_cache: bool,
}

pub async fn run(arg: DownloadArg) -> Result<()> {
    let env = env::get()?;
    let transfers = &env.transfers;
    if arg.no_cache {
        transfers.set_cache_downloads(false);
    }

    let name = arg.url.path_segments().and_then(|mut s| s.next_back()).unwrap_or("download");
    let tracker = ProgressTracker::new(name);
    let bar = tracker.clone();
    let mut options = DownloadOptions::new().observer(move |p: f32| bar.set_fraction(p));
    if arg.update {
        options = options.update_check(|path: &Path| eprintln!("updated {}", path.display()));
    }

    let outcome = transfers.download(&arg.url, options).await;
    match outcome.result() {
        Ok(path) => {
            tracker.finish(if outcome.from_cache() { "cached" } else { "done" });
            println!("{}", path.display());
        }
        Err(error) => {
            tracker.abandon("failed");
            bail!("{error}");
        }
    }

    // The update check runs after the cached copy was reported.
    if let Some(outcome) = transfers.wait_for_download(&arg.url).await {
        if let Err(error) = outcome.result() {
            tracing::warn!(%error, "update check failed");
        }
    }
    Ok(())
}
