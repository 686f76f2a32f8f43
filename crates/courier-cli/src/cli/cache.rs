use anyhow::Result;
use clap::{Args, Subcommand};
use url::Url;

use crate::env;

#[derive(Clone, Debug, Subcommand)]
pub enum CacheCommands {
    #[command(alias = "rm", name = "clear", about = "Remove the cached copy of a URL")]
    Clear(ClearArg),
    #[command(name = "path", about = "Print where a URL is cached")]
    Path(PathArg),
}

#[derive(Args, Clone, Debug)]
pub struct ClearArg {
    url: Url,
}

#[derive(Args, Clone, Debug)]
pub struct PathArg {
    url: Url,
}

pub fn run(cmd: CacheCommands) -> Result<()> {
    let transfers = &env::get()?.transfers;
    match cmd {
        CacheCommands::Clear(arg) => {
            if transfers.delete_cached_file(&arg.url)? {
                println!("removed {}", transfers.cache_path_for(&arg.url).display());
            } else {
                println!("nothing cached for {}", arg.url);
            }
        }
        CacheCommands::Path(arg) => println!("{}", transfers.cache_path_for(&arg.url).display()),
    }
    Ok(())
}
