use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::{cache, call, download, get};

#[derive(Clone, Debug, Parser)]
#[command(name = "courier", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    #[arg(short, long, global = true, help = "Log debug output to stderr")]
    pub verbose: bool,
    #[arg(short, long, global = true, default_value = "courier.toml", help = "Configuration file")]
    pub config:  PathBuf,
    #[command(subcommand)]
    pub cmd:     Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "g", name = "get", about = "Fetch a URL and print the body")]
    Get(get::GetArg),
    #[command(alias = "c", name = "call", about = "Call a configured endpoint")]
    Call(call::CallArg),
    #[command(alias = "dl", name = "download", about = "Download a URL into the cache")]
    Download(download::DownloadArg),
    #[command(subcommand, name = "cache")]
    Cache(cache::CacheCommands),
}
