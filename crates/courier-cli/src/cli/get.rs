use anyhow::{Context, Result};
use clap::Args;
use courier::{RequestConfig, ResultKind};
use url::Url;

use super::print;
use crate::env;

#[derive(Args, Clone, Debug)]
pub struct GetArg {
    url: Url,
    #[arg(long, help = "Decode the body as JSON")]
    json: bool,
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", help = "Extra request header")]
    headers: Vec<String>,
}

pub async fn run(arg: GetArg) -> Result<()> {
    let env = env::get()?;
    let kind = if arg.json { ResultKind::Json } else { ResultKind::Text };
    let mut config = RequestConfig::get(arg.url).expect(kind);
    for header in &arg.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("Header `{header}` is not NAME:VALUE"))?;
        config = config.header(name.trim(), value.trim());
    }

    let request = env.dispatch.request(config, None)?;
    env.dispatch.enqueue(&request);
    print::response(&request.finished().await)
}
