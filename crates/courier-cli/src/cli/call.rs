use anyhow::{Context, Result};
use clap::Args;
use courier::Parameter;

use super::print;
use crate::env;

#[derive(Args, Clone, Debug)]
pub struct CallArg {
    key: String,
    #[arg(long = "arg", value_name = "VALUE", help = "URL template value, in order")]
    args: Vec<String>,
    #[arg(long = "param", value_name = "KEY=VALUE", help = "Request parameter")]
    params: Vec<String>,
}

fn parameter(raw: &str) -> Result<Parameter> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Parameter `{raw}` is not KEY=VALUE"))?;
    Ok(match value.strip_prefix('@') {
        Some(path) => Parameter::file(name, path),
        None => Parameter::text(name, value),
    })
}

pub async fn run(arg: CallArg) -> Result<()> {
    let env = env::get()?;
    let parameters = arg.params.iter().map(|p| parameter(p)).collect::<Result<Vec<_>>>()?;
    let request = env
        .dispatch
        .make_request(&arg.key, None, &arg.args, parameters, true)
        .with_context(|| format!("Failed to build request `{}`", arg.key))?;
    print::response(&request.finished().await)
}
