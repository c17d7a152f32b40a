use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use threadview::app::{self, RunOptions};
use threadview::lemmy::CommentSortType;

const HELP: &str = "ThreadView — Read a Lemmy post and its comments from the terminal.

Usage: threadview [options] <post-id | post-url | comment-url>

  --version, -V        Show version and exit
  --help,    -h        Show this help message
  --print              Print the post header and exit
  --file <post.json>   Read the post from a saved file instead of the network
  --sort <sort>        Comment sort: hot, top, new, old, controversial";

fn main() {
    let opts = match parse_args(std::env::args().skip(1)) {
        Ok(Some(opts)) => opts,
        Ok(None) => return,
        Err(err) => {
            eprintln!("error: {err}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(err) = threadview::run(opts) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

/// Returns `None` when a flag was fully handled (help, version).
fn parse_args(args: impl Iterator<Item = String>) -> Result<Option<RunOptions>> {
    let mut opts = RunOptions::default();
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("ThreadView {}", threadview::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(None);
            }
            "--print" => opts.print = true,
            "--file" => {
                let path = args.next().ok_or_else(|| anyhow!("--file needs a path"))?;
                opts.fixture = Some(PathBuf::from(path));
            }
            "--sort" => {
                let key = args.next().ok_or_else(|| anyhow!("--sort needs a value"))?;
                let sort = CommentSortType::from_key(&key)
                    .ok_or_else(|| anyhow!("unknown sort: {key}"))?;
                opts.sort = Some(sort);
            }
            flag if flag.starts_with('-') => bail!("unknown flag: {flag}"),
            target => {
                if opts.target.is_some() {
                    bail!("only one post can be opened at a time");
                }
                opts.target = Some(app::parse_target(target)?);
            }
        }
    }
    Ok(Some(opts))
}
