//! Runs the configured statement hooks over SQL read from a file or stdin
//! and prints the statements the proxy would forward.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use globid_hook::{
    register_global_id_hook, GlobalIdRewriter, HookOutcome, HookParams, HookPipeline,
    HookRegistry, ProxyConfig,
};
use globid_sql::{parse_statement, render};
use globid_store::IdCache;

#[derive(Parser)]
#[command(name = "globid")]
#[command(about = "Assign global ids to INSERT statements of configured tables", long_about = None)]
struct Args {
    /// Proxy configuration file (JSON).
    #[arg(long, short)]
    config: PathBuf,
    /// Id cache directory; overrides the configured one.
    #[arg(long)]
    cache: Option<PathBuf>,
    /// Schema for unqualified table names; overrides the configured one.
    #[arg(long)]
    schema: Option<String>,
    /// File with one statement per line. Reads stdin when omitted.
    input: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = ProxyConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    if let Some(path) = args.cache {
        config.cache.path = path;
    }
    let columns = Arc::new(config.global_id_config()?);
    let cache = Arc::new(
        IdCache::open(&config.cache.path, config.cache.store_options())
            .with_context(|| format!("opening id cache {}", config.cache.path.display()))?,
    );

    let registry = HookRegistry::global();
    register_global_id_hook(registry, GlobalIdRewriter::new(cache.clone(), columns))?;
    let pipeline = HookPipeline::from_registry(registry, config.hooks.as_slice())?;
    let default_schema = args.schema.unwrap_or_else(|| config.default_schema.clone());

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut rejected = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let sql = line.trim();
        if sql.is_empty() || sql.starts_with("--") {
            continue;
        }
        let mut tree = match parse_statement(sql) {
            Ok(tree) => tree,
            Err(err) => {
                log::warn!("line {}: {err}", index + 1);
                rejected += 1;
                continue;
            }
        };

        let mut params = HookParams::new(default_schema.clone());
        let outcomes = pipeline.run(&mut tree, &mut params);
        if let Some((hook, HookOutcome::Failed(err))) =
            outcomes.iter().find(|(_, outcome)| outcome.is_failure())
        {
            eprintln!("line {}: {hook} rejected statement: {err}", index + 1);
            rejected += 1;
            continue;
        }
        writeln!(out, "{};", render(&tree))?;
    }
    out.flush()?;
    cache.close()?;

    if rejected > 0 {
        anyhow::bail!("{rejected} statement(s) rejected");
    }
    Ok(())
}
