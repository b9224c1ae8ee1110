//! zin - serve directory trees of HTML with `<zin-*>` tags expanded.

mod cli;
mod config;
mod directives;
mod engine;
mod logger;
mod serve;
mod site;
mod submit;
mod utils;

use anyhow::{Result, bail};
use clap::Parser;
use cli::{Cli, Commands};
use config::{SiteConfig, cfg, init_config};
use engine::Services;
use serve::{Rendered, map_request_path, new_request, render_request, serve_site};
use std::io::Write;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_config(SiteConfig::load(&cli)?);

    match &cli.command {
        Commands::Serve { .. } => serve_site(),
        Commands::Render { path, query, .. } => render_to_stdout(path, query),
    }
}

/// Render one request path the way the server would, without a listener.
fn render_to_stdout(path: &str, query: &[(String, String)]) -> Result<()> {
    let config = cfg();
    let path = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };

    let mut cx = new_request(&config.root, &path, &map_request_path(&path));
    cx.client_ip = "127.0.0.1".into();
    cx.host = "localhost".into();
    for (key, value) in query {
        cx.query.entry(key.clone()).or_insert_with(|| value.clone());
    }
    cx.deadline = Some(Instant::now() + Duration::from_secs(config.serve.timeout));

    let pipeline = directives::standard();
    match render_request(&mut cx, &config.render, &pipeline, &Services::standard()) {
        Rendered::Page(html) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(html.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
        Rendered::Failed { status, summary } => bail!("{path} failed with {status}: {summary}"),
    }
}
