pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod filter;
pub mod render;
pub mod repo;
pub mod session;
pub mod stats;
pub mod store;
pub mod task;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use crate::session::{ConfigIdentity, IdentityProvider, UserId};
use crate::store::{HttpRemoteStore, LocalStore, RemoteStore};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting drift CLI");

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(cli.overrides.into_iter().map(|kv| (kv.key, kv.value)));

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let local = LocalStore::open(&data_dir)
        .with_context(|| format!("failed to open local store at {}", data_dir.display()))?;

    let remote_cfg = cfg.remote().clone();
    let remote: Option<Arc<dyn RemoteStore>> = match (&remote_cfg.url, &remote_cfg.api_key) {
        (Some(url), Some(api_key)) => {
            debug!(url = %url, "remote store configured");
            Some(Arc::new(HttpRemoteStore::new(url, api_key)?))
        }
        _ => None,
    };

    let identity: Arc<dyn IdentityProvider> =
        Arc::new(ConfigIdentity::new(remote_cfg.user.map(UserId)));
    let remote_expected = remote.is_some() && identity.current().is_some();

    let mut repo = repo::TaskRepository::new(local, remote, identity);
    let mut renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(cli.rest)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    runtime.block_on(commands::dispatch(
        &mut repo,
        &mut renderer,
        remote_expected,
        inv,
    ))?;

    info!("done");
    Ok(())
}
