use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use env_logger::Builder;
use log::{debug, info, warn, LevelFilter};
use tokio::signal;

use routerd::conf::store::{self, SnapshotStore};
use routerd::dispatch::CaptureSession;
use routerd::{commit, config, daemon, server, Context, DaemonConfig, DaemonKind, Privilege};

#[derive(Parser, Debug)]
#[clap(name = "routerd", rename_all = "kebab-case")]
/// Routing daemon control plane
pub struct Args {
    /// Daemon to run: rib, bgp or rip
    pub daemon: DaemonKind,
    /// Path to daemon config.toml. If not provided, built-in defaults are used
    #[clap(short, long)]
    pub config_path: Option<String>,
    /// Remote terminal listening address/port (E.g. 127.0.0.1:2001). If not provided, will fall back to config file value
    #[clap(long)]
    pub listen: Option<SocketAddr>,
    /// Stop loading the saved configuration at its first failing line
    #[clap(long)]
    pub strict_load: bool,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences), global = true)]
    pub verbose: u8,
}

/// Replay the most recent snapshot into the candidate and commit it
fn load_last(ctx: &mut Context, strict: bool) -> Result<(), Box<dyn Error>> {
    let last = match &ctx.store {
        Some(store) => store.find_last()?,
        None => None,
    };
    let (id, path) = match last {
        Some(last) => last,
        None => {
            info!("No saved configuration found");
            return Ok(());
        }
    };
    let mut session = CaptureSession::new(Privilege::Config);
    let loaded = store::load(ctx, &path, &mut session, strict)?;
    if loaded.bad > 0 {
        warn!("{} line(s) of {} were not loaded", loaded.bad, path.display());
    }
    let report = commit(ctx)?;
    info!(
        "Configuration {} is active ({} unit(s) applied)",
        id, report.applied
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let (routerd_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("routerd"), routerd_level)
        .filter(None, other_level)
        .init();
    info!("Logging at levels {}/{}", routerd_level, other_level);

    let mut config = match &args.config_path {
        Some(path) => config::from_file(path, args.daemon)?,
        None => DaemonConfig::default_for(args.daemon),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    debug!("{} daemon settings: {:?}", args.daemon, config);

    let dataplane = config.dataplane();
    let tree = daemon::build(args.daemon, &dataplane)?;
    let store = SnapshotStore::new(&config.config_path_prefix, config.max_config_files);
    let mut ctx = Context::new(args.daemon.name(), Arc::new(tree)).with_store(store);
    load_last(&mut ctx, args.strict_load)?;

    let listener = server::bind(config.listen).await?;
    tokio::select! {
        result = server::serve(listener, ctx) => result?,
        _ = signal::ctrl_c() => info!("Stopping routerd {} daemon...", args.daemon),
    }
    Ok(())
}
