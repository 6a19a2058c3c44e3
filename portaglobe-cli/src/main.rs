//! Portaglobe CLI - serve globes and manage publish points.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use portaglobe::config::ServerConfig;
use portaglobe::publish::{
    LocalServingRegistry, PublishCatalog, PublishContext, PublishDef, PublishManager,
    PublishManagerConfig,
};
use portaglobe::quadtree::qt_node_from_level;
use portaglobe::search::backend_for_config;
use portaglobe::server::{AppState, GlobeSessions};
use portaglobe::unpacker::NoPackageDecoder;

#[derive(Parser)]
#[command(name = "portaglobe", version = portaglobe::VERSION)]
#[command(about = "Portable globe server and publish manager", long_about = None)]
struct Args {
    /// Configuration file (defaults to ~/.portaglobe/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the tile and administration server
    Serve {
        /// Port override
        #[arg(long)]
        port: Option<u16>,
    },

    /// Register (push) a database or portable globe into the catalog
    Push {
        /// Database name: assetroot path or globe path
        #[arg(long)]
        db: String,

        /// Fusion client host (Fusion databases only)
        #[arg(long, default_value = "")]
        host: String,

        /// Human-readable name
        #[arg(long, default_value = "")]
        pretty: String,
    },

    /// Publish a pushed database under a target path
    Publish {
        /// Target path, e.g. /sf
        #[arg(long)]
        target: String,

        /// Virtual host name
        #[arg(long, default_value = "default_host")]
        virtual_host: String,

        /// Database name: assetroot path or globe path
        #[arg(long)]
        db: String,

        /// Fusion client host (Fusion databases only)
        #[arg(long, default_value = "")]
        host: String,

        /// Expose the target through the WMS endpoint
        #[arg(long)]
        serve_wms: bool,
    },

    /// Unpublish a target path
    Unpublish {
        /// Target path, e.g. /sf
        #[arg(long)]
        target: String,
    },

    /// List published targets
    Targets,

    /// Unpublish databases whose files no longer exist
    Cleanup,

    /// Rebuild serving registrations and rewrite rules from the catalog
    Reset,

    /// Convert tile coordinates to a quadtree address
    Qtnode {
        #[arg(long)]
        level: u8,

        #[arg(long)]
        col: u32,

        #[arg(long)]
        row: u32,
    },

    /// Show metadata for a globe container
    Info {
        /// Globe container path
        globe: PathBuf,
    },
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    match &args.config {
        Some(path) => ServerConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => ServerConfig::load().context("loading config"),
    }
}

fn build_manager(config: &ServerConfig) -> Result<PublishManager> {
    let catalog = PublishCatalog::open(&config.publish.catalog_path)
        .with_context(|| format!("opening catalog {}", config.publish.catalog_path.display()))?;
    let serving = Arc::new(LocalServingRegistry::new());
    let manager_config = PublishManagerConfig::new(
        &config.publish.htaccess_path,
        &config.publish.publish_root,
        &config.globe.directory,
    );
    Ok(PublishManager::new(catalog, serving, manager_config))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Serve { port } => {
            let _guard = portaglobe::logging::init_logging(
                portaglobe::logging::default_log_dir(),
                portaglobe::logging::default_log_file(),
            )
            .context("initializing logging")?;
            run_server(config, port)
        }
        other => {
            // One-shot commands log to stderr only.
            run_command(other, config)
        }
    }
}

fn run_server(config: ServerConfig, port_override: Option<u16>) -> Result<()> {
    let port = port_override.unwrap_or(config.port);
    let manager = Arc::new(build_manager(&config)?);
    let sessions = Arc::new(GlobeSessions::new(Arc::new(NoPackageDecoder)));
    let search = Arc::from(backend_for_config(
        &config.search.database,
        &config.search.spool_directory,
    ));

    // Serve the configured initial globe when it exists; the admin
    // endpoint can select another at runtime.
    let initial = config.initial_globe_path();
    if initial.exists() {
        match sessions.select(&initial) {
            Ok(globe) => println!("Serving globe: {}", globe.name()),
            Err(e) => eprintln!("Cannot serve initial globe {}: {}", initial.display(), e),
        }
    }

    let state = AppState {
        sessions,
        manager,
        search,
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "starting portaglobe server");

    let runtime = tokio::runtime::Runtime::new().context("creating runtime")?;
    runtime
        .block_on(portaglobe::server::serve(addr, state))
        .context("server error")
}

fn run_command(command: Command, config: ServerConfig) -> Result<()> {
    let manager = build_manager(&config)?;

    match command {
        Command::Serve { .. } => unreachable!("handled by caller"),

        Command::Push { db, host, pretty } => {
            let (db_name, db_type) = portaglobe::publish::identify_published_db(&db)?;
            if db_type.is_fusion() && host.is_empty() {
                bail!("Fusion databases require --host");
            }
            let host = if db_type.is_fusion() { host } else { String::new() };
            let db_id = manager
                .catalog()
                .register_database(&host, &db_name, &pretty, 0, 0)?;
            println!("Pushed {} (id {})", db_name, db_id);
            Ok(())
        }

        Command::Publish {
            target,
            virtual_host,
            db,
            host,
            serve_wms,
        } => {
            let (db_name, db_type) = portaglobe::publish::identify_published_db(&db)?;
            manager.publish(&PublishDef {
                target_path: target.clone(),
                virtual_host_name: virtual_host,
                db_name,
                client_host_name: host,
                db_type,
                serve_wms,
                context: PublishContext::default(),
            })?;
            println!("Published {} at {}", db, target);
            Ok(())
        }

        Command::Unpublish { target } => {
            match manager.unpublish(&target)? {
                Some((_, db_name)) => println!("Unpublished {} from {}", db_name, target),
                None => println!("Nothing published at {}", target),
            }
            Ok(())
        }

        Command::Targets => {
            let targets = manager.catalog().publish_info_list()?;
            if targets.is_empty() {
                println!("No published targets.");
                return Ok(());
            }
            for (target_path, host_name, db_name) in targets {
                if host_name.is_empty() {
                    println!("{}  {}", target_path, db_name);
                } else {
                    println!("{}  {}  [{}]", target_path, db_name, host_name);
                }
            }
            Ok(())
        }

        Command::Cleanup => {
            let unpublished = manager.cleanup()?;
            if unpublished.is_empty() {
                println!("Nothing to clean up.");
            }
            for (host, path) in unpublished {
                println!("Unpublished stale database {} [{}]", path, host);
            }
            Ok(())
        }

        Command::Reset => {
            manager.reset()?;
            println!("Serving registrations and rewrite rules rebuilt.");
            Ok(())
        }

        Command::Qtnode { level, col, row } => {
            let qtnode = qt_node_from_level(level, col, row)?;
            println!("{}", qtnode);
            Ok(())
        }

        Command::Info { globe } => {
            use portaglobe::globe::GlobeHandle;
            use portaglobe::info::{GlobeInfo, INFO_FILE_PATH};

            // Top-level files are enough for metadata; skip the packet
            // index.
            let handle = GlobeHandle::open_files_only(&globe, &NoPackageDecoder)
                .with_context(|| format!("opening {}", globe.display()))?;

            let descriptor = handle.descriptor();
            println!("Globe: {}", handle.name());
            println!(
                "Kind: {:?}  2d: {}  3d: {}  composite: {}  mbtiles: {}",
                descriptor.kind,
                descriptor.is_2d,
                descriptor.is_3d,
                descriptor.is_composite,
                descriptor.is_mbtiles
            );
            if let Ok(version) = handle.version() {
                println!("Format version: {}", version);
            }
            if let Ok(content) = handle.read_file(INFO_FILE_PATH) {
                let info = GlobeInfo::parse(handle.name(), &String::from_utf8_lossy(&content));
                if let Some(created) = info.created {
                    println!("Created: {}", created);
                }
                if !info.description.is_empty() {
                    println!("{}", info.description);
                }
            }
            Ok(())
        }
    }
}
