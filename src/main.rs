//! shelf-rs server entry point.

use clap::Parser;
use shelf_rs::{
    config::{Cli, Command, Config, IndexCommand, LibraryCommand},
    db::Database,
    events::TracingEventSink,
    hash::Blake3Hasher,
    imaging::ImageCrateConverter,
    library::Library,
    server,
    services::Services,
    tasks::{DEFAULT_PRIORITY, HIGHEST_PRIORITY, TaskHandler, TaskQueue, TaskWorkers, drain_blocking},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelf_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::Library { action }) => cmd_library(action, &config).await,
        Some(Command::Index { action }) => cmd_index(action, &config).await,
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
    }
}

/// Open the database and wire the services against a fresh queue.
fn open(config: &Config) -> anyhow::Result<(Database, Arc<TaskQueue>, Services)> {
    if let Some(parent) = config.database.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(&config.database.path)?;
    let queue = Arc::new(TaskQueue::new());
    let services = Services::new(
        config,
        db.clone(),
        Arc::new(TracingEventSink),
        Arc::new(ImageCrateConverter),
        Arc::new(Blake3Hasher),
        queue.clone(),
    );
    Ok((db, queue, services))
}

/// Initialize config and database.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    open(&config)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nEdit config.toml to configure your server.");
    println!("Then run: shelf-rs library add <name> --path /path/to/comics");

    Ok(())
}

fn find_library(db: &Database, name: &str) -> anyhow::Result<Library> {
    db.get_library_by_name(name)?
        .ok_or_else(|| anyhow::anyhow!("Library not found: {}", name))
}

/// Library management commands.
async fn cmd_library(action: LibraryCommand, config: &Config) -> anyhow::Result<()> {
    let (db, queue, services) = open(config)?;

    match action {
        LibraryCommand::Add {
            name,
            path,
            repair_extensions,
            convert_to_cbz,
            no_local_artwork,
        } => {
            if !path.is_dir() {
                anyhow::bail!("Path is not a directory: {}", path.display());
            }
            if db.get_library_by_name(&name)?.is_some() {
                anyhow::bail!("Library already exists: {}", name);
            }

            let library = Library {
                repair_extensions,
                convert_to_cbz,
                import_local_artwork: !no_local_artwork,
                ..Library::new(&name, path.canonicalize()?)
            };
            db.create_library(&library)?;
            println!("Added library: {} -> {}", name, library.path.display());
        }

        LibraryCommand::Del { name } => {
            let library = find_library(&db, &name)?;
            services.library_content.delete_library(&library)?;
            println!("Deleted library: {}", name);
        }

        LibraryCommand::List => {
            let libraries = db.list_libraries()?;
            if libraries.is_empty() {
                println!("No libraries found.");
            } else {
                println!("{:<20} {:<50} OPTIONS", "NAME", "PATH");
                println!("{}", "-".repeat(80));
                for lib in libraries {
                    let mut options = Vec::new();
                    if lib.repair_extensions {
                        options.push("repair");
                    }
                    if lib.convert_to_cbz {
                        options.push("cbz");
                    }
                    if lib.import_local_artwork {
                        options.push("artwork");
                    }
                    println!(
                        "{:<20} {:<50} {}",
                        lib.name,
                        lib.path.display(),
                        options.join(",")
                    );
                }
            }
        }

        LibraryCommand::Scan { name } => {
            let libraries = match name {
                Some(name) => vec![find_library(&db, &name)?],
                None => db.list_libraries()?,
            };
            if libraries.is_empty() {
                println!("No libraries to scan.");
                return Ok(());
            }

            for lib in &libraries {
                println!("Scanning library: {} ({})", lib.name, lib.path.display());
                services.emitter.scan_library(&lib.id, HIGHEST_PRIORITY);
            }

            let handler = TaskHandler::new(db.clone(), services);
            let handled = tokio::task::spawn_blocking(move || drain_blocking(&queue, &handler)).await?;
            println!("Ran {} tasks, {} books in database.", handled, db.count_books()?);
        }

        LibraryCommand::EmptyTrash { name } => {
            let library = find_library(&db, &name)?;
            let purged = services.library_content.empty_trash(&library)?;
            println!("Purged {} entries from {}", purged, name);
        }
    }

    Ok(())
}

/// Search index commands.
async fn cmd_index(action: IndexCommand, config: &Config) -> anyhow::Result<()> {
    let (_db, _queue, services) = open(config)?;

    match action {
        IndexCommand::Rebuild { query } => {
            let documents = services.search.rebuild()?;
            println!("Indexed {} documents.", documents);

            if let Some(query) = query {
                for entry in services.search.search(&query) {
                    println!("{:<8} {:<36} {}", format!("{:?}", entry.kind), entry.id, entry.title);
                }
            }
        }
    }

    Ok(())
}

fn schedule_scans(services: &Services, db: &Database, priority: i32) {
    match db.list_libraries() {
        Ok(libraries) => {
            for library in libraries {
                services.emitter.scan_library(&library.id, priority);
            }
        }
        Err(e) => tracing::warn!(error = %e, "Cannot list libraries for scheduled scan"),
    }
}

/// Start the server and the task workers.
async fn cmd_serve(mut config: Config, bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    let (db, queue, services) = open(&config)?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        "Starting shelf-rs server"
    );

    if db.list_libraries()?.is_empty() {
        tracing::warn!(
            "No libraries configured. Add one with: shelf-rs library add <name> --path /path/to/comics"
        );
    }

    let shutdown = CancellationToken::new();
    let handler = TaskHandler::new(db.clone(), services.clone());
    let workers = TaskWorkers::start(queue.clone(), handler, &config.tasks, shutdown.clone());

    // Initial scan and index
    schedule_scans(&services, &db, DEFAULT_PRIORITY);
    services.emitter.rebuild_index(DEFAULT_PRIORITY);

    if config.scan.interval_seconds > 0 {
        let services = services.clone();
        let db = db.clone();
        let interval = Duration::from_secs(config.scan.interval_seconds);
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        tracing::debug!("Running scheduled library rescan");
                        schedule_scans(&services, &db, DEFAULT_PRIORITY);
                    }
                }
            }
        });
    }

    let state = server::AppState::new(config.clone(), db, services, queue);
    let app = server::create_router(state);

    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Server listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Cannot listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    workers.join().await;
    Ok(())
}
