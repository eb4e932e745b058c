//! mounthub command line entry point

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mounthub::cache::ObjectCache;
use mounthub::config::Config;
use mounthub::download::aria2::Aria2Client;
use mounthub::download::{DownloadManager, TaskState};
use mounthub::fs::{Fs, ListContext};
use mounthub::model::LinkArgs;
use mounthub::mount::MountTable;
use mounthub::operations::StorageOps;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: mounthub <config.yaml> <command> [args]");
    eprintln!();
    eprintln!("mounthub - many storage backends behind one virtual path namespace");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  ls <path>               List a virtual directory");
    eprintln!("  mkdir <path>            Create a directory and its parents");
    eprintln!("  rm <path>               Remove a file or directory");
    eprintln!("  link <path>             Print the access link of a file");
    eprintln!("  fetch <uri> <dst-dir>   Download a URI into a virtual directory");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  mounthub /etc/mounthub/config.yaml ls /pub");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);

    // Load configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Loaded configuration from {:?}", config_path);

    // Mount all configured accounts
    let mounts = Arc::new(MountTable::new());
    for account in &config.accounts {
        let driver = match mounthub::driver::build(
            account.account.clone(),
            &account.driver,
            account.config.clone(),
        ) {
            Ok(driver) => driver,
            Err(e) => {
                error!(
                    "Failed to set up account {}: {}",
                    account.account.virtual_path, e
                );
                continue;
            }
        };
        if let Err(e) = mounts.mount(driver) {
            error!("Failed to mount {}: {}", account.account.virtual_path, e);
        }
    }

    if mounts.count() == 0 {
        error!("No accounts were mounted successfully");
        std::process::exit(1);
    }

    let ops = Arc::new(StorageOps::new(Arc::new(ObjectCache::new(
        config.cache.clone(),
    ))));
    let fs = Arc::new(Fs::new(mounts, ops).with_metas(config.metas.clone()));

    let command = args[2].as_str();
    let target = args[3].as_str();
    match command {
        "ls" => {
            let ctx = ListContext {
                can_see_hides: false,
                meta: fs.nearest_meta(target),
            };
            for obj in fs.list(target, ctx, false).await? {
                println!(
                    "{} {:>12} {} {}",
                    if obj.is_folder { "d" } else { "-" },
                    obj.size,
                    obj.modified.format("%Y-%m-%d %H:%M"),
                    obj.name
                );
            }
        }
        "mkdir" => fs.make_dir(target).await?,
        "rm" => fs.remove(target).await?,
        "link" => {
            let (link, _) = fs.link(target, &LinkArgs::default()).await?;
            println!("{}", link.url);
        }
        "fetch" => {
            let dst_dir = match args.get(4) {
                Some(dst) => dst.as_str(),
                None => {
                    print_usage();
                    std::process::exit(1);
                }
            };
            fetch(&config, fs, target, dst_dir).await?;
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Download `uri` into `dst_dir`, blocking until the task finishes
async fn fetch(
    config: &Config,
    fs: Arc<Fs>,
    uri: &str,
    dst_dir: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let download_config = config.downloader.clone().ok_or("no downloader configured")?;
    let client = Arc::new(Aria2Client::new(&download_config)?);
    let manager =
        DownloadManager::connect(fs, client, download_config, config.temp_dir.clone()).await?;

    let id = manager.add_uri(uri, dst_dir).await?;
    info!("Submitted download {}", id);

    // Set up signal handling for cancellation
    let m = manager.clone();
    let task_id = id.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt, canceling download");
        if let Err(e) = m.cancel(&task_id) {
            error!("Failed to cancel {}: {}", task_id, e);
        }
    })?;

    let task = manager.wait(&id).await?;
    match task.state {
        TaskState::Succeeded => {
            println!("downloaded {} into {}", uri, dst_dir);
            Ok(())
        }
        TaskState::Canceled => Err("download canceled".into()),
        _ => Err(task
            .error
            .unwrap_or_else(|| "download failed".to_string())
            .into()),
    }
}
