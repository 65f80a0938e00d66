use btmd_log as logging;

macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {{
        if crate::logging::enabled($level) {
            crate::logging::log($level, module_path!(), file!(), line!(), format_args!($($arg)*));
        }
    }};
}

macro_rules! log_warn {
    ($($arg:tt)*) => {{
        log_at!(crate::logging::Level::Warn, $($arg)*);
    }};
}

macro_rules! log_info {
    ($($arg:tt)*) => {{
        log_at!(crate::logging::Level::Info, $($arg)*);
    }};
}

macro_rules! log_debug {
    ($($arg:tt)*) => {{
        log_at!(crate::logging::Level::Debug, $($arg)*);
    }};
}

pub mod config;
mod import;

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use btmd_chainstate::{ChainConfig, ChainHandle, ChainStore, Store, ValidationFlags};
use btmd_consensus::{chain_params, hash256_to_hex};
use btmd_storage::fjall::{FjallOptions, FjallStore};
use btmd_storage::memory::MemoryStore;
use fs2::FileExt;

use crate::config::{Backend, CliAction, Config};

const DATA_DIR_LOCK_FILE_NAME: &str = ".lock";
const DB_DIR_NAME: &str = "db";

struct DataDirLock {
    _file: File,
}

fn lock_data_dir(data_dir: &Path) -> Result<DataDirLock, String> {
    let lock_path = data_dir.join(DATA_DIR_LOCK_FILE_NAME);
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|err| format!("failed to open lock file {}: {err}", lock_path.display()))?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = file.flush();
            Ok(DataDirLock { _file: file })
        }
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
            let mut holder = String::new();
            let _ = File::open(&lock_path).and_then(|mut reader| reader.read_to_string(&mut holder));
            let holder = holder.trim();
            let suffix = if holder.is_empty() {
                String::new()
            } else {
                format!(" ({holder})")
            };
            Err(format!(
                "data dir {} is already locked (another btmd instance may be running); lock file {}{suffix}",
                data_dir.display(),
                lock_path.display()
            ))
        }
        Err(err) => Err(format!(
            "failed to lock data dir {} (lock file {}): {err}",
            data_dir.display(),
            lock_path.display()
        )),
    }
}

/// Keeps the concrete fjall handle next to the type-erased store so it can
/// be flushed on the way out.
struct OpenedStore {
    store: Arc<dyn Store>,
    fjall: Option<Arc<FjallStore>>,
}

fn open_store(config: &Config, network_dir: &Path) -> Result<OpenedStore, String> {
    match config.backend {
        Backend::Memory => Ok(OpenedStore {
            store: Arc::new(ChainStore::new(MemoryStore::new())),
            fjall: None,
        }),
        Backend::Fjall => {
            let db_path = network_dir.join(DB_DIR_NAME);
            let options = FjallOptions {
                sync_meta: true,
                ..FjallOptions::default()
            };
            let db = FjallStore::open_with_options(&db_path, options)
                .map_err(|err| format!("failed to open {}: {err}", db_path.display()))?;
            let db = Arc::new(db);
            Ok(OpenedStore {
                store: Arc::new(ChainStore::new(Arc::clone(&db))),
                fjall: Some(db),
            })
        }
    }
}

pub fn chain_config(config: &Config) -> ChainConfig {
    let params = chain_params(config.network);
    ChainConfig {
        queue_capacity: config.queue_capacity,
        max_orphans: config.max_orphans,
        orphan_ttl: Duration::from_secs(config.orphan_ttl_secs),
        validation: ValidationFlags {
            check_pow: config.check_pow,
        },
        ..ChainConfig::from_params(&params)
    }
}

pub async fn run_entry() -> Result<(), String> {
    match config::parse_args()? {
        CliAction::PrintHelp => {
            println!("{}", config::usage());
            Ok(())
        }
        CliAction::PrintVersion => {
            println!("btmd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliAction::Run(config) => run_with_config(config).await,
    }
}

async fn run_with_config(config: Config) -> Result<(), String> {
    let start_time = Instant::now();
    logging::init(logging::LogConfig {
        level: config.log_level,
        format: config.log_format,
        timestamps: config.log_timestamps,
    });
    log_info!(
        "Startup: network={} backend={} data_dir={} check_pow={} queue={} max_orphans={} orphan_ttl={}s",
        config.network,
        config.backend.as_str(),
        config.data_dir.display(),
        config.check_pow,
        config.queue_capacity,
        config.max_orphans,
        config.orphan_ttl_secs
    );

    let network_dir = config.network_dir();
    fs::create_dir_all(&network_dir)
        .map_err(|err| format!("failed to create {}: {err}", network_dir.display()))?;
    let _data_dir_lock = lock_data_dir(&network_dir)?;

    let opened = open_store(&config, &network_dir)?;
    let params = chain_params(config.network);
    let chain = ChainHandle::start(Arc::clone(&opened.store), &params, chain_config(&config))
        .map_err(|err| format!("failed to start chain: {err}"))?;
    log_info!(
        "Chain ready in {}ms: tip {} height {}",
        start_time.elapsed().as_millis(),
        hash256_to_hex(&chain.best_hash()),
        chain.best_height()
    );

    if let Some(path) = &config.import {
        let summary = import::import_file(&chain, path).await?;
        log_info!(
            "Imported {}: {} accepted, {} orphaned, {} rejected",
            path.display(),
            summary.accepted,
            summary.orphaned,
            summary.rejected
        );
    }

    log_info!("Running; press ctrl-c to stop");
    if let Err(err) = tokio::signal::ctrl_c().await {
        log_warn!("failed to listen for ctrl-c: {err}");
    }

    log_info!("Shutdown: stopping chain worker");
    chain
        .shutdown()
        .await
        .map_err(|err| format!("chain shutdown failed: {err}"))?;
    if let Some(db) = &opened.fjall {
        db.persist()
            .map_err(|err| format!("failed to flush store: {err}"))?;
    }
    log_info!(
        "Shutdown: tip {} height {}",
        hash256_to_hex(&chain.best_hash()),
        chain.best_height()
    );
    Ok(())
}
