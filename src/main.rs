//! Vigil FTP server entry point.
//!
//! Brings up storage, the integrity gate and its watchdog, then serves
//! control connections one at a time.

use std::io::Write;
use std::path::Path;
use std::process;
use std::sync::Arc;

use log::{error, info};

use vigil_ftp_server::Server;
use vigil_ftp_server::config::ServerConfig;
use vigil_ftp_server::integrity::IntegrityGate;
use vigil_ftp_server::storage::{FileStore, LocalFileStore};
use vigil_ftp_server::watchdog;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match ServerConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("configuration error: {e}");
            process::exit(1);
        }
    };

    // No storage, no server: everything else depends on it.
    let store: Arc<dyn FileStore> = match LocalFileStore::new(&config.storage_root) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("ALERT: storage root {} unavailable: {e}", config.storage_root);
            process::exit(1);
        }
    };

    let records_dir = Path::new(&config.storage_root).join(".integrity");
    let gate = Arc::new(IntegrityGate::new(store.clone(), records_dir));

    bootstrap_protected_files(&config, store.as_ref(), &gate);

    watchdog::start(
        gate.clone(),
        config.protected_paths.clone(),
        config.watchdog_interval(),
    );

    let server = match Server::bind(config.clone(), store, gate).await {
        Ok(server) => server,
        Err(e) => {
            error!("ALERT: failed to bind control listener: {e}");
            process::exit(1);
        }
    };

    info!("FTP server starting on {}", config.control_socket());
    server.run().await;
}

/// Creates any missing protected file and baselines integrity records.
///
/// Existing records are kept so a reboot cannot launder a tampered
/// file; only paths without a record get a fresh baseline.
fn bootstrap_protected_files(config: &ServerConfig, store: &dyn FileStore, gate: &IntegrityGate) {
    for name in &config.protected_paths {
        if !store.exists(name) {
            match store.open_write(name) {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(b"Protected by tamper detection.\n") {
                        error!("ALERT: cannot seed protected file {name}: {e}");
                        continue;
                    }
                    info!("created protected file {name}");
                }
                Err(e) => {
                    error!("ALERT: cannot create protected file {name}: {e}");
                    continue;
                }
            }
        }
        if gate.has_record(name) {
            continue;
        }
        match gate.init(name) {
            Ok(()) => info!("integrity baseline recorded for {name}"),
            Err(e) => error!("ALERT: integrity init failed for {name}: {e}"),
        }
    }
}
