//! Server driver: wires config into storage/identity/relay/dispatcher, runs startup bootstrap
//! (challenge purge, lazy secret/keypair generation), and serves until a shutdown signal
//! arrives. Mirrors `cmd/server/main.go`'s wiring order, translated from the Go `flag` package
//! to `clap::Parser` in the teacher's CLI idiom (`transaction-relayer/src/main.rs`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use coldwire_identity::IdentityService;
use coldwire_relay::{RelayConfig, RelayService};
use coldwire_server::AppState;
use coldwire_storage::{PostgresStorage, RedisStorage, SqliteStorage, Storage};
use coldwire_types::constants::CHALLENGE_TTL_SECS;
use coldwire_types::{Config, StorageKind};

/// Coldwire relay server: a federated, store-and-forward relay for end-to-end encrypted
/// messages.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, short = 'c', default_value = "configs/config.json")]
    config: PathBuf,

    /// Address to listen on
    #[arg(long, short = 'h', env = "COLDWIRE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, short = 'p', env = "COLDWIRE_PORT", default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load config file {:?}: {e}", args.config);
            std::process::exit(1);
        }
    };

    if config.dsa_private_key().is_none() {
        info!("no ML-DSA-87 keypair present in config, generating one");
        let keypair = match coldwire_crypto::generate_keypair() {
            Ok(kp) => kp,
            Err(e) => {
                error!("failed to generate ML-DSA-87 keypair: {e}");
                std::process::exit(1);
            }
        };
        config.set_dsa_private_key(&keypair.signing_key);
        config.set_dsa_public_key(&keypair.verification_key);
        if let Err(e) = config.write(&args.config) {
            error!("failed to persist generated keypair to config: {e}");
            std::process::exit(1);
        }
    }

    info!(
        "initializing storage backend (user_storage={:?}, data_storage={:?})",
        config.user_storage, config.data_storage
    );

    let storage: Arc<dyn Storage> = match build_storage(&config).await {
        Ok(s) => s,
        Err(e) => {
            error!("failed to initialize storage backend: {e}");
            std::process::exit(1);
        }
    };

    // Clean slate, mirroring cmd/server/main.go purging every challenge at start.
    if let Err(e) = storage.cleanup_challenges().await {
        error!("failed to purge challenges at startup: {e}");
        std::process::exit(1);
    }

    let jwt_secret = config.jwt_secret();
    let identity = Arc::new(IdentityService::new(storage.clone(), jwt_secret.clone()));

    let dsa_signing_key = config.dsa_private_key().unwrap_or_default();
    let dsa_public_key = config.dsa_public_key().unwrap_or_default();
    let relay = Arc::new(RelayService::new(
        storage.clone(),
        RelayConfig {
            own_url: config.domain_or_ip.clone(),
            federation_enabled: config.federation_enabled,
            dsa_signing_key,
            dsa_public_key,
            blacklisted_ips: config.blacklisted_ips.clone(),
            blacklisted_domains: config.blacklisted_domains.clone(),
        },
    ));

    spawn_challenge_sweep(storage.clone());

    let state = AppState {
        identity,
        relay,
        storage: storage.clone(),
        jwt_secret: Arc::new(jwt_secret),
    };
    let app = coldwire_server::build_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    info!("server starting on {addr} (config={:?})", args.config);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server crashed: {e}");
        std::process::exit(1);
    }

    if let Err(e) = storage.exit_cleanup().await {
        error!("error while cleaning up storage on exit: {e}");
    }
}

async fn build_storage(config: &Config) -> Result<Arc<dyn Storage>, coldwire_storage::StorageError> {
    Ok(match config.data_storage {
        StorageKind::Sqlite => Arc::new(SqliteStorage::connect("coldwire_database.sqlite").await?),
        StorageKind::Postgres => {
            let dsn = format!(
                "postgres://{}:{}@{}:{}/{}",
                config.postgres.db_user,
                config.postgres.db_password,
                config.postgres.host,
                config.postgres.port,
                config.postgres.db_name,
            );
            Arc::new(PostgresStorage::connect(&dsn).await?)
        }
        StorageKind::Redis => {
            let addr = format!(
                "redis://:{}@{}:{}/{}",
                config.redis.password, config.redis.host, config.redis.port, config.redis.db
            );
            Arc::new(RedisStorage::connect(&addr)?)
        }
    })
}

/// Periodically purges challenges older than `CHALLENGE_TTL_SECS`, grounded on
/// `auth_service.rs::start_challenge_expiration_task`'s periodic-cleanup idiom.
fn spawn_challenge_sweep(storage: Arc<dyn Storage>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::seconds(CHALLENGE_TTL_SECS);
            if let Err(e) = storage.cleanup_expired_challenges(cutoff).await {
                error!("challenge expiration sweep failed: {e}");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining in-flight requests");
}
