pub mod chat;
pub mod config;
pub mod gateways;
pub mod matching;
pub mod profiles;
pub mod routes;
pub mod state;
pub mod storage;
pub mod store;
pub mod subscriptions;

pub use config::AppConfig;
pub use routes::router;
pub use state::AppState;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
