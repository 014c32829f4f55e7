//! QR attendance sessions: a server that issues short-lived session
//! credentials and records redemptions, plus a client that keeps its
//! access token fresh on its own.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod seed;
pub mod state;

pub mod crypto {
    pub mod jwt;
    pub mod token;
}

pub mod models {
    pub mod audit;
    pub mod record;
    pub mod schedule;
    pub mod session;
    pub mod token;
    pub mod user;
}

pub mod repositories;

pub mod services {
    pub mod auth;
    pub mod scan;
    pub mod sessions;
}

pub mod handlers {
    pub mod audit;
    pub mod auth;
    pub mod scan;
    pub mod sessions;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod auth;
}

pub mod client {
    pub mod attendance;
    pub mod debounce;
    pub mod error;
    pub mod gateway;
    pub mod live_feed;
    pub mod pipeline;
    pub mod token_store;

    pub use attendance::SessionClient;
    pub use debounce::ScanDebouncer;
    pub use error::ClientError;
    pub use gateway::AuthGateway;
    pub use live_feed::{FeedSnapshot, LiveFeed};
    pub use pipeline::{ApiRequest, RequestPipeline};
    pub use token_store::{AuthSession, Identity, TokenStore};
}
