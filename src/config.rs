// src/config.rs

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

use crate::engine::{
    scoring::ScoreWeights,
    selection::{Ranking, UnseenPolicy},
};

/// Default token lifetime: 7 days.
const DEFAULT_JWT_EXPIRATION: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageBackend,
    /// Required when `storage` is `Postgres`.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    /// Directory of `<pool>.json` files imported at startup.
    pub question_pool_dir: Option<PathBuf>,
    pub score_weights: ScoreWeights,
    pub unseen_policy: UnseenPolicy,
    /// Fixed seed for question selection, mostly useful in tests and demos.
    pub selection_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let storage = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => panic!("STORAGE_BACKEND must be 'postgres' or 'memory', got '{}'", other),
        };

        let database_url = env::var("DATABASE_URL").ok();

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_JWT_EXPIRATION);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let question_pool_dir = env::var("QUESTION_POOL_DIR").ok().map(PathBuf::from);

        // Weights are read once here; bad values silently keep the defaults.
        let score_weights = ScoreWeights::from_lookup(|key| env::var(key).ok());

        let unseen_policy = env::var("UNSEEN_QUESTION_POLICY")
            .ok()
            .and_then(|v| UnseenPolicy::parse(&v))
            .unwrap_or_default();

        let selection_seed = env::var("SELECTION_SEED")
            .ok()
            .and_then(|v| v.parse().ok());

        Self {
            storage,
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bind_addr,
            question_pool_dir,
            score_weights,
            unseen_policy,
            selection_seed,
        }
    }

    pub fn ranking(&self) -> Ranking {
        Ranking {
            weights: self.score_weights,
            unseen: self.unseen_policy,
        }
    }
}
