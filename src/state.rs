// src/state.rs

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use rand::{SeedableRng, rngs::StdRng};

use crate::config::Config;
use crate::store::DynStore;

pub type SharedRng = Arc<Mutex<StdRng>>;

#[derive(Clone)]
pub struct AppState {
    pub store: DynStore,
    pub config: Config,
    /// Randomness for tiebreaks and shuffles. Only locked around synchronous selection calls.
    pub rng: SharedRng,
}

impl AppState {
    pub fn new(store: DynStore, config: Config) -> Self {
        let rng = match config.selection_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            store,
            config,
            rng: Arc::new(Mutex::new(rng)),
        }
    }
}

impl FromRef<AppState> for DynStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for SharedRng {
    fn from_ref(state: &AppState) -> Self {
        state.rng.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
