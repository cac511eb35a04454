// ============================
// signal-backend-lib/src/lib.rs
// ============================
//! Core functionality for the join-code signaling server.
//!
//! Two browser sessions rendezvous through a short numeric join code. The
//! creating session opens a room over `/ws` and receives a fresh code every
//! rotation interval; the joining session redeems the code. Rooms and codes
//! live in a shared expiring store so several server instances can cooperate.

pub mod config;
pub mod error;
pub mod join_code;
pub mod messages;
pub mod metrics;
pub mod session;
pub mod store;
pub mod validation;
pub mod websocket;
pub mod ws_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::error::AppError;
use crate::join_code::{CodeSource, JoinCodeIssuer, RandomCodeSource};
use crate::store::{MemoryStore, RoomStore, TimeoutStore};

/// Application state shared across all connections.
///
/// Holds no per-room data; everything room related lives in the store.
#[derive(Clone)]
pub struct AppState {
    /// Settings
    pub settings: Arc<Settings>,
    /// Shared room store
    pub store: Arc<dyn RoomStore>,
    /// Join code issuer bound to `store`
    pub issuer: JoinCodeIssuer,
}

impl AppState {
    /// Create application state around an already connected store
    pub fn new(settings: Settings, store: Arc<dyn RoomStore>) -> Self {
        Self::with_parts(settings, store, Arc::new(RandomCodeSource))
    }

    /// Create application state with an explicit code source
    pub fn with_parts(
        settings: Settings,
        store: Arc<dyn RoomStore>,
        source: Arc<dyn CodeSource>,
    ) -> Self {
        let issuer = JoinCodeIssuer::new(store.clone(), source, &settings);
        Self {
            settings: Arc::new(settings),
            store,
            issuer,
        }
    }

    /// Create application state over a fresh in-process store
    pub fn in_memory(settings: Settings) -> Self {
        let store = TimeoutStore::new(Arc::new(MemoryStore::new()), settings.store_timeout());
        Self::new(settings, Arc::new(store))
    }

    /// Connect the store named by `settings` and build the state around it
    pub async fn connect(settings: Settings) -> Result<Self, AppError> {
        let store = store::connect(&settings).await?;
        Ok(Self::new(settings, store))
    }
}
