use std::sync::Arc;

use strewn_model::asset::{MaterialAsset, MeshAsset};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Unrequested,
    Loading,
    Loaded,
    Failed(String),
}

impl LoadState {
    /// Terminal means a poll won't change the answer anymore. Failures are
    /// terminal too; the caller decides what to skip.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::Failed(_))
    }
}

/// Load-state driven asset access. `request_load` is idempotent per path and
/// returns whether every requested path is already terminal after the call,
/// which is exactly what a synchronous caller wants to know. Asynchronous
/// requests park paths in `Loading` until a background load publishes the
/// result.
pub trait AssetServer: Send + Sync {
    fn request_load(&self, paths: &[String], asynchronous: bool) -> bool;

    fn load_state(&self, path: &str) -> LoadState;

    fn get_mesh(&self, path: &str) -> Option<Arc<MeshAsset>>;

    fn get_material(&self, path: &str) -> Option<Arc<MaterialAsset>>;
}
