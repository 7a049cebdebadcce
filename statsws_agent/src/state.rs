//! Shared agent state handed to the axum handlers.

use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
}

impl AppState {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}
