pub mod alert;
pub mod telemetry;

pub use alert::AlertStore;
pub use telemetry::TelemetryStore;

/// A page of results plus whether more exist beyond it.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}
