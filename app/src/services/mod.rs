use domain::core::StockSim;
use std::sync::Arc;

/// Cheaply cloneable handle to the simulator shared by every request.
/// `StockSim` serialises writes per identity internally, so no outer lock is needed.
#[derive(Clone)]
pub struct SimHandle {
    inner: Arc<StockSim>,
}

impl SimHandle {
    pub fn new(sim: StockSim) -> Self {
        Self {
            inner: Arc::new(sim),
        }
    }

    pub fn sim(&self) -> &StockSim {
        &self.inner
    }
}
