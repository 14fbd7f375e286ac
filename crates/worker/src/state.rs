use std::sync::Arc;

use skintrack_core::Tracker;

use crate::status::StatusReporter;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Tracker,
    pub status: Arc<StatusReporter>,
}
