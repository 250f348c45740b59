use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::config::AppConfig;
use crate::db::RecordStore;

pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub config: AppConfig,
}
