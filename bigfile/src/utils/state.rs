use std::sync::Arc;

use crate::config::Config;
use crate::service::upload::UploadService;

#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<UploadService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let uploads = UploadService::filesystem(config.path_manager(), config.digest_algorithm);
        AppState {
            uploads: Arc::new(uploads),
            config: Arc::new(config),
        }
    }
}
