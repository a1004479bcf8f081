//! Application context shared by every route handler through axum state.

use std::sync::Arc;

use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_jobs::JobManager;
use rf_media::MediaStore;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub jobs: JobManager,
    pub media: Arc<MediaStore>,
    pub tools: Arc<ToolRegistry>,
}

impl AppContext {
    pub fn new(config: Config, jobs: JobManager, tools: ToolRegistry) -> Self {
        let media = MediaStore::new(&config.storage.media_dir);
        Self {
            config: Arc::new(config),
            jobs,
            media: Arc::new(media),
            tools: Arc::new(tools),
        }
    }
}
