use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::connection::ConnectionHub;
use crate::fanout::FanoutEngine;
use crate::redis::RedisPool;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Sockets held by this process
    pub hub: Arc<ConnectionHub>,
    pub engine: Arc<FanoutEngine>,
    /// Present only when the Redis registry backend is configured
    pub redis_pool: Option<Arc<RedisPool>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        hub: Arc<ConnectionHub>,
        engine: Arc<FanoutEngine>,
        redis_pool: Option<Arc<RedisPool>>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            hub,
            engine,
            redis_pool,
            start_time: Instant::now(),
        }
    }
}
