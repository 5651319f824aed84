mod broadcast;
mod lifecycle_retry;

pub use broadcast::BroadcastTask;
pub use lifecycle_retry::{lifecycle_retry_queue, LifecycleRetryTask};
