//! Connection registry: the durable set of open connection ids.
//!
//! Lifecycle events upsert and remove ids; broadcast passes list them and
//! remove the ones delivery reported as gone. Backends:
//! - `memory`: process-local `DashMap`
//! - `redis`: a Redis set shared by every instance in the namespace

mod backend;
mod factory;
mod memory_backend;
mod redis_backend;

pub use backend::{ConnectionRegistry, RegistryError, RegistryStats};
pub use factory::create_registry;
pub use memory_backend::MemoryConnectionRegistry;
pub use redis_backend::RedisConnectionRegistry;
