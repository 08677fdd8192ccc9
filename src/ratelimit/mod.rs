//! Rate limiting logic and state management.

mod breaker;
mod client_key;
mod distributed;
mod limiter;
mod memory;
mod policy;

pub use breaker::HealthBreaker;
pub use client_key::{resolve_client_key, RequestContext};
pub use distributed::{RedisWindowStore, SlidingWindowStore};
pub use limiter::{Decision, RateLimitBackend, RateLimiter};
pub use memory::MemoryWindowStore;
pub use policy::RateLimitPolicy;
