use std::sync::Arc;
use tokio::sync::RwLock;

/// Type alias for Arc<RwLock<T>>, a common pattern for shared mutable state
pub type RwArc<T> = Arc<RwLock<T>>;
