// Application Layer - job cache store, view handles and stream policies

pub mod constants;
pub mod pagination;
pub mod reconnect;
pub mod shutdown;
pub mod store;
pub mod view;

// Re-exports
pub use pagination::{paginate, Page};
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use store::{FetchFuture, JobQuery, JobStore, JobsSnapshot, StoreStats, Subscription};
pub use view::{JobView, ViewOptions, ViewState};
