pub mod coordinator;
pub mod lifecycle;
pub mod resource;
pub mod signal;

pub use coordinator::{ShutdownCoordinator, ShutdownCoordinatorBuilder};
pub use lifecycle::{Lifecycle, LifecycleError, LifecyclePhase};
pub use resource::{Resource, ResourceError, ResourceManager};
pub use signal::{ShutdownSignal, SignalHandler};
