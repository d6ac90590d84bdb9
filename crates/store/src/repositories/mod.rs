//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&dyn ObjectStore` as the first argument.

pub mod heartbeat_repo;
pub mod job_repo;
pub mod lease_repo;

pub use heartbeat_repo::HeartbeatRepo;
pub use job_repo::JobRepo;
pub use lease_repo::LeaseRepo;
