//! Service layer module.
//!
//! Contains the identity resolution logic: attribute mapping, identifier
//! allocation, local account provisioning and the facade tying them together.

pub mod allocator;
pub mod mapper;
pub mod privilege;
pub mod provisioning;
pub mod resolver;
pub mod telemetry;

pub use allocator::IdAllocator;
pub use mapper::AttributeMapper;
pub use privilege::CallerPrivilege;
pub use provisioning::{
    CommandRunner, GetentLocalIdentity, LocalIdentity, ProcFs, ProcessTable, Provisioner,
    SystemCommandRunner,
};
pub use resolver::IdentityResolver;
