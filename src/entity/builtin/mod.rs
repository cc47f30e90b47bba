pub mod byte_array;
pub mod event_log;
pub mod execution;
pub mod job;
pub mod process_definition;
pub mod property;
pub mod task;
pub mod variable;

pub use byte_array::ByteArrayEntity;
pub use event_log::EventLogEntryEntity;
pub use execution::ExecutionEntity;
pub use job::JobEntity;
pub use process_definition::ProcessDefinitionEntity;
pub use property::PropertyEntity;
pub use task::TaskEntity;
pub use variable::VariableInstanceEntity;

use crate::mapping::MappingRegistry;

pub const SUSPENSION_ACTIVE: i32 = 1;
pub const SUSPENSION_SUSPENDED: i32 = 2;

pub(crate) fn register_all(registry: &mut MappingRegistry) {
    property::register(registry);
    byte_array::register(registry);
    process_definition::register(registry);
    execution::register(registry);
    task::register(registry);
    variable::register(registry);
    job::register(registry);
    event_log::register(registry);
}
