pub mod builtin;
pub mod value;

pub use value::{Params, Row, Value};

use crate::error::StoreError;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a session-tracked entity. Every reader inside one session
/// gets a clone of the same `Rc`.
pub type EntityRef<T> = Rc<RefCell<T>>;

/// Type-erased view of a tracked entity used by the flush engine.
pub type EntityHandle = Rc<RefCell<dyn Entity>>;

/// Registry tag for every persisted entity type. Built-in kinds have a fixed
/// slot in the dependency order table; `Custom` kinds never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Property,
    ByteArray,
    Deployment,
    Resource,
    Model,
    ProcessDefinition,
    ProcessDefinitionInfo,
    Execution,
    Task,
    IdentityLink,
    VariableInstance,
    EventSubscription,
    Job,
    TimerJob,
    SuspendedJob,
    DeadLetterJob,
    EventLogEntry,
    Attachment,
    Comment,
    HistoricProcessInstance,
    HistoricActivityInstance,
    HistoricTaskInstance,
    HistoricVariableInstance,
    HistoricDetail,
    HistoricIdentityLink,
    User,
    Group,
    Membership,
    IdentityInfo,
    Custom(&'static str),
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Property => "property",
            EntityKind::ByteArray => "byte_array",
            EntityKind::Deployment => "deployment",
            EntityKind::Resource => "resource",
            EntityKind::Model => "model",
            EntityKind::ProcessDefinition => "process_definition",
            EntityKind::ProcessDefinitionInfo => "process_definition_info",
            EntityKind::Execution => "execution",
            EntityKind::Task => "task",
            EntityKind::IdentityLink => "identity_link",
            EntityKind::VariableInstance => "variable_instance",
            EntityKind::EventSubscription => "event_subscription",
            EntityKind::Job => "job",
            EntityKind::TimerJob => "timer_job",
            EntityKind::SuspendedJob => "suspended_job",
            EntityKind::DeadLetterJob => "dead_letter_job",
            EntityKind::EventLogEntry => "event_log_entry",
            EntityKind::Attachment => "attachment",
            EntityKind::Comment => "comment",
            EntityKind::HistoricProcessInstance => "historic_process_instance",
            EntityKind::HistoricActivityInstance => "historic_activity_instance",
            EntityKind::HistoricTaskInstance => "historic_task_instance",
            EntityKind::HistoricVariableInstance => "historic_variable_instance",
            EntityKind::HistoricDetail => "historic_detail",
            EntityKind::HistoricIdentityLink => "historic_identity_link",
            EntityKind::User => "user",
            EntityKind::Group => "group",
            EntityKind::Membership => "membership",
            EntityKind::IdentityInfo => "identity_info",
            EntityKind::Custom(name) => *name,
        }
    }

    /// Kinds whose rows this kind holds foreign keys to (self references
    /// excluded). Mirrors the constraints in the create scripts.
    pub fn references(&self) -> &'static [EntityKind] {
        use EntityKind::*;
        match self {
            ByteArray => &[Deployment],
            Resource => &[Deployment],
            Model => &[Deployment, ByteArray],
            ProcessDefinitionInfo => &[ProcessDefinition, ByteArray],
            Execution => &[ProcessDefinition],
            Task => &[Execution, ProcessDefinition],
            IdentityLink => &[Task, Execution, ProcessDefinition],
            VariableInstance => &[Execution, ByteArray],
            EventSubscription => &[Execution],
            Job | TimerJob | SuspendedJob | DeadLetterJob => {
                &[Execution, ProcessDefinition, ByteArray]
            }
            Membership => &[User, Group],
            _ => &[],
        }
    }

    /// Instances of a hierarchical kind reference each other and need
    /// per-instance ordering on top of the class-level table.
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, EntityKind::Execution)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, EntityKind::Custom(_))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Session-local lifecycle flags. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub inserted: bool,
    pub updated: bool,
    pub deleted: bool,
}

/// Parent pointers of a hierarchical entity. `parent_id` wins over
/// `super_id` when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyLinks {
    pub parent_id: Option<String>,
    pub super_id: Option<String>,
}

impl HierarchyLinks {
    pub fn parent_key(&self) -> Option<&str> {
        self.parent_id.as_deref().or(self.super_id.as_deref())
    }
}

/// Identity + revision contract every persisted object implements.
///
/// `persistent_state` returns every column the mapped statements bind except
/// `id`, `revision` and `revision_next`, which the session adds. It doubles as
/// the snapshot used for dirty checking, so it must not contain the revision.
pub trait Entity: Any + fmt::Debug {
    fn kind(&self) -> EntityKind;
    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
    fn lifecycle(&self) -> &Lifecycle;
    fn lifecycle_mut(&mut self) -> &mut Lifecycle;
    fn persistent_state(&self) -> Params;

    /// `None` marks a non-revisioned entity.
    fn revision(&self) -> Option<i32> {
        None
    }

    fn set_revision(&mut self, _revision: i32) {}

    fn revision_next(&self) -> Option<i32> {
        self.revision().map(|rev| rev + 1)
    }

    fn hierarchy(&self) -> Option<HierarchyLinks> {
        None
    }
}

pub trait PersistentEntity: Entity + Sized {
    const KIND: EntityKind;

    fn from_row(row: &Row) -> Result<Self, StoreError>;
}

pub(crate) fn statement_params(entity: &dyn Entity) -> Params {
    let mut params = entity.persistent_state();
    if let Some(id) = entity.id() {
        params.insert("id", id);
    }
    if let Some(revision) = entity.revision() {
        params.insert("revision", revision);
        params.insert(
            "revision_next",
            entity.revision_next().unwrap_or(revision + 1),
        );
    }
    params
}

pub(crate) fn describe(entity: &dyn Entity) -> String {
    format!("{}[{}]", entity.kind(), entity.id().unwrap_or("<unassigned>"))
}
