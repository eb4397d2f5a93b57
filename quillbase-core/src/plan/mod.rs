// plan/mod.rs
// Logical plans and their translation to physical operator trees

pub mod logical;
pub mod translator;

pub use logical::{from_statement, AggregateKind, GroupStep, LogicalPlan, PlanStep, SortStep};
pub use translator::{create_physical_plan, PhysicalPlan};
