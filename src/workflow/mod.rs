mod context;
mod publish;

pub use context::WorkflowContext;
pub use publish::publish;
