//! Purpose: Define the public Rust API boundary for stackwire.
//! Exports: `Marshaller` and its argument/reply types, plus core types callers need.
//! Role: Public, additive-only surface; argument shapes are resolved here once.
//! Invariants: Every marshaller operation is reachable only through this module.
//! Invariants: Channel access stays behind the injected `StackChannel`.

mod connect;
mod hierarchy;
mod marshaller;
mod models;
mod targets;

pub use crate::core::broadcast::{Broadcast, broadcast, broadcast_value};
pub use crate::core::channel::StackChannel;
pub use crate::core::connection::{CONN_LEN, ConnectionHandle};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::guard::{StackCheck, check_balance, set_stack_checks, stack_checks_enabled};
pub use crate::core::value::{ElementId, ParamMap, Value, ValueKind};
pub use connect::{ConnectionFilter, SynapseParams};
pub use hierarchy::Descent;
pub use marshaller::{DEFAULT_SYNAPSE_MODEL, Marshaller, MarshallerOptions};
pub use models::ModelKind;
pub use targets::{CreateParams, StatusEntry, StatusKeys, StatusParams, StatusReply, Targets};

pub type ApiResult<T> = Result<T, Error>;
