//! Purpose: Issue primitive command sequences for element creation and status access.
//! Exports: `Marshaller`, `MarshallerOptions`.
//! Role: Owns the injected channel; every public operation runs under the stack guard.
//! Invariants: An operation fully consumes its results before returning.
//! Invariants: Multi-step failures are not rolled back; errors carry what already exists.
#![allow(clippy::result_large_err)]

use tracing::{debug, warn};

use crate::core::channel::StackChannel;
use crate::core::error::{Error, ErrorKind};
use crate::core::guard::{StackCheck, StackGuard};
use crate::core::value::{ElementId, Value};

use super::ApiResult;
use super::targets::{CreateParams, StatusKeys, StatusParams, StatusReply, Targets};

pub const DEFAULT_SYNAPSE_MODEL: &str = "static_synapse";

#[derive(Clone, Debug)]
pub struct MarshallerOptions {
    pub stack_check: StackCheck,
    pub synapse_model: String,
}

impl MarshallerOptions {
    pub fn new() -> Self {
        Self {
            stack_check: StackCheck::Inherit,
            synapse_model: DEFAULT_SYNAPSE_MODEL.to_string(),
        }
    }

    pub fn with_stack_check(mut self, stack_check: StackCheck) -> Self {
        self.stack_check = stack_check;
        self
    }

    pub fn with_synapse_model(mut self, model: impl Into<String>) -> Self {
        self.synapse_model = model.into();
        self
    }
}

impl Default for MarshallerOptions {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Marshaller<C: StackChannel> {
    channel: C,
    options: MarshallerOptions,
}

impl<C: StackChannel> Marshaller<C> {
    pub fn new(channel: C) -> Self {
        Self::with_options(channel, MarshallerOptions::new())
    }

    pub fn with_options(channel: C, options: MarshallerOptions) -> Self {
        Self { channel, options }
    }

    pub fn options(&self) -> &MarshallerOptions {
        &self.options
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Run `f` as one logical operation, verifying stack balance when checks are active.
    pub fn guarded<T>(
        &mut self,
        operation: &str,
        f: impl FnOnce(&mut Self) -> ApiResult<T>,
    ) -> ApiResult<T> {
        if !self.options.stack_check.is_active() {
            return f(self);
        }
        let guard = StackGuard::enter(operation, self.channel.depth());
        let result = f(self);
        guard.settle(result, self.channel.depth())
    }

    pub(crate) fn push(&mut self, value: Value) -> ApiResult<()> {
        self.channel.push(value)
    }

    pub(crate) fn run(&mut self, command: &str) -> ApiResult<()> {
        debug!(command, depth = self.channel.depth(), "execute");
        self.channel.execute(command)
    }

    pub(crate) fn pop(&mut self) -> ApiResult<Value> {
        self.channel.pop()
    }

    pub(crate) fn synapse_model<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model.unwrap_or(self.options.synapse_model.as_str())
    }

    /// Create `n` elements of `model` and return their ids in creation order.
    ///
    /// Per-element parameters are applied after creation; if that step fails the
    /// elements stay alive and the returned error lists their ids.
    pub fn create(
        &mut self,
        model: &str,
        n: usize,
        params: Option<CreateParams>,
    ) -> ApiResult<Vec<ElementId>> {
        self.guarded("Create", |m| {
            if n == 0 {
                return Err(Error::new(ErrorKind::TypeMismatch)
                    .with_message("n must be a positive integer"));
            }

            let count = i64::try_from(n).map_err(|_| {
                Error::new(ErrorKind::ArgumentShape)
                    .with_message(format!("cannot create {n} elements in one call"))
            })?;
            m.push(Value::literal(model))?;
            m.push(Value::Int(count))?;
            let per_element = match params {
                Some(CreateParams::Shared(map)) => {
                    m.push(Value::Dict(map))?;
                    m.run("Create_l_i_D")?;
                    None
                }
                Some(CreateParams::PerElement(maps)) => {
                    m.run("Create_l_i")?;
                    Some(maps)
                }
                None => {
                    m.run("Create_l_i")?;
                    None
                }
            };

            let last = m.pop()?.into_id("last created id")?;
            let first = (last + 1).checked_sub(count.unsigned_abs()).ok_or_else(|| {
                Error::new(ErrorKind::Protocol).with_message(format!(
                    "last created id {last} cannot end a range of {n} elements"
                ))
            })?;
            let ids: Vec<ElementId> = (first..=last).collect();

            if let Some(maps) = per_element {
                let targets = Targets::Elements(ids.clone());
                if let Err(err) = m.set_status(&targets, maps) {
                    warn!(
                        model,
                        created = ?ids,
                        "SetStatus failed after creation; elements remain alive"
                    );
                    return Err(err.with_created(ids));
                }
            }

            Ok(ids)
        })
    }

    /// Write parameters to elements or connections. An empty target list is a no-op
    /// that never touches the channel.
    pub fn set_status(
        &mut self,
        targets: &Targets,
        params: impl Into<StatusParams>,
    ) -> ApiResult<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let params = params.into();
        self.guarded("SetStatus", |m| {
            let maps = params.into_maps(targets.len())?;
            m.push(targets.encode()?)?;
            m.push(Value::Array(maps.into_iter().map(Value::Dict).collect()))?;
            m.run("SetStatus_a_a")
        })
    }

    /// Read status from elements or connections; the reply shape follows `keys`.
    pub fn get_status(&mut self, targets: &Targets, keys: &StatusKeys) -> ApiResult<StatusReply> {
        if targets.is_empty() {
            return Ok(keys.empty_reply());
        }
        self.guarded("GetStatus", |m| {
            m.push(targets.encode()?)?;
            let command = match keys {
                StatusKeys::All => "GetStatus_a",
                StatusKeys::One(key) => {
                    m.push(Value::literal(key.as_str()))?;
                    "GetStatus_a_l"
                }
                StatusKeys::Many(names) => {
                    m.push(Value::Array(
                        names.iter().map(|name| Value::literal(name.as_str())).collect(),
                    ))?;
                    "GetStatus_a_a"
                }
            };
            m.run(command)?;

            let items = m.pop()?.into_array("status reply")?;
            if items.len() != targets.len() {
                return Err(Error::new(ErrorKind::Protocol).with_message(format!(
                    "status reply has {} entries for {} targets",
                    items.len(),
                    targets.len()
                )));
            }
            match keys {
                StatusKeys::All => items
                    .into_iter()
                    .map(|item| item.into_dict("status entry"))
                    .collect::<Result<Vec<_>, _>>()
                    .map(StatusReply::Maps),
                StatusKeys::One(_) => Ok(StatusReply::Values(items)),
                StatusKeys::Many(_) => items
                    .into_iter()
                    .map(|item| item.into_array("status row"))
                    .collect::<Result<Vec<_>, _>>()
                    .map(StatusReply::Rows),
            }
        })
    }
}
