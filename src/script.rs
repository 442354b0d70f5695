//! Purpose: Replay JSON operation scripts through a `Marshaller`.
//! Exports: `Script`, `Step`, `ScriptRunner`.
//! Role: Boundary where untyped JSON arguments resolve into typed marshaller calls.
//! Invariants: Keyed status values broadcast through `broadcast_value`; only the kinds in
//! `ATOMIC_KINDS` count as scalars there. Model defaults take a keyed value as is.
//! Invariants: `"$name"` strings resolve to the result of the earlier step bound with `"as"`.
#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value as Json, json};
use tracing::debug;

use crate::api::{
    ApiResult, Broadcast, ConnectionFilter, CreateParams, Descent, ElementId, Error, ErrorKind,
    Marshaller, ModelKind, ParamMap, StackChannel, StatusKeys, StatusParams, SynapseParams,
    Targets, Value, ValueKind, broadcast_value,
};
use crate::core::connection::encode_all;
use crate::core::value::map_from_json;

/// Value kinds a keyed `set_status` value repeats for every target; arrays are per target.
const ATOMIC_KINDS: &[ValueKind] = &[
    ValueKind::Bool,
    ValueKind::Int,
    ValueKind::Double,
    ValueKind::String,
    ValueKind::Literal,
    ValueKind::Dict,
    ValueKind::Connection,
];

/// One scripted operation: `{"op": "...", "as": "name", ...arguments}`.
#[derive(Clone, Debug, Deserialize)]
pub struct Step {
    pub op: String,
    #[serde(rename = "as", default)]
    pub bind: Option<String>,
    #[serde(flatten)]
    pub args: Map<String, Json>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(transparent)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn parse(text: &str) -> ApiResult<Self> {
        serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("script must be a JSON array of steps")
                .with_hint("Each step is an object with an \"op\" field.")
                .with_source(err)
        })
    }
}

pub struct ScriptRunner<C: StackChannel> {
    marshaller: Marshaller<C>,
    bindings: BTreeMap<String, Json>,
}

impl<C: StackChannel> ScriptRunner<C> {
    pub fn new(marshaller: Marshaller<C>) -> Self {
        Self {
            marshaller,
            bindings: BTreeMap::new(),
        }
    }

    pub fn marshaller(&self) -> &Marshaller<C> {
        &self.marshaller
    }

    /// Run every step in order; stops at the first failure.
    pub fn run(&mut self, script: &Script) -> ApiResult<Vec<Json>> {
        let mut results = Vec::with_capacity(script.steps.len());
        for (index, step) in script.steps.iter().enumerate() {
            debug!(index, op = %step.op, "script step");
            let result = self.step(step).map_err(|err| {
                if err.hint().is_some() {
                    err
                } else {
                    let hint = format!("while running step {index} ({})", step.op);
                    err.with_hint(hint)
                }
            })?;
            if let Some(name) = &step.bind {
                self.bindings.insert(name.clone(), result.clone());
            }
            results.push(result);
        }
        Ok(results)
    }

    fn step(&mut self, step: &Step) -> ApiResult<Json> {
        let args = Args {
            op: &step.op,
            map: self.resolve(&Json::Object(step.args.clone()))?,
        };
        let m = &mut self.marshaller;
        match step.op.as_str() {
            "create" => {
                let params = match args.optional("params") {
                    None => None,
                    Some(Json::Array(items)) => Some(CreateParams::PerElement(
                        items
                            .iter()
                            .map(|item| args.object(item, "params"))
                            .collect::<ApiResult<_>>()?,
                    )),
                    Some(other) => Some(CreateParams::Shared(args.object(other, "params")?)),
                };
                let n = args.optional_usize("n")?.unwrap_or(1);
                Ok(json!(m.create(args.str("model")?, n, params)?))
            }
            "set_status" => {
                let targets = args.targets("targets")?;
                m.set_status(&targets, args.status_params(Some(targets.len()))?)?;
                Ok(Json::Null)
            }
            "get_status" => {
                let targets = args.targets("targets")?;
                Ok(m.get_status(&targets, &args.keys()?)?.to_json())
            }
            "connect" => {
                let params = args.synapse_params("params")?;
                let delay = args.f64_broadcast("delay")?;
                m.connect(
                    &args.ids("pre")?,
                    &args.ids("post")?,
                    params,
                    delay,
                    args.optional_str("model")?,
                )?;
                Ok(Json::Null)
            }
            "convergent_connect" | "divergent_connect" => {
                let pre = args.ids("pre")?;
                let post = args.ids("post")?;
                let weight = args.f64_broadcast("weight")?;
                let delay = args.f64_broadcast("delay")?;
                let model = args.optional_str("model")?;
                if step.op == "convergent_connect" {
                    m.convergent_connect(&pre, &post, weight, delay, model)?;
                } else {
                    m.divergent_connect(&pre, &post, weight, delay, model)?;
                }
                Ok(Json::Null)
            }
            "get_connections" => {
                let mut filter = ConnectionFilter::new();
                if args.optional("source").is_some() {
                    filter = filter.source(&args.ids("source")?);
                }
                if args.optional("target").is_some() {
                    filter = filter.target(&args.ids("target")?);
                }
                if let Some(model) = args.optional_str("synapse_model")? {
                    filter = filter.synapse_model(model);
                }
                Ok(encode_all(&m.get_connections(&filter)?)?.to_json())
            }
            "random_convergent_connect" | "random_divergent_connect" => {
                let pre = args.ids("pre")?;
                let post = args.ids("post")?;
                let n = args.draw_count("n")?;
                let weight = args.f64_broadcast("weight")?;
                let delay = args.f64_broadcast("delay")?;
                let model = args.optional_str("model")?;
                let options = args.optional_object("options")?;
                if step.op == "random_convergent_connect" {
                    m.random_convergent_connect(&pre, &post, n, weight, delay, model, options.as_ref())?;
                } else {
                    m.random_divergent_connect(&pre, &post, n, weight, delay, model, options.as_ref())?;
                }
                Ok(Json::Null)
            }
            "find_connections" => {
                let source = args.ids("source")?;
                let target = match args.optional("target") {
                    None => None,
                    Some(value) => Some(Broadcast::Sequence(
                        broadcast_value(Value::from_json(value)?, source.len(), &[ValueKind::Int], "target")?
                            .into_iter()
                            .map(|id| id.into_id("target"))
                            .collect::<ApiResult<Vec<_>>>()?,
                    )),
                };
                let synapse_model = match args.optional("synapse_model") {
                    None => None,
                    Some(value) => Some(Broadcast::Sequence(
                        broadcast_value(
                            Value::from_json(value)?,
                            source.len(),
                            &[ValueKind::String],
                            "synapse_model",
                        )?
                        .into_iter()
                        .map(|model| match model {
                            Value::String(name) => Ok(name),
                            _ => Err(args.invalid("synapse_model", "must hold model names")),
                        })
                        .collect::<ApiResult<Vec<_>>>()?,
                    )),
                };
                let found = m.find_connections(&source, target, synapse_model)?;
                Ok(encode_all(&found)?.to_json())
            }
            "data_connect" => {
                if args.optional("params").is_some() {
                    let params = args.objects("params")?;
                    m.data_connect(&args.ids("pre")?, &params, args.optional_str("model")?)?;
                } else {
                    let name = if args.optional("synapses").is_some() { "synapses" } else { "pre" };
                    m.data_connect_synapses(&args.objects(name)?)?;
                }
                Ok(Json::Null)
            }
            "get_children" | "get_leaves" | "get_nodes" => {
                let descent = match step.op.as_str() {
                    "get_children" => Descent::Children,
                    "get_leaves" => Descent::Leaves,
                    _ => Descent::Nodes,
                };
                let properties = args.optional_object("properties")?;
                let local_only = args.optional_bool("local_only")?.unwrap_or(false);
                let found = m.descend(
                    descent,
                    &args.ids("subnets")?,
                    properties.as_ref(),
                    local_only,
                )?;
                Ok(json!(found))
            }
            "current_subnet" => Ok(json!(m.current_subnet()?)),
            "change_subnet" => {
                m.change_subnet(&args.ids("subnet")?)?;
                Ok(Json::Null)
            }
            "begin_subnet" => {
                let params = args.optional_object("params")?;
                Ok(json!(m.begin_subnet(args.optional_str("label")?, params)?))
            }
            "end_subnet" => Ok(json!(m.end_subnet()?)),
            "get_lid" => Ok(json!(m.get_lid(&args.ids("id")?)?)),
            "print_network" => {
                let depth = args.optional_usize("depth")?.unwrap_or(1);
                let depth = u32::try_from(depth).map_err(|_| args.invalid("depth", "is too large"))?;
                let subnet = match args.optional("subnet") {
                    None => None,
                    Some(_) => Some(args.ids("subnet")?),
                };
                m.print_network(depth, subnet.as_deref())?;
                Ok(Json::Null)
            }
            "get_network" => {
                let depth = args.optional_usize("depth")?.unwrap_or(0);
                let depth = u32::try_from(depth).map_err(|_| args.invalid("depth", "is too large"))?;
                Ok(m.get_network(&args.ids("subnet")?, depth)?.to_json())
            }
            "layout_network" => {
                let dims = match args.required("dims")? {
                    Json::Array(items) => items
                        .iter()
                        .map(|item| {
                            item.as_u64()
                                .and_then(|d| usize::try_from(d).ok())
                                .ok_or_else(|| args.invalid("dims", "must hold non-negative integers"))
                        })
                        .collect::<ApiResult<Vec<_>>>()?,
                    _ => return Err(args.invalid("dims", "must be an array")),
                };
                let params = args.optional_object("params")?;
                let subnet = m.layout_network(
                    args.str("model")?,
                    &dims,
                    args.optional_str("label")?,
                    params,
                )?;
                Ok(json!(subnet))
            }
            "models" => {
                let kind = match args.optional_str("kind")? {
                    None | Some("all") => ModelKind::All,
                    Some("nodes") => ModelKind::Nodes,
                    Some("synapses") => ModelKind::Synapses,
                    Some(_) => return Err(args.invalid("kind", "must be all, nodes, or synapses")),
                };
                Ok(json!(m.models(kind, args.optional_str("selector")?)?))
            }
            "set_defaults" => {
                m.set_defaults(args.str("model")?, args.status_params(None)?)?;
                Ok(Json::Null)
            }
            "get_defaults" => Ok(m.get_defaults(args.str("model")?, &args.keys()?)?.to_json()),
            "copy_model" => {
                let params = args.optional_object("params")?;
                m.copy_model(args.str("existing")?, args.str("new")?, params)?;
                Ok(Json::Null)
            }
            "set_kernel_status" => {
                let params = args.object(args.required("params")?, "params")?;
                m.set_kernel_status(params)?;
                Ok(Json::Null)
            }
            "get_kernel_status" => Ok(m.get_kernel_status(&args.keys()?)?.to_json()),
            "reset_kernel" => {
                m.reset_kernel()?;
                Ok(Json::Null)
            }
            "reset_network" => {
                m.reset_network()?;
                Ok(Json::Null)
            }
            "simulate" => {
                let t = args
                    .required("t")?
                    .as_f64()
                    .ok_or_else(|| args.invalid("t", "must be a number"))?;
                m.simulate(t)?;
                Ok(Json::Null)
            }
            "resume_simulation" => {
                m.resume_simulation()?;
                Ok(Json::Null)
            }
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown script op '{other}'"))
                .with_hint("Run `stackwire run --help` for the list of ops.")),
        }
    }

    /// Substitute `"$name"` references with bound results.
    fn resolve(&self, value: &Json) -> ApiResult<Map<String, Json>> {
        match self.substitute(value)? {
            Json::Object(map) => Ok(map),
            _ => Err(Error::new(ErrorKind::Internal).with_message("step arguments must be an object")),
        }
    }

    fn substitute(&self, value: &Json) -> ApiResult<Json> {
        match value {
            Json::String(text) => match text.strip_prefix('$') {
                Some(name) => self.bindings.get(name).cloned().ok_or_else(|| {
                    Error::new(ErrorKind::Usage)
                        .with_message(format!("unbound reference '${name}'"))
                        .with_hint("Bind a step result with \"as\" before referring to it.")
                }),
                None => Ok(value.clone()),
            },
            Json::Array(items) => items
                .iter()
                .map(|item| self.substitute(item))
                .collect::<ApiResult<Vec<_>>>()
                .map(Json::Array),
            Json::Object(map) => map
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.substitute(item)?)))
                .collect::<ApiResult<Map<_, _>>>()
                .map(Json::Object),
            other => Ok(other.clone()),
        }
    }
}

struct Args<'a> {
    op: &'a str,
    map: Map<String, Json>,
}

impl Args<'_> {
    fn invalid(&self, name: &str, problem: &str) -> Error {
        Error::new(ErrorKind::Usage).with_message(format!("{}: '{name}' {problem}", self.op))
    }

    fn optional(&self, name: &str) -> Option<&Json> {
        self.map.get(name).filter(|value| !value.is_null())
    }

    fn required(&self, name: &str) -> ApiResult<&Json> {
        self.optional(name).ok_or_else(|| self.invalid(name, "is required"))
    }

    fn str(&self, name: &str) -> ApiResult<&str> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| self.invalid(name, "must be a string"))
    }

    fn optional_str(&self, name: &str) -> ApiResult<Option<&str>> {
        match self.optional(name) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| self.invalid(name, "must be a string")),
        }
    }

    fn optional_bool(&self, name: &str) -> ApiResult<Option<bool>> {
        match self.optional(name) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.invalid(name, "must be a boolean")),
        }
    }

    fn optional_usize(&self, name: &str) -> ApiResult<Option<usize>> {
        match self.optional(name) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.invalid(name, "must be a non-negative integer")),
        }
    }

    /// Number of elements to draw; anything but a JSON integer is a type mismatch.
    fn draw_count(&self, name: &str) -> ApiResult<usize> {
        let value = self.required(name)?;
        let Some(n) = value.as_i64() else {
            return Err(Error::new(ErrorKind::TypeMismatch)
                .with_message(format!("number of neurons {name} should be an integer")));
        };
        usize::try_from(n).map_err(|_| {
            Error::new(ErrorKind::ArgumentShape)
                .with_message(format!("{}: '{name}' must not be negative (got {n})", self.op))
        })
    }

    fn object(&self, value: &Json, name: &str) -> ApiResult<ParamMap> {
        match value {
            Json::Object(map) => map_from_json(map),
            _ => Err(self.invalid(name, "must be an object")),
        }
    }

    fn objects(&self, name: &str) -> ApiResult<Vec<ParamMap>> {
        match self.required(name)? {
            Json::Array(items) => items.iter().map(|item| self.object(item, name)).collect(),
            _ => Err(self.invalid(name, "must be an array of objects")),
        }
    }

    fn optional_object(&self, name: &str) -> ApiResult<Option<ParamMap>> {
        self.optional(name)
            .map(|value| self.object(value, name))
            .transpose()
    }

    /// Element ids; a bare integer counts as a one-element list.
    fn ids(&self, name: &str) -> ApiResult<Vec<ElementId>> {
        let value = self.required(name)?;
        let items = match value {
            Json::Array(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        };
        items
            .iter()
            .map(|item| {
                item.as_u64()
                    .ok_or_else(|| self.invalid(name, "must hold non-negative integer ids"))
            })
            .collect()
    }

    fn targets(&self, name: &str) -> ApiResult<Targets> {
        Targets::from_value(&Value::from_json(self.required(name)?)?)
    }

    fn keys(&self) -> ApiResult<StatusKeys> {
        let keys = self.optional("keys").map(Value::from_json).transpose()?;
        StatusKeys::from_value(keys.as_ref())
    }

    /// `params` (object or array of objects), or a `key` with a `value`. With a target
    /// count the keyed value is broadcast to it; without one it stays a single value.
    fn status_params(&self, targets: Option<usize>) -> ApiResult<StatusParams> {
        if let Some(key) = self.optional_str("key")? {
            let value = Value::from_json(self.required("value")?)?;
            let value = match targets {
                Some(length) => Broadcast::Sequence(broadcast_value(value, length, ATOMIC_KINDS, key)?),
                None => Broadcast::Scalar(value),
            };
            return Ok(StatusParams::keyed(key, value));
        }
        match self.required("params")? {
            Json::Array(items) => Ok(StatusParams::Maps(Broadcast::Sequence(
                items
                    .iter()
                    .map(|item| self.object(item, "params"))
                    .collect::<ApiResult<_>>()?,
            ))),
            other => Ok(StatusParams::from(self.object(other, "params")?)),
        }
    }

    fn f64_broadcast(&self, name: &str) -> ApiResult<Option<Broadcast<f64>>> {
        let number = |value: &Json| {
            value
                .as_f64()
                .ok_or_else(|| self.invalid(name, "must be a number or a list of numbers"))
        };
        match self.optional(name) {
            None => Ok(None),
            Some(Json::Array(items)) => items
                .iter()
                .map(number)
                .collect::<ApiResult<Vec<_>>>()
                .map(|values| Some(Broadcast::Sequence(values))),
            Some(value) => number(value).map(|value| Some(Broadcast::Scalar(value))),
        }
    }

    /// Numbers select the weight/delay variant, objects the parameter-map variant.
    fn synapse_params(&self, name: &str) -> ApiResult<Option<SynapseParams>> {
        let Some(value) = self.optional(name) else {
            return Ok(None);
        };
        let numeric = match value {
            Json::Array(items) => items.first().is_some_and(Json::is_number),
            other => other.is_number(),
        };
        if numeric {
            return Ok(self.f64_broadcast(name)?.map(SynapseParams::Weights));
        }
        match value {
            Json::Array(items) => Ok(Some(SynapseParams::Maps(Broadcast::Sequence(
                items
                    .iter()
                    .map(|item| self.object(item, name))
                    .collect::<ApiResult<_>>()?,
            )))),
            other => Ok(Some(SynapseParams::from(self.object(other, name)?))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Script, ScriptRunner};
    use crate::api::{ErrorKind, Marshaller, MarshallerOptions, StackCheck};
    use crate::reference::ReferenceInterpreter;

    fn runner() -> ScriptRunner<ReferenceInterpreter> {
        ScriptRunner::new(Marshaller::with_options(
            ReferenceInterpreter::new(),
            MarshallerOptions::new().with_stack_check(StackCheck::Always),
        ))
    }

    fn script(value: serde_json::Value) -> Script {
        Script::parse(&value.to_string()).expect("script")
    }

    #[test]
    fn bindings_feed_later_steps() {
        let mut runner = runner();
        let results = runner
            .run(&script(json!([
                {"op": "create", "model": "iaf_neuron", "n": 2, "as": "pre"},
                {"op": "create", "model": "iaf_neuron", "n": 2, "as": "post"},
                {"op": "connect", "pre": "$pre", "post": "$post", "params": 2.5, "delay": [1.0, 2.0]},
                {"op": "get_connections", "source": "$pre", "as": "conns"},
                {"op": "get_status", "targets": "$conns", "keys": ["weight", "delay"]},
            ])))
            .expect("run");
        assert_eq!(results[0], json!([1, 2]));
        assert_eq!(results[4], json!([[2.5, 1.0], [2.5, 2.0]]));
    }

    #[test]
    fn keyed_values_broadcast_from_arrays() {
        let mut runner = runner();
        let results = runner
            .run(&script(json!([
                {"op": "create", "model": "iaf_neuron", "n": 2, "as": "ids"},
                {"op": "set_status", "targets": "$ids", "key": "V_m", "value": [-60.0, -50.0]},
                {"op": "get_status", "targets": "$ids", "keys": "V_m"},
            ])))
            .expect("run");
        assert_eq!(results[2], json!([-60.0, -50.0]));
    }

    #[test]
    fn unbound_reference_is_a_usage_error() {
        let mut runner = runner();
        let err = runner
            .run(&script(json!([{"op": "get_status", "targets": "$missing"}])))
            .expect_err("unbound");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.hint(), Some("Bind a step result with \"as\" before referring to it."));
    }

    #[test]
    fn failing_step_is_named_in_hint() {
        let mut runner = runner();
        let err = runner
            .run(&script(json!([
                {"op": "simulate", "t": 1.0},
                {"op": "create", "model": "nope"},
            ])))
            .expect_err("engine");
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert_eq!(err.hint(), Some("while running step 1 (create)"));
    }

    #[test]
    fn non_array_script_is_rejected() {
        let err = Script::parse("{\"op\": \"create\"}").expect_err("object");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn random_convergent_draws_from_pre_for_every_post() {
        let mut runner = runner();
        let results = runner
            .run(&script(json!([
                {"op": "create", "model": "iaf_neuron", "n": 5, "as": "pre"},
                {"op": "create", "model": "iaf_neuron", "n": 2, "as": "post"},
                {"op": "random_convergent_connect", "pre": "$pre", "post": "$post", "n": 3,
                 "weight": 2.0, "delay": 1.0, "options": {"allow_multapses": false}},
                {"op": "get_connections", "target": "$post", "as": "conns"},
                {"op": "get_status", "targets": "$conns", "keys": "weight"},
            ])))
            .expect("run");
        assert_eq!(results[4], json!([2.0, 2.0, 2.0, 2.0, 2.0, 2.0]));
    }

    #[test]
    fn fractional_draw_count_is_a_type_mismatch() {
        let mut runner = runner();
        let err = runner
            .run(&script(json!([
                {"op": "create", "model": "iaf_neuron", "n": 3, "as": "ids"},
                {"op": "random_divergent_connect", "pre": "$ids", "post": "$ids", "n": 1.5},
            ])))
            .expect_err("fractional");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(err.message(), Some("number of neurons n should be an integer"));

        let err = runner
            .run(&script(json!([
                {"op": "random_divergent_connect", "pre": [1], "post": [2], "n": -1},
            ])))
            .expect_err("negative");
        assert_eq!(err.kind(), ErrorKind::ArgumentShape);
    }

    #[test]
    fn keyed_values_must_match_the_target_count() {
        let mut runner = runner();
        let err = runner
            .run(&script(json!([
                {"op": "create", "model": "iaf_neuron", "n": 2, "as": "ids"},
                {"op": "set_status", "targets": "$ids", "key": "V_m", "value": [-60.0, -55.0, -50.0]},
            ])))
            .expect_err("three values for two targets");
        assert_eq!(err.kind(), ErrorKind::ArgumentShape);
    }

    #[test]
    fn default_list_values_stay_lists() {
        let mut runner = runner();
        let results = runner
            .run(&script(json!([
                {"op": "set_defaults", "model": "voltmeter", "key": "record_from", "value": ["V_m", "g_ex"]},
                {"op": "get_defaults", "model": "voltmeter", "keys": "record_from"},
            ])))
            .expect("run");
        assert_eq!(results[1], json!(["V_m", "g_ex"]));
    }

    #[test]
    fn find_connections_repeats_a_single_target() {
        let mut runner = runner();
        let results = runner
            .run(&script(json!([
                {"op": "create", "model": "iaf_neuron", "n": 2, "as": "pre"},
                {"op": "create", "model": "iaf_neuron", "n": 2, "as": "post"},
                {"op": "divergent_connect", "pre": "$pre", "post": "$post"},
                {"op": "find_connections", "source": "$pre", "target": 4, "as": "found"},
                {"op": "get_status", "targets": "$found", "keys": "target"},
            ])))
            .expect("run");
        assert_eq!(results[4], json!([4, 4]));
    }

    #[test]
    fn data_connect_accepts_columns_and_synapse_states() {
        let mut runner = runner();
        let results = runner
            .run(&script(json!([
                {"op": "create", "model": "iaf_neuron", "n": 3, "as": "ids"},
                {"op": "data_connect", "pre": [1],
                 "params": [{"target": [2, 3], "weight": [1.0, 2.0], "delay": [1.0, 1.0]}]},
                {"op": "data_connect", "synapses": [
                    {"source": 2, "target": 3, "weight": 5.0, "synapse_model": "static_synapse"}]},
                {"op": "get_connections", "as": "conns"},
                {"op": "get_status", "targets": "$conns", "keys": "weight"},
            ])))
            .expect("run");
        assert_eq!(results[4], json!([1.0, 2.0, 5.0]));
    }

    #[test]
    fn print_network_reports_local_ids_and_resume_succeeds() {
        let mut runner = runner();
        let results = runner
            .run(&script(json!([
                {"op": "create", "model": "iaf_neuron", "n": 2, "as": "ids"},
                {"op": "get_lid", "id": 2},
                {"op": "print_network", "depth": 1},
                {"op": "simulate", "t": 5.0},
                {"op": "resume_simulation"},
            ])))
            .expect("run");
        assert_eq!(results[1], json!(2));
        assert!(runner.marshaller().channel().output().contains("+-[0] subnet dim=[2]"));
    }
}
