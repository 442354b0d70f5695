// Command table: operand decoding and dispatch onto the network store.
#![allow(clippy::result_large_err)]

use crate::core::connection::{ConnectionHandle, encode_all};
use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ElementId, ParamMap, Value};

use super::network::{ConnectionQuery, Fault, Network, RANDOM_COMMANDS};

/// Operand access for one command. Operands are popped top first, and a
/// failing command has already consumed whatever it popped.
struct Operands<'a> {
    stack: &'a mut Vec<Value>,
    command: &'a str,
}

impl Operands<'_> {
    fn fail(&self, name: &str, detail: impl std::fmt::Display) -> Error {
        Error::new(ErrorKind::Engine)
            .with_message(format!("{name} in {}: {detail}", self.command))
            .with_operation(self.command.to_string())
    }

    fn raise(&self, fault: Fault) -> Error {
        self.fail(fault.name, fault.detail)
    }

    fn value(&mut self) -> Result<Value, Error> {
        self.stack
            .pop()
            .ok_or_else(|| self.fail("StackUnderflow", "not enough operands"))
    }

    fn mismatch(&self, expected: &str, got: &Value) -> Error {
        self.fail(
            "ArgumentType",
            format!("expected {expected}, got {:?}", got.kind()),
        )
    }

    fn int(&mut self) -> Result<i64, Error> {
        match self.value()? {
            Value::Int(raw) => Ok(raw),
            other => Err(self.mismatch("integer", &other)),
        }
    }

    fn id(&mut self) -> Result<ElementId, Error> {
        let raw = self.int()?;
        self.to_id(raw)
    }

    fn to_id(&self, raw: i64) -> Result<ElementId, Error> {
        ElementId::try_from(raw).map_err(|_| self.fail("UnknownNode", format!("node {raw} does not exist")))
    }

    fn double(&mut self) -> Result<f64, Error> {
        match self.value()? {
            Value::Double(raw) => Ok(raw),
            Value::Int(raw) => Ok(raw as f64),
            other => Err(self.mismatch("double", &other)),
        }
    }

    fn boolean(&mut self) -> Result<bool, Error> {
        match self.value()? {
            Value::Bool(flag) => Ok(flag),
            other => Err(self.mismatch("boolean", &other)),
        }
    }

    fn literal(&mut self) -> Result<String, Error> {
        match self.value()? {
            Value::Literal(name) | Value::String(name) => Ok(name),
            other => Err(self.mismatch("literal", &other)),
        }
    }

    fn dict(&mut self) -> Result<ParamMap, Error> {
        match self.value()? {
            Value::Dict(map) => Ok(map),
            other => Err(self.mismatch("dictionary", &other)),
        }
    }

    fn array(&mut self) -> Result<Vec<Value>, Error> {
        match self.value()? {
            Value::Array(items) => Ok(items),
            other => Err(self.mismatch("array", &other)),
        }
    }

    fn ids(&mut self) -> Result<Vec<ElementId>, Error> {
        let items = self.array()?;
        items
            .iter()
            .map(|item| match item {
                Value::Int(raw) => self.to_id(*raw),
                other => Err(self.mismatch("integer", other)),
            })
            .collect()
    }

    fn doubles(&mut self) -> Result<Vec<f64>, Error> {
        let items = self.array()?;
        items
            .iter()
            .map(|item| {
                item.as_f64()
                    .ok_or_else(|| self.mismatch("double", item))
            })
            .collect()
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }
}

enum Target {
    Element(ElementId),
    Connection(ConnectionHandle),
}

pub(super) fn execute(
    network: &mut Network,
    stack: &mut Vec<Value>,
    output: &mut String,
    command: &str,
) -> Result<(), Error> {
    let mut ops = Operands { stack, command };
    match command {
        "Create_l_i" | "Create_l_i_D" => {
            let params = if command == "Create_l_i_D" {
                Some(ops.dict()?)
            } else {
                None
            };
            let n = ops.int()?;
            let model = ops.literal()?;
            let last = network.create(&model, n, params).map_err(|f| ops.raise(f))?;
            ops.push(Value::id(last)?);
        }
        "SetStatus_a_a" => {
            let params = ops.array()?;
            let targets = ops.array()?;
            let targets = targets_of(&ops, targets)?;
            if params.len() != targets.len() {
                return Err(ops.fail(
                    "RangeCheck",
                    format!("{} parameter maps for {} targets", params.len(), targets.len()),
                ));
            }
            for (target, params) in targets.into_iter().zip(params) {
                let update = match params {
                    Value::Dict(update) => update,
                    other => return Err(ops.mismatch("dictionary", &other)),
                };
                let applied = match target {
                    Target::Element(id) => network.set_element_status(id, update),
                    Target::Connection(handle) => network.set_connection_status(&handle, update),
                };
                applied.map_err(|f| ops.raise(f))?;
            }
        }
        "GetStatus_a" | "GetStatus_a_l" | "GetStatus_a_a" => {
            let keys = match command {
                "GetStatus_a_l" => Some(vec![ops.literal()?]),
                "GetStatus_a_a" => {
                    let names = ops.array()?;
                    let mut keys = Vec::with_capacity(names.len());
                    for name in names {
                        match name {
                            Value::Literal(key) | Value::String(key) => keys.push(key),
                            other => return Err(ops.mismatch("literal", &other)),
                        }
                    }
                    Some(keys)
                }
                _ => None,
            };
            let targets = ops.array()?;
            let targets = targets_of(&ops, targets)?;
            let mut reply = Vec::with_capacity(targets.len());
            for target in targets {
                let status = match target {
                    Target::Element(id) => network.element_status(id),
                    Target::Connection(handle) => network.connection_status(&handle),
                }
                .map_err(|f| ops.raise(f))?;
                reply.push(match &keys {
                    None => Value::Dict(status),
                    Some(keys) => {
                        let mut row = Vec::with_capacity(keys.len());
                        for key in keys {
                            let value = status
                                .get(key)
                                .cloned()
                                .ok_or_else(|| ops.fail("UndefinedName", format!("no status entry '{key}'")))?;
                            row.push(value);
                        }
                        if command == "GetStatus_a_l" {
                            row.remove(0)
                        } else {
                            Value::Array(row)
                        }
                    }
                });
            }
            ops.push(Value::Array(reply));
        }
        "Connect_i_i_l" | "Connect_i_i_D_l" | "Connect_i_i_d_d_l" => {
            let model = ops.literal()?;
            let params = match command {
                "Connect_i_i_D_l" => Some(ops.dict()?),
                "Connect_i_i_d_d_l" => {
                    let delay = ops.double()?;
                    let weight = ops.double()?;
                    Some(weight_delay(weight, delay))
                }
                _ => None,
            };
            let target = ops.id()?;
            let source = ops.id()?;
            network
                .connect(source, target, &model, params)
                .map_err(|f| ops.raise(f))?;
        }
        "ConvergentConnect_a_i_l" | "ConvergentConnect_a_i_a_a_l" => {
            let model = ops.literal()?;
            let weighted = command == "ConvergentConnect_a_i_a_a_l";
            let (weights, delays) = if weighted {
                let delays = ops.doubles()?;
                (Some(ops.doubles()?), Some(delays))
            } else {
                (None, None)
            };
            let target = ops.id()?;
            let sources = ops.ids()?;
            let params = per_pair(&ops, sources.len(), weights, delays)?;
            for (source, params) in sources.into_iter().zip(params) {
                network
                    .connect(source, target, &model, params)
                    .map_err(|f| ops.raise(f))?;
            }
        }
        "DivergentConnect_i_a_l" | "DivergentConnect_i_a_a_a_l" => {
            let model = ops.literal()?;
            let weighted = command == "DivergentConnect_i_a_a_a_l";
            let (weights, delays) = if weighted {
                let delays = ops.doubles()?;
                (Some(ops.doubles()?), Some(delays))
            } else {
                (None, None)
            };
            let targets = ops.ids()?;
            let source = ops.id()?;
            let params = per_pair(&ops, targets.len(), weights, delays)?;
            for (target, params) in targets.into_iter().zip(params) {
                network
                    .connect(source, target, &model, params)
                    .map_err(|f| ops.raise(f))?;
            }
        }
        "GetConnections_D" => {
            let filter = ops.dict()?;
            let ids_entry = |key: &str| -> Result<Option<Vec<ElementId>>, Error> {
                match filter.get(key) {
                    None => Ok(None),
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|item| match item {
                            Value::Int(raw) => ops.to_id(*raw),
                            other => Err(ops.mismatch("integer", other)),
                        })
                        .collect::<Result<Vec<_>, _>>()
                        .map(Some),
                    Some(other) => Err(ops.mismatch("array", other)),
                }
            };
            let sources = ids_entry("source")?;
            let targets = ids_entry("target")?;
            let model = match filter.get("synapse_model") {
                None => None,
                Some(Value::Literal(name) | Value::String(name)) => Some(name.as_str()),
                Some(other) => return Err(ops.mismatch("literal", other)),
            };
            let found = network
                .connections(sources.as_deref(), targets.as_deref(), model)
                .map_err(|f| ops.raise(f))?;
            ops.push(encode_all(&found)?);
        }
        "RandomConvergentConnect_a_i_i_l" | "RandomConvergentConnect_a_i_i_a_a_l" => {
            let model = ops.literal()?;
            let weighted = command == "RandomConvergentConnect_a_i_i_a_a_l";
            let (weights, delays) = if weighted {
                let delays = ops.doubles()?;
                (Some(ops.doubles()?), Some(delays))
            } else {
                (None, None)
            };
            let n = ops.int()?;
            let target = ops.id()?;
            let pool = ops.ids()?;
            let sources = network
                .draw("RandomConvergentConnect", &pool, target, n)
                .map_err(|f| ops.raise(f))?;
            let params = per_pair(&ops, sources.len(), weights, delays)?;
            for (source, params) in sources.into_iter().zip(params) {
                network
                    .connect(source, target, &model, params)
                    .map_err(|f| ops.raise(f))?;
            }
        }
        "RandomDivergentConnect_i_a_i_l" | "RandomDivergentConnect_i_a_i_a_a_l" => {
            let model = ops.literal()?;
            let weighted = command == "RandomDivergentConnect_i_a_i_a_a_l";
            let (weights, delays) = if weighted {
                let delays = ops.doubles()?;
                (Some(ops.doubles()?), Some(delays))
            } else {
                (None, None)
            };
            let n = ops.int()?;
            let pool = ops.ids()?;
            let source = ops.id()?;
            let targets = network
                .draw("RandomDivergentConnect", &pool, source, n)
                .map_err(|f| ops.raise(f))?;
            let params = per_pair(&ops, targets.len(), weights, delays)?;
            for (target, params) in targets.into_iter().zip(params) {
                network
                    .connect(source, target, &model, params)
                    .map_err(|f| ops.raise(f))?;
            }
        }
        "GetOptions_l" => {
            let name = ops.literal()?;
            let options = network.options(&name).map_err(|f| ops.raise(f))?;
            ops.push(Value::Dict(options));
        }
        "SetOptions_l_D" => {
            let update = ops.dict()?;
            let name = ops.literal()?;
            if !RANDOM_COMMANDS.contains(&name.as_str()) {
                return Err(ops.fail("UndefinedName", format!("/{name} has no options")));
            }
            network.set_options(&name, update).map_err(|f| ops.raise(f))?;
        }
        "FindConnections_a" => {
            let entries = ops.array()?;
            let mut queries = Vec::with_capacity(entries.len());
            for entry in entries {
                let entry = match entry {
                    Value::Dict(entry) => entry,
                    other => return Err(ops.mismatch("dictionary", &other)),
                };
                let source = match entry.get("source") {
                    Some(Value::Int(raw)) => ops.to_id(*raw)?,
                    Some(other) => return Err(ops.mismatch("integer", other)),
                    None => return Err(ops.fail("UndefinedName", "filter lacks 'source'")),
                };
                let target = match entry.get("target") {
                    None => None,
                    Some(Value::Int(raw)) => Some(ops.to_id(*raw)?),
                    Some(other) => return Err(ops.mismatch("integer", other)),
                };
                let synapse_model = match entry.get("synapse_model") {
                    None => None,
                    Some(Value::Literal(name) | Value::String(name)) => Some(name.clone()),
                    Some(other) => return Err(ops.mismatch("literal", other)),
                };
                queries.push(ConnectionQuery {
                    source,
                    target,
                    synapse_model,
                });
            }
            let found = network.find_connections(&queries).map_err(|f| ops.raise(f))?;
            ops.push(encode_all(&found)?);
        }
        "DataConnect_i_D_s" => {
            let model = ops.literal()?;
            let columns = ops.dict()?;
            let source = ops.id()?;
            network
                .data_connect(source, &model, columns)
                .map_err(|f| ops.raise(f))?;
        }
        "DataConnect_a" => {
            let items = ops.array()?;
            let mut synapses = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Dict(state) => synapses.push(state),
                    other => return Err(ops.mismatch("dictionary", &other)),
                }
            }
            network
                .data_connect_synapses(synapses)
                .map_err(|f| ops.raise(f))?;
        }
        "GetChildren_a_D_b" | "GetLeaves_a_D_b" | "GetNodes_a_D_b" => {
            // Single process: every element is local, so the flag changes nothing.
            let _local_only = ops.boolean()?;
            let filter = ops.dict()?;
            let subnets = ops.ids()?;
            let mut reply = Vec::with_capacity(subnets.len());
            for subnet in subnets {
                let found = match command {
                    "GetChildren_a_D_b" => network.children(subnet),
                    "GetLeaves_a_D_b" => network.descendants(subnet, true),
                    _ => network.descendants(subnet, false),
                }
                .map_err(|f| ops.raise(f))?;
                let mut kept = Vec::with_capacity(found.len());
                for id in found {
                    if network.matches(id, &filter).map_err(|f| ops.raise(f))? {
                        kept.push(id);
                    }
                }
                reply.push(Value::ids(&kept)?);
            }
            ops.push(Value::Array(reply));
        }
        "CurrentSubnet" => ops.push(Value::id(network.current_subnet())?),
        "ChangeSubnet_i" => {
            let id = ops.id()?;
            network.change_subnet(id).map_err(|f| ops.raise(f))?;
        }
        "GetLID_i" => {
            let id = ops.id()?;
            let lid = network.local_id(id).map_err(|f| ops.raise(f))?;
            ops.push(Value::Int(lid));
        }
        "PrintNetwork_i_i" => {
            let depth = ops.int()?;
            let id = ops.id()?;
            let tree = network.print_network(id, depth).map_err(|f| ops.raise(f))?;
            output.push_str(&tree);
        }
        "GetNetwork_i_i" => {
            let depth = ops.int()?;
            let id = ops.id()?;
            let tree = network.network_tree(id, depth).map_err(|f| ops.raise(f))?;
            ops.push(tree);
        }
        "LayoutNetwork_l_a" => {
            let dims = ops.array()?;
            let model = ops.literal()?;
            let dims = dims
                .iter()
                .map(|d| d.as_int().ok_or_else(|| ops.mismatch("integer", d)))
                .collect::<Result<Vec<_>, _>>()?;
            let subnet = network.layout(&model, &dims).map_err(|f| ops.raise(f))?;
            ops.push(Value::id(subnet)?);
        }
        "Models_l" => {
            let table = ops.literal()?;
            let synapses = match table.as_str() {
                "nodes" => false,
                "synapses" => true,
                other => return Err(ops.fail("BadParameter", format!("unknown model table '{other}'"))),
            };
            let names = network.model_names(synapses);
            ops.push(Value::Array(names.into_iter().map(Value::Literal).collect()));
        }
        "GetDefaults_l" => {
            let model = ops.literal()?;
            let defaults = network.model_defaults(&model).map_err(|f| ops.raise(f))?;
            ops.push(Value::Dict(defaults));
        }
        "SetDefaults_l_D" => {
            let params = ops.dict()?;
            let model = ops.literal()?;
            network.set_defaults(&model, params).map_err(|f| ops.raise(f))?;
        }
        "CopyModel_l_l_D" => {
            let params = ops.dict()?;
            let new = ops.literal()?;
            let existing = ops.literal()?;
            network
                .copy_model(&existing, &new, params)
                .map_err(|f| ops.raise(f))?;
        }
        "SetKernelStatus_D" => {
            let params = ops.dict()?;
            network.set_kernel_status(params).map_err(|f| ops.raise(f))?;
        }
        "GetKernelStatus" => ops.push(Value::Dict(network.kernel_status())),
        "ResetKernel" => *network = Network::new(),
        "ResetNetwork" => network.reset_network(),
        "Simulate_d" => {
            let t = ops.double()?;
            network.simulate(t).map_err(|f| ops.raise(f))?;
        }
        // Reference simulations run to completion, so there is never anything to resume.
        "ResumeSimulation" => {}
        other => return Err(ops.fail("UndefinedName", format!("unknown command '{other}'"))),
    }
    Ok(())
}

fn targets_of(ops: &Operands<'_>, items: Vec<Value>) -> Result<Vec<Target>, Error> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Int(raw) => ops.to_id(raw).map(Target::Element),
            Value::Connection(_) => ConnectionHandle::decode(&item)
                .map(Target::Connection)
                .map_err(|err| ops.fail("ArgumentType", err.message().unwrap_or("bad connection"))),
            other => Err(ops.mismatch("id or connection", &other)),
        })
        .collect()
}

fn weight_delay(weight: f64, delay: f64) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert("weight".to_string(), Value::Double(weight));
    params.insert("delay".to_string(), Value::Double(delay));
    params
}

fn per_pair(
    ops: &Operands<'_>,
    len: usize,
    weights: Option<Vec<f64>>,
    delays: Option<Vec<f64>>,
) -> Result<Vec<Option<ParamMap>>, Error> {
    match (weights, delays) {
        (Some(weights), Some(delays)) => {
            if weights.len() != len || delays.len() != len {
                return Err(ops.fail(
                    "RangeCheck",
                    format!(
                        "{} weights and {} delays for {len} connections",
                        weights.len(),
                        delays.len()
                    ),
                ));
            }
            Ok(weights
                .into_iter()
                .zip(delays)
                .map(|(w, d)| Some(weight_delay(w, d)))
                .collect())
        }
        _ => Ok(vec![None; len]),
    }
}
