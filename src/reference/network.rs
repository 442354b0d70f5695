//! Purpose: In-memory element/connection store backing the reference interpreter.
//! Exports: `Network`, `Fault`, `ModelClass`, `ConnectionQuery`.
//! Role: State and rules only; operand handling lives in `commands`.
//! Invariants: Ids are allocated contiguously; the root container is id 0 and is its own parent.
//! Invariants: Connection ports count upward per source in creation order.
//! Invariants: Random draws come from one generator seeded by the kernel's `grng_seed`.
use std::collections::BTreeMap;

use rand_chacha::{
    ChaCha20Rng,
    rand_core::{Rng, SeedableRng},
};

use crate::core::connection::ConnectionHandle;
use crate::core::value::{ElementId, ParamMap, Value};

/// Commands whose behavior is tuned through `GetOptions`/`SetOptions`.
pub const RANDOM_COMMANDS: &[&str] = &["RandomConvergentConnect", "RandomDivergentConnect"];
const DEFAULT_OPTIONS: &str = "DefaultOptions";

/// Engine-level failure, named the way the interpreter reports it.
#[derive(Debug)]
pub struct Fault {
    pub name: &'static str,
    pub detail: String,
}

pub fn fault(name: &'static str, detail: impl Into<String>) -> Fault {
    Fault {
        name,
        detail: detail.into(),
    }
}

pub type FaultResult<T> = Result<T, Fault>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModelClass {
    Neuron,
    Generator,
    Recorder,
    Detector,
    Subnet,
    Synapse,
}

impl ModelClass {
    fn emits(self) -> bool {
        matches!(self, ModelClass::Neuron | ModelClass::Generator | ModelClass::Recorder)
    }

    fn accepts(self) -> bool {
        matches!(self, ModelClass::Neuron | ModelClass::Detector)
    }
}

#[derive(Clone, Debug)]
struct Model {
    class: ModelClass,
    defaults: ParamMap,
}

#[derive(Clone, Debug)]
struct Element {
    model: String,
    class: ModelClass,
    parent: ElementId,
    params: ParamMap,
    children: Vec<ElementId>,
}

/// One source with optional target and synapse model constraints.
#[derive(Clone, Debug)]
pub struct ConnectionQuery {
    pub source: ElementId,
    pub target: Option<ElementId>,
    pub synapse_model: Option<String>,
}

#[derive(Clone, Debug)]
struct Synapse {
    handle: ConnectionHandle,
    model: String,
    params: ParamMap,
}

/// Status keys the engine computes itself.
const ELEMENT_FIXED: &[&str] = &["global_id", "parent", "model", "local"];
const SYNAPSE_FIXED: &[&str] = &["source", "target", "synapse_model", "target_thread", "port"];

#[derive(Clone, Debug)]
pub struct Network {
    models: BTreeMap<String, Model>,
    synapse_ids: Vec<String>,
    elements: Vec<Element>,
    synapses: Vec<Synapse>,
    current: ElementId,
    kernel: ParamMap,
    options: BTreeMap<String, ParamMap>,
    rng: ChaCha20Rng,
}

impl Network {
    pub fn new() -> Self {
        let mut network = Self {
            models: BTreeMap::new(),
            synapse_ids: Vec::new(),
            elements: Vec::new(),
            synapses: Vec::new(),
            current: 0,
            kernel: ParamMap::new(),
            options: BTreeMap::new(),
            rng: seeded(0),
        };
        network.install_builtin_models();
        network.kernel = params(&[
            ("resolution", Value::Double(0.1)),
            ("time", Value::Double(0.0)),
            ("dict_miss_is_error", Value::Bool(true)),
            ("total_num_virtual_procs", Value::Int(1)),
            ("grng_seed", Value::Int(0)),
        ]);
        let defaults = params(&[
            ("allow_autapses", Value::Bool(true)),
            ("allow_multapses", Value::Bool(true)),
        ]);
        for command in RANDOM_COMMANDS {
            let mut options = defaults.clone();
            options.insert(DEFAULT_OPTIONS.to_string(), Value::Dict(defaults.clone()));
            network.options.insert(command.to_string(), options);
        }
        let root = network.new_element("subnet", ModelClass::Subnet, 0);
        debug_assert_eq!(root, 0);
        network
    }

    fn install_builtin_models(&mut self) {
        let neuron = |model: &str, c_m: f64| {
            params(&[
                ("model", Value::literal(model)),
                ("V_m", Value::Double(-70.0)),
                ("E_L", Value::Double(-70.0)),
                ("C_m", Value::Double(c_m)),
                ("tau_m", Value::Double(10.0)),
                ("t_ref", Value::Double(2.0)),
                ("V_th", Value::Double(-55.0)),
                ("V_reset", Value::Double(-70.0)),
                ("I_e", Value::Double(0.0)),
                ("frozen", Value::Bool(false)),
            ])
        };
        self.add_model("iaf_neuron", ModelClass::Neuron, neuron("iaf_neuron", 250.0));
        self.add_model("iaf_psc_alpha", ModelClass::Neuron, neuron("iaf_psc_alpha", 250.0));
        self.add_model(
            "poisson_generator",
            ModelClass::Generator,
            params(&[
                ("model", Value::literal("poisson_generator")),
                ("rate", Value::Double(0.0)),
                ("start", Value::Double(0.0)),
                ("frozen", Value::Bool(false)),
            ]),
        );
        self.add_model(
            "voltmeter",
            ModelClass::Recorder,
            params(&[
                ("model", Value::literal("voltmeter")),
                ("interval", Value::Double(1.0)),
                ("record_from", Value::Array(vec![Value::literal("V_m")])),
                ("withtime", Value::Bool(true)),
                ("frozen", Value::Bool(false)),
            ]),
        );
        self.add_model(
            "spike_detector",
            ModelClass::Detector,
            params(&[
                ("model", Value::literal("spike_detector")),
                ("withgid", Value::Bool(true)),
                ("withtime", Value::Bool(true)),
                ("frozen", Value::Bool(false)),
            ]),
        );
        self.add_model(
            "subnet",
            ModelClass::Subnet,
            params(&[
                ("model", Value::literal("subnet")),
                ("label", Value::from("")),
                ("customdict", Value::Dict(ParamMap::new())),
                ("children_on_same_vp", Value::Bool(true)),
                ("frozen", Value::Bool(false)),
            ]),
        );
        let synapse = |model: &str, extra: &[(&str, Value)]| {
            let mut defaults = params(&[
                ("synapse_model", Value::literal(model)),
                ("weight", Value::Double(1.0)),
                ("delay", Value::Double(1.0)),
            ]);
            defaults.extend(params(extra));
            defaults
        };
        self.add_model("static_synapse", ModelClass::Synapse, synapse("static_synapse", &[]));
        self.add_model(
            "stdp_synapse",
            ModelClass::Synapse,
            synapse(
                "stdp_synapse",
                &[
                    ("tau_plus", Value::Double(20.0)),
                    ("lambda", Value::Double(0.01)),
                    ("alpha", Value::Double(1.0)),
                    ("Wmax", Value::Double(100.0)),
                ],
            ),
        );
    }

    fn add_model(&mut self, name: &str, class: ModelClass, defaults: ParamMap) {
        if class == ModelClass::Synapse {
            self.synapse_ids.push(name.to_string());
        }
        self.models.insert(name.to_string(), Model { class, defaults });
    }

    fn new_element(&mut self, model: &str, class: ModelClass, parent: ElementId) -> ElementId {
        let id = self.elements.len() as ElementId;
        let params = self
            .models
            .get(model)
            .map(|m| m.defaults.clone())
            .unwrap_or_default();
        self.elements.push(Element {
            model: model.to_string(),
            class,
            parent,
            params,
            children: Vec::new(),
        });
        if id != parent {
            if let Some(container) = self.elements.get_mut(parent as usize) {
                container.children.push(id);
            }
        }
        id
    }

    pub fn dict_miss_is_error(&self) -> bool {
        !matches!(self.kernel.get("dict_miss_is_error"), Some(Value::Bool(false)))
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn model_defaults(&self, model: &str) -> FaultResult<ParamMap> {
        self.model(model).map(|m| m.defaults.clone())
    }

    fn model(&self, name: &str) -> FaultResult<&Model> {
        self.models
            .get(name)
            .ok_or_else(|| fault("UnknownModelName", format!("/{name} is not a known model")))
    }

    pub fn model_names(&self, synapses: bool) -> Vec<String> {
        self.models
            .iter()
            .filter(|(_, model)| (model.class == ModelClass::Synapse) == synapses)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn set_defaults(&mut self, model: &str, update: ParamMap) -> FaultResult<()> {
        let strict = self.dict_miss_is_error();
        let entry = self
            .models
            .get_mut(model)
            .ok_or_else(|| fault("UnknownModelName", format!("/{model} is not a known model")))?;
        let fixed: &[&str] = &["model", "synapse_model"];
        merge(&mut entry.defaults, update, fixed, strict)
    }

    pub fn copy_model(&mut self, existing: &str, new: &str, update: ParamMap) -> FaultResult<()> {
        if self.models.contains_key(new) {
            return Err(fault("NewModelNameExists", format!("/{new} is already a model")));
        }
        let strict = self.dict_miss_is_error();
        let source = self.model(existing)?.clone();
        let mut defaults = source.defaults;
        let name_key = if source.class == ModelClass::Synapse {
            "synapse_model"
        } else {
            "model"
        };
        defaults.insert(name_key.to_string(), Value::literal(new));
        merge(&mut defaults, update, &[name_key], strict)?;
        self.add_model(new, source.class, defaults);
        Ok(())
    }

    /// Create `n` instances under the current container; returns the last id.
    pub fn create(&mut self, model: &str, n: i64, update: Option<ParamMap>) -> FaultResult<ElementId> {
        let class = self.model(model)?.class;
        if class == ModelClass::Synapse {
            return Err(fault("UnknownModelName", format!("/{model} is a synapse model")));
        }
        if n < 1 {
            return Err(fault("RangeCheck", format!("cannot create {n} elements")));
        }
        let mut defaults = self.model(model)?.defaults.clone();
        if let Some(update) = update {
            merge(&mut defaults, update, ELEMENT_FIXED, self.dict_miss_is_error())?;
        }
        let parent = self.current;
        let mut last = parent;
        for _ in 0..n {
            last = self.new_element(model, class, parent);
            self.elements[last as usize].params = defaults.clone();
        }
        Ok(last)
    }

    fn element(&self, id: ElementId) -> FaultResult<&Element> {
        self.elements
            .get(id as usize)
            .ok_or_else(|| fault("UnknownNode", format!("node {id} does not exist")))
    }

    pub fn element_status(&self, id: ElementId) -> FaultResult<ParamMap> {
        let element = self.element(id)?;
        let mut status = element.params.clone();
        status.insert("global_id".to_string(), id_value(id)?);
        status.insert("parent".to_string(), id_value(element.parent)?);
        status.insert("model".to_string(), Value::literal(element.model.as_str()));
        status.insert("local".to_string(), Value::Bool(true));
        Ok(status)
    }

    pub fn set_element_status(&mut self, id: ElementId, update: ParamMap) -> FaultResult<()> {
        let strict = self.dict_miss_is_error();
        self.element(id)?;
        let element = &mut self.elements[id as usize];
        merge(&mut element.params, update, ELEMENT_FIXED, strict)
    }

    fn synapse_index(&self, handle: &ConnectionHandle) -> FaultResult<usize> {
        self.synapses
            .iter()
            .position(|synapse| synapse.handle == *handle)
            .ok_or_else(|| fault("UnknownConnection", format!("no connection {handle:?}")))
    }

    pub fn connection_status(&self, handle: &ConnectionHandle) -> FaultResult<ParamMap> {
        let synapse = &self.synapses[self.synapse_index(handle)?];
        let mut status = synapse.params.clone();
        status.insert("source".to_string(), id_value(synapse.handle.source)?);
        status.insert("target".to_string(), id_value(synapse.handle.target)?);
        status.insert("target_thread".to_string(), Value::Int(synapse.handle.target_thread));
        status.insert("port".to_string(), Value::Int(synapse.handle.port));
        status.insert("synapse_model".to_string(), Value::literal(synapse.model.as_str()));
        Ok(status)
    }

    pub fn set_connection_status(
        &mut self,
        handle: &ConnectionHandle,
        update: ParamMap,
    ) -> FaultResult<()> {
        let strict = self.dict_miss_is_error();
        let index = self.synapse_index(handle)?;
        check_delay(&update)?;
        merge(&mut self.synapses[index].params, update, SYNAPSE_FIXED, strict)
    }

    pub fn connect(
        &mut self,
        source: ElementId,
        target: ElementId,
        model: &str,
        update: Option<ParamMap>,
    ) -> FaultResult<()> {
        let synapse_model = self.model(model)?;
        if synapse_model.class != ModelClass::Synapse {
            return Err(fault("UnknownSynapseType", format!("/{model} is not a synapse model")));
        }
        let mut params = synapse_model.defaults.clone();
        params.remove("synapse_model");
        let source_class = self.element(source)?.class;
        let target_class = self.element(target)?.class;
        if !source_class.emits() {
            return Err(fault(
                "UnexpectedEvent",
                format!("node {source} cannot send events"),
            ));
        }
        if !target_class.accepts() {
            return Err(fault(
                "IllegalConnection",
                format!("node {target} does not accept events from node {source}"),
            ));
        }
        if let Some(update) = update {
            check_delay(&update)?;
            merge(&mut params, update, SYNAPSE_FIXED, self.dict_miss_is_error())?;
        }
        let port = self
            .synapses
            .iter()
            .filter(|synapse| synapse.handle.source == source)
            .count() as i64;
        let synapse_model_id = self
            .synapse_ids
            .iter()
            .position(|name| name == model)
            .unwrap_or_default() as i64;
        self.synapses.push(Synapse {
            handle: ConnectionHandle {
                source,
                target,
                target_thread: 0,
                synapse_model_id,
                port,
            },
            model: model.to_string(),
            params,
        });
        Ok(())
    }

    pub fn connections(
        &self,
        sources: Option<&[ElementId]>,
        targets: Option<&[ElementId]>,
        model: Option<&str>,
    ) -> FaultResult<Vec<ConnectionHandle>> {
        if let Some(model) = model {
            if !self.synapse_ids.iter().any(|name| name == model) {
                return Err(fault("UnknownSynapseType", format!("/{model} is not a synapse model")));
            }
        }
        let mut found: Vec<ConnectionHandle> = self
            .synapses
            .iter()
            .filter(|s| sources.is_none_or(|ids| ids.contains(&s.handle.source)))
            .filter(|s| targets.is_none_or(|ids| ids.contains(&s.handle.target)))
            .filter(|s| model.is_none_or(|name| s.model == name))
            .map(|s| s.handle)
            .collect();
        found.sort_by_key(|handle| (handle.source, handle.port));
        Ok(found)
    }

    pub fn current_subnet(&self) -> ElementId {
        self.current
    }

    pub fn change_subnet(&mut self, id: ElementId) -> FaultResult<()> {
        self.subnet(id)?;
        self.current = id;
        Ok(())
    }

    fn subnet(&self, id: ElementId) -> FaultResult<&Element> {
        let element = self.element(id)?;
        if element.class != ModelClass::Subnet {
            return Err(fault("SubnetExpected", format!("node {id} is not a subnet")));
        }
        Ok(element)
    }

    pub fn children(&self, id: ElementId) -> FaultResult<Vec<ElementId>> {
        Ok(self.subnet(id)?.children.clone())
    }

    /// Depth-first, pre-order descendants of `id`.
    pub fn descendants(&self, id: ElementId, leaves_only: bool) -> FaultResult<Vec<ElementId>> {
        let mut out = Vec::new();
        self.walk(id, leaves_only, &mut out)?;
        Ok(out)
    }

    fn walk(&self, id: ElementId, leaves_only: bool, out: &mut Vec<ElementId>) -> FaultResult<()> {
        for &child in &self.subnet(id)?.children {
            let is_subnet = self.elements[child as usize].class == ModelClass::Subnet;
            if !is_subnet || !leaves_only {
                out.push(child);
            }
            if is_subnet {
                self.walk(child, leaves_only, out)?;
            }
        }
        Ok(())
    }

    /// Exact match of every filter entry against the element's status.
    pub fn matches(&self, id: ElementId, filter: &ParamMap) -> FaultResult<bool> {
        if filter.is_empty() {
            return Ok(true);
        }
        let status = self.element_status(id)?;
        Ok(filter
            .iter()
            .all(|(key, wanted)| status.get(key).is_some_and(|have| same_value(have, wanted))))
    }

    pub fn network_tree(&self, id: ElementId, depth: i64) -> FaultResult<Value> {
        let children = self.children(id)?;
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            let is_subnet = self.elements[child as usize].class == ModelClass::Subnet;
            if depth > 0 && is_subnet {
                out.push(self.network_tree(child, depth - 1)?);
            } else {
                out.push(id_value(child)?);
            }
        }
        Ok(Value::Array(out))
    }

    pub fn layout(&mut self, model: &str, dims: &[i64]) -> FaultResult<ElementId> {
        if dims.is_empty() || dims.iter().any(|&d| d < 1) {
            return Err(fault("RangeCheck", "dimensions must be positive"));
        }
        let saved = self.current;
        let result = self.layout_level(model, dims);
        self.current = saved;
        result
    }

    fn layout_level(&mut self, model: &str, dims: &[i64]) -> FaultResult<ElementId> {
        let subnet = self.create("subnet", 1, None)?;
        self.current = subnet;
        match dims {
            [n] => {
                self.create(model, *n, None)?;
            }
            [n, rest @ ..] => {
                for _ in 0..*n {
                    self.layout_level(model, rest)?;
                    self.current = subnet;
                }
            }
            [] => {}
        }
        Ok(subnet)
    }

    pub fn kernel_status(&self) -> ParamMap {
        let mut status = self.kernel.clone();
        if let Some(root) = self.elements.first() {
            for (key, value) in &root.params {
                status.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        status.insert(
            "network_size".to_string(),
            Value::Int(self.elements.len() as i64),
        );
        status.insert(
            "num_connections".to_string(),
            Value::Int(self.synapses.len() as i64),
        );
        status
    }

    pub fn set_kernel_status(&mut self, update: ParamMap) -> FaultResult<()> {
        const FIXED: &[&str] = &["time", "total_num_virtual_procs", "network_size", "num_connections"];
        if let Some(resolution) = update.get("resolution").and_then(Value::as_f64) {
            if resolution <= 0.0 {
                return Err(fault("BadProperty", "resolution must be positive"));
            }
        }
        let seed = match update.get("grng_seed") {
            None => None,
            Some(Value::Int(seed)) => Some(
                u64::try_from(*seed)
                    .map_err(|_| fault("BadProperty", "grng_seed must be non-negative"))?,
            ),
            Some(_) => return Err(fault("BadProperty", "grng_seed must be an integer")),
        };
        let strict = self.dict_miss_is_error();
        merge(&mut self.kernel, update, FIXED, strict)?;
        if let Some(seed) = seed {
            self.rng = seeded(seed);
        }
        Ok(())
    }

    pub fn simulate(&mut self, t: f64) -> FaultResult<()> {
        if t.is_nan() || t < 0.0 {
            return Err(fault("BadParameter", format!("cannot simulate {t} ms")));
        }
        let now = self.kernel.get("time").and_then(Value::as_f64).unwrap_or(0.0);
        self.kernel.insert("time".to_string(), Value::Double(now + t));
        Ok(())
    }

    /// Current options of a random topology command, `DefaultOptions` included.
    pub fn options(&self, command: &str) -> FaultResult<ParamMap> {
        self.options
            .get(command)
            .cloned()
            .ok_or_else(|| fault("UndefinedName", format!("/{command} has no options")))
    }

    pub fn set_options(&mut self, command: &str, update: ParamMap) -> FaultResult<()> {
        let strict = self.dict_miss_is_error();
        let options = self
            .options
            .get_mut(command)
            .ok_or_else(|| fault("UndefinedName", format!("/{command} has no options")))?;
        merge(options, update, &[DEFAULT_OPTIONS], strict)
    }

    /// Draw `n` ids from `pool` under the options of `command`. Without autapses
    /// `own` is never drawn; without multapses no id is drawn twice.
    pub fn draw(
        &mut self,
        command: &str,
        pool: &[ElementId],
        own: ElementId,
        n: i64,
    ) -> FaultResult<Vec<ElementId>> {
        let n = usize::try_from(n).map_err(|_| fault("RangeCheck", format!("cannot draw {n} elements")))?;
        let options = self.options(command)?;
        let allowed = |key: &str| !matches!(options.get(key), Some(Value::Bool(false)));
        let mut candidates: Vec<ElementId> = pool
            .iter()
            .copied()
            .filter(|&id| allowed("allow_autapses") || id != own)
            .collect();
        if n == 0 {
            return Ok(Vec::new());
        }
        if candidates.is_empty() {
            return Err(fault("RangeCheck", "no candidates to draw from"));
        }
        if allowed("allow_multapses") {
            return Ok((0..n)
                .map(|_| candidates[self.below(candidates.len())])
                .collect());
        }
        candidates.sort_unstable();
        candidates.dedup();
        if n > candidates.len() {
            return Err(fault(
                "RangeCheck",
                format!("cannot draw {n} distinct elements from {}", candidates.len()),
            ));
        }
        for i in 0..n {
            let j = i + self.below(candidates.len() - i);
            candidates.swap(i, j);
        }
        candidates.truncate(n);
        Ok(candidates)
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.rng.next_u64() % bound as u64) as usize
    }

    /// Connections recorded per filter entry, flattened in entry order.
    pub fn find_connections(&self, filters: &[ConnectionQuery]) -> FaultResult<Vec<ConnectionHandle>> {
        let mut found = Vec::new();
        for query in filters {
            let sources = std::slice::from_ref(&query.source);
            let targets = query.target.as_ref().map(std::slice::from_ref);
            found.extend(self.connections(Some(sources), targets, query.synapse_model.as_deref())?);
        }
        Ok(found)
    }

    /// Connect `source` to every entry of the `target` column; every other column
    /// holds one synapse parameter per target.
    pub fn data_connect(&mut self, source: ElementId, model: &str, mut columns: ParamMap) -> FaultResult<()> {
        for key in ["target", "weight", "delay"] {
            if !columns.contains_key(key) {
                return Err(fault("UndefinedName", format!("connection data lacks '{key}'")));
            }
        }
        let targets = match columns.remove("target") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| element_id(item, "target"))
                .collect::<FaultResult<Vec<_>>>()?,
            _ => return Err(fault("ArgumentType", "'target' must be an array of ids")),
        };
        let mut rows = vec![ParamMap::new(); targets.len()];
        for (key, column) in columns {
            let Value::Array(items) = column else {
                return Err(fault("ArgumentType", format!("'{key}' must be an array")));
            };
            if items.len() != targets.len() {
                return Err(fault(
                    "RangeCheck",
                    format!("'{key}' has {} entries for {} targets", items.len(), targets.len()),
                ));
            }
            for (row, item) in rows.iter_mut().zip(items) {
                row.insert(key.clone(), item);
            }
        }
        for (target, row) in targets.into_iter().zip(rows) {
            self.connect(source, target, model, Some(row))?;
        }
        Ok(())
    }

    /// Recreate connections from synapse status mappings.
    pub fn data_connect_synapses(&mut self, synapses: Vec<ParamMap>) -> FaultResult<()> {
        for mut state in synapses {
            let source = state
                .get("source")
                .ok_or_else(|| fault("UndefinedName", "synapse status lacks 'source'"))
                .and_then(|value| element_id(value, "source"))?;
            let target = state
                .get("target")
                .ok_or_else(|| fault("UndefinedName", "synapse status lacks 'target'"))
                .and_then(|value| element_id(value, "target"))?;
            let model = state
                .get("synapse_model")
                .and_then(Value::as_str)
                .unwrap_or("static_synapse")
                .to_string();
            state.retain(|key, _| !SYNAPSE_FIXED.contains(&key.as_str()));
            self.connect(source, target, &model, Some(state))?;
        }
        Ok(())
    }

    /// Position of `id` among its container's children, counted from 1; the root is 0.
    pub fn local_id(&self, id: ElementId) -> FaultResult<i64> {
        let element = self.element(id)?;
        if element.parent == id {
            return Ok(0);
        }
        let position = self
            .element(element.parent)?
            .children
            .iter()
            .position(|&child| child == id)
            .ok_or_else(|| fault("UnknownNode", format!("node {id} is not listed by its parent")))?;
        i64::try_from(position + 1).map_err(|_| fault("RangeCheck", "local id out of range"))
    }

    /// Indented tree of `id` and its descendants down to `depth` levels.
    pub fn print_network(&self, id: ElementId, depth: i64) -> FaultResult<String> {
        if depth < 0 {
            return Err(fault("RangeCheck", format!("depth {depth} must not be negative")));
        }
        let mut out = String::new();
        self.print_level(id, depth, 0, &mut out)?;
        Ok(out)
    }

    fn print_level(&self, id: ElementId, depth: i64, level: usize, out: &mut String) -> FaultResult<()> {
        let element = self.element(id)?;
        let indent = "   ".repeat(level);
        if element.class == ModelClass::Subnet {
            out.push_str(&format!("{indent}+-[{id}] {} dim=[{}]\n", element.model, element.children.len()));
            if depth > 0 {
                for &child in &element.children {
                    self.print_level(child, depth - 1, level + 1, out)?;
                }
            }
        } else {
            out.push_str(&format!("{indent}+-[{id}] {}\n", element.model));
        }
        Ok(())
    }

    /// Restore every element to its model's current defaults and rewind time.
    pub fn reset_network(&mut self) {
        for element in &mut self.elements {
            if let Some(model) = self.models.get(&element.model) {
                element.params = model.defaults.clone();
            }
        }
        self.kernel.insert("time".to_string(), Value::Double(0.0));
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

fn seeded(seed: u64) -> ChaCha20Rng {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    ChaCha20Rng::from_seed(bytes)
}

fn id_value(id: ElementId) -> FaultResult<Value> {
    Value::id(id).map_err(|err| fault("RangeCheck", err.to_string()))
}

fn element_id(value: &Value, what: &str) -> FaultResult<ElementId> {
    match value {
        Value::Int(raw) => ElementId::try_from(*raw)
            .map_err(|_| fault("UnknownNode", format!("node {raw} does not exist"))),
        other => Err(fault(
            "ArgumentType",
            format!("'{what}' must be an id, got {:?}", other.kind()),
        )),
    }
}

fn params(pairs: &[(&str, Value)]) -> ParamMap {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// Apply `update` onto `target`, rejecting engine-owned keys and, when `strict`,
/// keys the target does not know. Integers widen into existing double entries.
fn merge(target: &mut ParamMap, update: ParamMap, fixed: &[&str], strict: bool) -> FaultResult<()> {
    for key in update.keys() {
        if fixed.contains(&key.as_str()) {
            return Err(fault("ReadOnlyProperty", format!("'{key}' cannot be set")));
        }
        if strict && !target.contains_key(key) {
            return Err(fault(
                "UnaccessedDictionaryEntry",
                format!("'{key}' is not a property of this object"),
            ));
        }
    }
    for (key, value) in update {
        match (target.get(&key), value) {
            (Some(Value::Double(_)), Value::Int(raw)) => {
                target.insert(key, Value::Double(raw as f64));
            }
            (Some(_), value) => {
                target.insert(key, value);
            }
            (None, _) => {}
        }
    }
    Ok(())
}

fn check_delay(update: &ParamMap) -> FaultResult<()> {
    match update.get("delay").and_then(Value::as_f64) {
        Some(delay) if delay <= 0.0 => Err(fault("BadDelay", format!("delay {delay} must be positive"))),
        _ => Ok(()),
    }
}

fn same_value(have: &Value, wanted: &Value) -> bool {
    match (have, wanted) {
        (Value::String(a) | Value::Literal(a), Value::String(b) | Value::Literal(b)) => a == b,
        (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => (*a as f64) == *b,
        _ => have == wanted,
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionQuery, Network};
    use crate::core::value::{ParamMap, Value};

    fn options(autapses: bool, multapses: bool) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("allow_autapses".to_string(), Value::Bool(autapses));
        map.insert("allow_multapses".to_string(), Value::Bool(multapses));
        map
    }

    #[test]
    fn root_is_its_own_parent() {
        let network = Network::new();
        let status = network.element_status(0).expect("root");
        assert_eq!(status.get("parent"), Some(&Value::Int(0)));
        assert_eq!(network.current_subnet(), 0);
    }

    #[test]
    fn ids_are_contiguous() {
        let mut network = Network::new();
        assert_eq!(network.create("iaf_neuron", 3, None).expect("create"), 3);
        assert_eq!(network.create("voltmeter", 1, None).expect("create"), 4);
        assert_eq!(network.children(0).expect("children"), vec![1, 2, 3, 4]);
    }

    #[test]
    fn illegal_and_unexpected_connections_are_named() {
        let mut network = Network::new();
        network.create("iaf_neuron", 1, None).expect("neuron");
        network.create("voltmeter", 1, None).expect("voltmeter");
        network.create("spike_detector", 1, None).expect("detector");
        let illegal = network.connect(1, 2, "static_synapse", None).expect_err("illegal");
        assert_eq!(illegal.name, "IllegalConnection");
        let unexpected = network.connect(3, 1, "static_synapse", None).expect_err("unexpected");
        assert_eq!(unexpected.name, "UnexpectedEvent");
        network.connect(2, 1, "static_synapse", None).expect("voltmeter may record from a neuron");
    }

    #[test]
    fn unknown_keys_depend_on_dict_miss_setting() {
        let mut network = Network::new();
        network.create("iaf_neuron", 1, None).expect("create");
        let mut update = ParamMap::new();
        update.insert("bogus".to_string(), Value::Int(1));
        let err = network.set_element_status(1, update.clone()).expect_err("strict");
        assert_eq!(err.name, "UnaccessedDictionaryEntry");

        let mut relax = ParamMap::new();
        relax.insert("dict_miss_is_error".to_string(), Value::Bool(false));
        network.set_kernel_status(relax).expect("relax");
        network.set_element_status(1, update).expect("ignored");
        assert!(!network.element_status(1).expect("status").contains_key("bogus"));
    }

    #[test]
    fn integer_updates_widen_into_doubles() {
        let mut network = Network::new();
        network.create("iaf_neuron", 1, None).expect("create");
        let mut update = ParamMap::new();
        update.insert("V_m".to_string(), Value::Int(-60));
        network.set_element_status(1, update).expect("set");
        let status = network.element_status(1).expect("status");
        assert_eq!(status.get("V_m"), Some(&Value::Double(-60.0)));
    }

    #[test]
    fn ports_count_per_source() {
        let mut network = Network::new();
        network.create("iaf_neuron", 3, None).expect("create");
        network.connect(1, 2, "static_synapse", None).expect("a");
        network.connect(1, 3, "static_synapse", None).expect("b");
        network.connect(2, 3, "static_synapse", None).expect("c");
        let handles = network.connections(None, None, None).expect("all");
        let ports: Vec<(u64, i64)> = handles.iter().map(|h| (h.source, h.port)).collect();
        assert_eq!(ports, vec![(1, 0), (1, 1), (2, 0)]);
    }

    #[test]
    fn draws_without_multapses_are_distinct() {
        let mut network = Network::new();
        network.create("iaf_neuron", 5, None).expect("create");
        network
            .set_options("RandomDivergentConnect", options(false, false))
            .expect("options");
        let mut drawn = network
            .draw("RandomDivergentConnect", &[1, 2, 3, 4, 5], 3, 4)
            .expect("draw");
        drawn.sort_unstable();
        assert_eq!(drawn, vec![1, 2, 4, 5]);
        let err = network
            .draw("RandomDivergentConnect", &[1, 2, 3], 3, 3)
            .expect_err("too few");
        assert_eq!(err.name, "RangeCheck");
    }

    #[test]
    fn draws_repeat_for_the_same_seed() {
        let mut seed = ParamMap::new();
        seed.insert("grng_seed".to_string(), Value::Int(42));
        let mut a = Network::new();
        let mut b = Network::new();
        a.set_kernel_status(seed.clone()).expect("seed a");
        b.set_kernel_status(seed).expect("seed b");
        let pool: Vec<u64> = (1..=50).collect();
        assert_eq!(
            a.draw("RandomConvergentConnect", &pool, 0, 10).expect("a"),
            b.draw("RandomConvergentConnect", &pool, 0, 10).expect("b")
        );
    }

    #[test]
    fn data_columns_become_connections() {
        let mut network = Network::new();
        network.create("iaf_neuron", 3, None).expect("create");
        let mut columns = ParamMap::new();
        columns.insert("target".to_string(), Value::Array(vec![Value::Int(2), Value::Int(3)]));
        columns.insert(
            "weight".to_string(),
            Value::Array(vec![Value::Double(0.5), Value::Double(1.5)]),
        );
        columns.insert(
            "delay".to_string(),
            Value::Array(vec![Value::Double(1.0), Value::Double(2.0)]),
        );
        network
            .data_connect(1, "static_synapse", columns)
            .expect("data connect");
        let found = network
            .find_connections(&[ConnectionQuery {
                source: 1,
                target: Some(3),
                synapse_model: None,
            }])
            .expect("find");
        assert_eq!(found.len(), 1);
        let status = network.connection_status(&found[0]).expect("status");
        assert_eq!(status.get("weight"), Some(&Value::Double(1.5)));
        assert_eq!(status.get("delay"), Some(&Value::Double(2.0)));
    }

    #[test]
    fn ragged_data_columns_are_rejected() {
        let mut network = Network::new();
        network.create("iaf_neuron", 2, None).expect("create");
        let mut columns = ParamMap::new();
        columns.insert("target".to_string(), Value::Array(vec![Value::Int(2)]));
        columns.insert("weight".to_string(), Value::Array(Vec::new()));
        columns.insert("delay".to_string(), Value::Array(vec![Value::Double(1.0)]));
        let err = network
            .data_connect(1, "static_synapse", columns)
            .expect_err("ragged");
        assert_eq!(err.name, "RangeCheck");
    }

    #[test]
    fn local_ids_count_within_the_parent() {
        let mut network = Network::new();
        network.create("iaf_neuron", 2, None).expect("create");
        let subnet = network.create("subnet", 1, None).expect("subnet");
        network.change_subnet(subnet).expect("enter");
        let inner = network.create("iaf_neuron", 1, None).expect("inner");
        assert_eq!(network.local_id(0).expect("root"), 0);
        assert_eq!(network.local_id(2).expect("second"), 2);
        assert_eq!(network.local_id(inner).expect("inner"), 1);
    }
}
