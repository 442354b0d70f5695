//! Purpose: Build connection commands for the four topologies and query connections.
//! Exports: `SynapseParams`, `ConnectionFilter`, connect operations on `Marshaller`.
//! Role: Selects the command variant from which optional arguments are present.
//! Invariants: Per-pair arguments are broadcast before the first push.
//! Invariants: Weight and delay are all-or-nothing; delay alone is never accepted.
//! Invariants: Temporarily changed interpreter settings are restored on every exit path.
#![allow(clippy::result_large_err)]

use tracing::warn;

use crate::core::broadcast::{Broadcast, broadcast};
use crate::core::channel::StackChannel;
use crate::core::connection::{ConnectionHandle, decode_all};
use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ElementId, ParamMap, Value};

use super::ApiResult;
use super::marshaller::Marshaller;

/// What `connect` receives as its `params` argument.
#[derive(Clone, Debug, PartialEq)]
pub enum SynapseParams {
    /// Synapse parameter mappings, one per pair after broadcasting.
    Maps(Broadcast<ParamMap>),
    /// Plain weights; requires a delay.
    Weights(Broadcast<f64>),
}

impl From<ParamMap> for SynapseParams {
    fn from(map: ParamMap) -> Self {
        SynapseParams::Maps(Broadcast::Scalar(map))
    }
}

impl From<Vec<ParamMap>> for SynapseParams {
    fn from(maps: Vec<ParamMap>) -> Self {
        SynapseParams::Maps(Broadcast::Sequence(maps))
    }
}

impl From<f64> for SynapseParams {
    fn from(weight: f64) -> Self {
        SynapseParams::Weights(Broadcast::Scalar(weight))
    }
}

impl From<Vec<f64>> for SynapseParams {
    fn from(weights: Vec<f64>) -> Self {
        SynapseParams::Weights(Broadcast::Sequence(weights))
    }
}

/// Filter for `get_connections`; unset fields impose no constraint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionFilter {
    pub source: Option<Vec<ElementId>>,
    pub target: Option<Vec<ElementId>>,
    pub synapse_model: Option<String>,
}

impl ConnectionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, ids: &[ElementId]) -> Self {
        self.source = Some(ids.to_vec());
        self
    }

    pub fn target(mut self, ids: &[ElementId]) -> Self {
        self.target = Some(ids.to_vec());
        self
    }

    pub fn synapse_model(mut self, model: impl Into<String>) -> Self {
        self.synapse_model = Some(model.into());
        self
    }

    fn to_dict(&self) -> ApiResult<ParamMap> {
        let mut filter = ParamMap::new();
        if let Some(source) = &self.source {
            filter.insert("source".to_string(), Value::ids(source)?);
        }
        if let Some(target) = &self.target {
            filter.insert("target".to_string(), Value::ids(target)?);
        }
        if let Some(model) = &self.synapse_model {
            filter.insert("synapse_model".to_string(), Value::literal(model.as_str()));
        }
        Ok(filter)
    }
}

impl<C: StackChannel> Marshaller<C> {
    /// One-to-one connections between `pre[i]` and `post[i]`.
    ///
    /// No params: plain connect. Mapping params: one mapping per pair. Weights
    /// plus delay: scalar weight and delay per pair. Anything else is rejected.
    pub fn connect(
        &mut self,
        pre: &[ElementId],
        post: &[ElementId],
        params: Option<SynapseParams>,
        delay: Option<Broadcast<f64>>,
        model: Option<&str>,
    ) -> ApiResult<()> {
        self.guarded("Connect", |m| {
            if pre.len() != post.len() {
                return Err(Error::new(ErrorKind::ArgumentShape).with_message(format!(
                    "pre and post have to be the same length ({} != {})",
                    pre.len(),
                    post.len()
                )));
            }
            let model = m.synapse_model(model).to_string();

            match (params, delay) {
                (None, None) => {
                    for (&source, &target) in pre.iter().zip(post) {
                        m.push(Value::id(source)?)?;
                        m.push(Value::id(target)?)?;
                        m.push(Value::literal(model.as_str()))?;
                        m.run("Connect_i_i_l")?;
                    }
                    Ok(())
                }
                (Some(SynapseParams::Maps(maps)), None) => {
                    let maps = broadcast(maps, pre.len(), "params")?;
                    for ((&source, &target), map) in pre.iter().zip(post).zip(maps) {
                        m.push(Value::id(source)?)?;
                        m.push(Value::id(target)?)?;
                        m.push(Value::Dict(map))?;
                        m.push(Value::literal(model.as_str()))?;
                        m.run("Connect_i_i_D_l")?;
                    }
                    Ok(())
                }
                (Some(SynapseParams::Weights(weights)), Some(delay)) => {
                    let weights = broadcast(weights, pre.len(), "params")?;
                    let delays = broadcast(delay, pre.len(), "delay")?;
                    for (((&source, &target), weight), delay) in
                        pre.iter().zip(post).zip(weights).zip(delays)
                    {
                        m.push(Value::id(source)?)?;
                        m.push(Value::id(target)?)?;
                        m.push(Value::Double(weight))?;
                        m.push(Value::Double(delay))?;
                        m.push(Value::literal(model.as_str()))?;
                        m.run("Connect_i_i_d_d_l")?;
                    }
                    Ok(())
                }
                (None, Some(_)) => Err(Error::new(ErrorKind::TypeMismatch)
                    .with_message("Both 'params' and 'delay' have to be given.")),
                (Some(SynapseParams::Maps(_)), Some(_)) => Err(Error::new(ErrorKind::TypeMismatch)
                    .with_message("params must be a weight or list of weights when delay is given")),
                (Some(SynapseParams::Weights(_)), None) => Err(Error::new(ErrorKind::TypeMismatch)
                    .with_message("weights in params require a delay")),
            }
        })
    }

    /// Connect every element of `pre` to each element of `post`.
    pub fn convergent_connect(
        &mut self,
        pre: &[ElementId],
        post: &[ElementId],
        weight: Option<Broadcast<f64>>,
        delay: Option<Broadcast<f64>>,
        model: Option<&str>,
    ) -> ApiResult<()> {
        self.guarded("ConvergentConnect", |m| {
            let model = m.synapse_model(model).to_string();
            let sources = Value::ids(pre)?;
            match weight_delay(weight, delay, pre.len())? {
                None => {
                    for &target in post {
                        m.push(sources.clone())?;
                        m.push(Value::id(target)?)?;
                        m.push(Value::literal(model.as_str()))?;
                        m.run("ConvergentConnect_a_i_l")?;
                    }
                }
                Some((weights, delays)) => {
                    for &target in post {
                        m.push(sources.clone())?;
                        m.push(Value::id(target)?)?;
                        m.push(weights.clone())?;
                        m.push(delays.clone())?;
                        m.push(Value::literal(model.as_str()))?;
                        m.run("ConvergentConnect_a_i_a_a_l")?;
                    }
                }
            }
            Ok(())
        })
    }

    /// Connect each element of `pre` to every element of `post`.
    pub fn divergent_connect(
        &mut self,
        pre: &[ElementId],
        post: &[ElementId],
        weight: Option<Broadcast<f64>>,
        delay: Option<Broadcast<f64>>,
        model: Option<&str>,
    ) -> ApiResult<()> {
        self.guarded("DivergentConnect", |m| {
            let model = m.synapse_model(model).to_string();
            let targets = Value::ids(post)?;
            match weight_delay(weight, delay, post.len())? {
                None => {
                    for &source in pre {
                        m.push(Value::id(source)?)?;
                        m.push(targets.clone())?;
                        m.push(Value::literal(model.as_str()))?;
                        m.run("DivergentConnect_i_a_l")?;
                    }
                }
                Some((weights, delays)) => {
                    for &source in pre {
                        m.push(Value::id(source)?)?;
                        m.push(targets.clone())?;
                        m.push(weights.clone())?;
                        m.push(delays.clone())?;
                        m.push(Value::literal(model.as_str()))?;
                        m.run("DivergentConnect_i_a_a_a_l")?;
                    }
                }
            }
            Ok(())
        })
    }

    /// Connect `n` randomly drawn elements of `pre` to each element of `post`.
    ///
    /// Weight and delay, when given, are broadcast to `n`. `options` (for example
    /// `allow_autapses`, `allow_multapses`) apply to this call only.
    #[allow(clippy::too_many_arguments)]
    pub fn random_convergent_connect(
        &mut self,
        pre: &[ElementId],
        post: &[ElementId],
        n: usize,
        weight: Option<Broadcast<f64>>,
        delay: Option<Broadcast<f64>>,
        model: Option<&str>,
        options: Option<&ParamMap>,
    ) -> ApiResult<()> {
        const COMMAND: &str = "RandomConvergentConnect";
        self.guarded(COMMAND, |m| {
            let count = draw_count(n)?;
            let model = m.synapse_model(model).to_string();
            let sources = Value::ids(pre)?;
            m.with_command_options(COMMAND, options, |m| {
                let weighted = weight_delay(weight, delay, n)?;
                for &target in post {
                    m.push(sources.clone())?;
                    m.push(Value::id(target)?)?;
                    m.push(Value::Int(count))?;
                    let command = match &weighted {
                        None => "RandomConvergentConnect_a_i_i_l",
                        Some((weights, delays)) => {
                            m.push(weights.clone())?;
                            m.push(delays.clone())?;
                            "RandomConvergentConnect_a_i_i_a_a_l"
                        }
                    };
                    m.push(Value::literal(model.as_str()))?;
                    m.run(command)?;
                }
                Ok(())
            })
        })
    }

    /// Connect each element of `pre` to `n` randomly drawn elements of `post`.
    #[allow(clippy::too_many_arguments)]
    pub fn random_divergent_connect(
        &mut self,
        pre: &[ElementId],
        post: &[ElementId],
        n: usize,
        weight: Option<Broadcast<f64>>,
        delay: Option<Broadcast<f64>>,
        model: Option<&str>,
        options: Option<&ParamMap>,
    ) -> ApiResult<()> {
        const COMMAND: &str = "RandomDivergentConnect";
        self.guarded(COMMAND, |m| {
            let count = draw_count(n)?;
            let model = m.synapse_model(model).to_string();
            let targets = Value::ids(post)?;
            m.with_command_options(COMMAND, options, |m| {
                let weighted = weight_delay(weight, delay, n)?;
                for &source in pre {
                    m.push(Value::id(source)?)?;
                    m.push(targets.clone())?;
                    m.push(Value::Int(count))?;
                    let command = match &weighted {
                        None => "RandomDivergentConnect_i_a_i_l",
                        Some((weights, delays)) => {
                            m.push(weights.clone())?;
                            m.push(delays.clone())?;
                            "RandomDivergentConnect_i_a_i_a_a_l"
                        }
                    };
                    m.push(Value::literal(model.as_str()))?;
                    m.run(command)?;
                }
                Ok(())
            })
        })
    }

    /// Run `f` with `options` applied to `command`, then put the previous options back
    /// whether or not `f` succeeded. The first error wins.
    fn with_command_options<T>(
        &mut self,
        command: &str,
        options: Option<&ParamMap>,
        f: impl FnOnce(&mut Self) -> ApiResult<T>,
    ) -> ApiResult<T> {
        let Some(options) = options else {
            return f(self);
        };
        self.push(Value::literal(command))?;
        self.run("GetOptions_l")?;
        let mut saved = self.pop()?.into_dict("connect options")?;
        // Read-only; writing it back would be rejected.
        saved.remove("DefaultOptions");
        self.set_options(command, options.clone())?;
        let result = f(self);
        let restored = self.set_options(command, saved);
        if restored.is_err() {
            warn!(command, "failed to restore connect options");
        }
        let value = result?;
        restored?;
        Ok(value)
    }

    fn set_options(&mut self, command: &str, options: ParamMap) -> ApiResult<()> {
        self.push(Value::literal(command))?;
        self.push(Value::Dict(options))?;
        self.run("SetOptions_l_D")
    }

    /// Connections leaving each of `source`, one filter per source. `target` and
    /// `synapse_model` are broadcast to `source`. Results are flattened in source order.
    pub fn find_connections(
        &mut self,
        source: &[ElementId],
        target: Option<Broadcast<ElementId>>,
        synapse_model: Option<Broadcast<String>>,
    ) -> ApiResult<Vec<ConnectionHandle>> {
        self.guarded("FindConnections", |m| {
            let targets = target
                .map(|target| broadcast(target, source.len(), "target"))
                .transpose()?;
            let models = synapse_model
                .map(|model| broadcast(model, source.len(), "synapse_model"))
                .transpose()?;
            let mut filters = Vec::with_capacity(source.len());
            for (index, &id) in source.iter().enumerate() {
                let mut filter = ParamMap::new();
                filter.insert("source".to_string(), Value::id(id)?);
                if let Some(targets) = &targets {
                    filter.insert("target".to_string(), Value::id(targets[index])?);
                }
                if let Some(models) = &models {
                    filter.insert(
                        "synapse_model".to_string(),
                        Value::literal(models[index].as_str()),
                    );
                }
                filters.push(Value::Dict(filter));
            }
            m.push(Value::Array(filters))?;
            m.run("FindConnections_a")?;
            decode_all(m.pop()?.into_array("connections")?)
        })
    }

    /// Connect each `pre[i]` to the targets listed in `params[i]`. Every mapping
    /// holds equal-length lists under `target`, `weight`, `delay`, and any other
    /// synapse parameter.
    pub fn data_connect(
        &mut self,
        pre: &[ElementId],
        params: &[ParamMap],
        model: Option<&str>,
    ) -> ApiResult<()> {
        self.guarded("DataConnect", |m| {
            if pre.len() != params.len() {
                return Err(Error::new(ErrorKind::ArgumentShape).with_message(format!(
                    "pre and params have to be the same length ({} != {})",
                    pre.len(),
                    params.len()
                )));
            }
            let model = m.synapse_model(model).to_string();
            for (&source, columns) in pre.iter().zip(params) {
                m.push(Value::id(source)?)?;
                m.push(Value::Dict(columns.clone()))?;
                m.push(Value::String(model.clone()))?;
                m.run("DataConnect_i_D_s")?;
            }
            Ok(())
        })
    }

    /// Recreate connections from synapse status mappings such as those returned by
    /// `get_status` on connections. Unknown keys are tolerated for the duration of
    /// the call; `dict_miss_is_error` is restored afterwards.
    pub fn data_connect_synapses(&mut self, synapses: &[ParamMap]) -> ApiResult<()> {
        self.guarded("DataConnect", |m| {
            m.run("GetKernelStatus")?;
            let saved = m
                .pop()?
                .into_dict("kernel status")?
                .remove(DICT_MISS)
                .unwrap_or(Value::Bool(true));
            m.set_kernel_status(dict_miss(Value::Bool(false)))?;
            let result = m
                .push(Value::Array(synapses.iter().cloned().map(Value::Dict).collect()))
                .and_then(|()| m.run("DataConnect_a"));
            let restored = m.set_kernel_status(dict_miss(saved));
            result?;
            restored
        })
    }

    /// Handles of connections matching `filter`. Only connections whose target lives
    /// on this execution context are returned.
    pub fn get_connections(&mut self, filter: &ConnectionFilter) -> ApiResult<Vec<ConnectionHandle>> {
        self.guarded("GetConnections", |m| {
            m.push(Value::Dict(filter.to_dict()?))?;
            m.run("GetConnections_D")?;
            let items = m.pop()?.into_array("connections")?;
            decode_all(items)
        })
    }
}

const DICT_MISS: &str = "dict_miss_is_error";

fn dict_miss(value: Value) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(DICT_MISS.to_string(), value);
    params
}

fn draw_count(n: usize) -> ApiResult<i64> {
    i64::try_from(n).map_err(|_| {
        Error::new(ErrorKind::ArgumentShape).with_message(format!("cannot draw {n} elements"))
    })
}

fn weight_delay(
    weight: Option<Broadcast<f64>>,
    delay: Option<Broadcast<f64>>,
    length: usize,
) -> ApiResult<Option<(Value, Value)>> {
    match (weight, delay) {
        (None, None) => Ok(None),
        (Some(weight), Some(delay)) => {
            let weights = broadcast(weight, length, "weight")?;
            let delays = broadcast(delay, length, "delay")?;
            Ok(Some((doubles(weights), doubles(delays))))
        }
        _ => Err(Error::new(ErrorKind::TypeMismatch)
            .with_message("Both 'weight' and 'delay' have to be given.")),
    }
}

fn doubles(values: Vec<f64>) -> Value {
    Value::Array(values.into_iter().map(Value::Double).collect())
}
