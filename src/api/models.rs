// Model defaults, kernel status, and simulation control.
#![allow(clippy::result_large_err)]

use crate::core::channel::StackChannel;
use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ParamMap, Value};

use super::ApiResult;
use super::marshaller::Marshaller;
use super::targets::{StatusEntry, StatusKeys, StatusParams};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ModelKind {
    #[default]
    All,
    Nodes,
    Synapses,
}

impl<C: StackChannel> Marshaller<C> {
    /// Sorted model names of `kind`, optionally restricted to names containing `selector`.
    pub fn models(&mut self, kind: ModelKind, selector: Option<&str>) -> ApiResult<Vec<String>> {
        self.guarded("Models", |m| {
            let tables: &[&str] = match kind {
                ModelKind::All => &["nodes", "synapses"],
                ModelKind::Nodes => &["nodes"],
                ModelKind::Synapses => &["synapses"],
            };
            let mut names = Vec::new();
            for table in tables {
                m.push(Value::literal(*table))?;
                m.run("Models_l")?;
                for name in m.pop()?.into_array("model names")? {
                    match name {
                        Value::String(name) | Value::Literal(name) => names.push(name),
                        other => {
                            return Err(Error::new(ErrorKind::Protocol).with_message(format!(
                                "model name must be a string, got {:?}",
                                other.kind()
                            )));
                        }
                    }
                }
            }
            if let Some(selector) = selector {
                names.retain(|name| name.contains(selector));
            }
            names.sort();
            Ok(names)
        })
    }

    /// New defaults for all subsequently created instances of `model`.
    pub fn set_defaults(&mut self, model: &str, params: impl Into<StatusParams>) -> ApiResult<()> {
        let params = params.into();
        self.guarded("SetDefaults", |m| {
            let map = params.into_single()?;
            m.push(Value::literal(model))?;
            m.push(Value::Dict(map))?;
            m.run("SetDefaults_l_D")
        })
    }

    pub fn get_defaults(&mut self, model: &str, keys: &StatusKeys) -> ApiResult<StatusEntry> {
        self.guarded("GetDefaults", |m| {
            let defaults = m.model_defaults(model)?;
            keys.select(defaults)
        })
    }

    pub fn copy_model(
        &mut self,
        existing: &str,
        new: &str,
        params: Option<ParamMap>,
    ) -> ApiResult<()> {
        self.guarded("CopyModel", |m| {
            m.push(Value::literal(existing))?;
            m.push(Value::literal(new))?;
            m.push(Value::Dict(params.unwrap_or_default()))?;
            m.run("CopyModel_l_l_D")
        })
    }

    pub fn set_kernel_status(&mut self, params: ParamMap) -> ApiResult<()> {
        self.guarded("SetKernelStatus", |m| {
            m.push(Value::Dict(params))?;
            m.run("SetKernelStatus_D")
        })
    }

    /// Kernel status without the entries the root container shares with every subnet.
    pub fn get_kernel_status(&mut self, keys: &StatusKeys) -> ApiResult<StatusEntry> {
        self.guarded("GetKernelStatus", |m| {
            m.run("GetKernelStatus")?;
            let mut status = m.pop()?.into_dict("kernel status")?;
            let subnet = m.model_defaults("subnet")?;
            status.retain(|key, _| !subnet.contains_key(key));
            keys.select(status)
        })
    }

    pub fn reset_kernel(&mut self) -> ApiResult<()> {
        self.guarded("ResetKernel", |m| m.run("ResetKernel"))
    }

    pub fn reset_network(&mut self) -> ApiResult<()> {
        self.guarded("ResetNetwork", |m| m.run("ResetNetwork"))
    }

    /// Advance the simulation by `t` milliseconds.
    pub fn simulate(&mut self, t: f64) -> ApiResult<()> {
        self.guarded("Simulate", |m| {
            m.push(Value::Double(t))?;
            m.run("Simulate_d")
        })
    }

    /// Continue a simulation the interpreter interrupted.
    pub fn resume_simulation(&mut self) -> ApiResult<()> {
        self.guarded("ResumeSimulation", |m| m.run("ResumeSimulation"))
    }

    fn model_defaults(&mut self, model: &str) -> ApiResult<ParamMap> {
        self.push(Value::literal(model))?;
        self.run("GetDefaults_l")?;
        self.pop()?.into_dict("model defaults")
    }
}

#[cfg(test)]
mod tests {
    use super::ModelKind;
    use crate::api::marshaller::{Marshaller, MarshallerOptions};
    use crate::api::targets::{StatusEntry, StatusKeys, StatusParams, Targets};
    use crate::core::broadcast::Broadcast;
    use crate::core::error::ErrorKind;
    use crate::core::guard::StackCheck;
    use crate::core::value::{ParamMap, Value};
    use crate::reference::ReferenceInterpreter;

    fn marshaller() -> Marshaller<ReferenceInterpreter> {
        Marshaller::with_options(
            ReferenceInterpreter::new(),
            MarshallerOptions::new().with_stack_check(StackCheck::Always),
        )
    }

    #[test]
    fn models_are_sorted_and_filtered() {
        let mut m = marshaller();
        let synapses = m.models(ModelKind::Synapses, None).expect("synapses");
        assert_eq!(synapses, vec!["static_synapse".to_string(), "stdp_synapse".to_string()]);
        let iaf = m.models(ModelKind::All, Some("iaf")).expect("iaf");
        assert!(iaf.iter().all(|name| name.contains("iaf")));
        assert!(iaf.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn defaults_feed_new_instances() {
        let mut m = marshaller();
        m.set_defaults("iaf_neuron", StatusParams::keyed("V_m", Value::Double(-65.0)))
            .expect("set defaults");
        let entry = m
            .get_defaults("iaf_neuron", &StatusKeys::one("V_m"))
            .expect("get defaults");
        assert_eq!(entry, StatusEntry::Value(Value::Double(-65.0)));

        let ids = m.create("iaf_neuron", 1, None).expect("create");
        let reply = m
            .get_status(&Targets::from(ids), &StatusKeys::one("V_m"))
            .expect("status");
        assert_eq!(reply.into_values(), Some(vec![Value::Double(-65.0)]));
    }

    #[test]
    fn copied_models_carry_overrides() {
        let mut m = marshaller();
        let mut params = ParamMap::new();
        params.insert("C_m".to_string(), Value::Double(500.0));
        m.copy_model("iaf_neuron", "big_iaf", Some(params)).expect("copy");
        let entry = m
            .get_defaults("big_iaf", &StatusKeys::many(["C_m", "model"]))
            .expect("defaults");
        assert_eq!(
            entry,
            StatusEntry::Row(vec![Value::Double(500.0), Value::literal("big_iaf")])
        );
    }

    #[test]
    fn unknown_default_key_is_reported() {
        let mut m = marshaller();
        let err = m
            .get_defaults("iaf_neuron", &StatusKeys::one("nonsense"))
            .expect_err("key");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn simulate_advances_kernel_time() {
        let mut m = marshaller();
        m.simulate(12.5).expect("simulate");
        let time = m.get_kernel_status(&StatusKeys::one("time")).expect("status");
        assert_eq!(time, StatusEntry::Value(Value::Double(12.5)));
        m.reset_kernel().expect("reset");
        let time = m.get_kernel_status(&StatusKeys::one("time")).expect("status");
        assert_eq!(time, StatusEntry::Value(Value::Double(0.0)));
    }

    #[test]
    fn list_valued_defaults_are_one_entry() {
        let mut m = marshaller();
        m.set_defaults(
            "voltmeter",
            StatusParams::keyed(
                "record_from",
                Broadcast::sequence([Value::literal("V_m"), Value::literal("I_e")]),
            ),
        )
        .expect("set defaults");
        let entry = m
            .get_defaults("voltmeter", &StatusKeys::one("record_from"))
            .expect("get defaults");
        assert_eq!(
            entry,
            StatusEntry::Value(Value::Array(vec![Value::literal("V_m"), Value::literal("I_e")]))
        );
    }

    #[test]
    fn resume_after_simulate_keeps_the_clock() {
        let mut m = marshaller();
        m.simulate(5.0).expect("simulate");
        m.resume_simulation().expect("resume");
        let time = m.get_kernel_status(&StatusKeys::one("time")).expect("status");
        assert_eq!(time, StatusEntry::Value(Value::Double(5.0)));
    }

    #[test]
    fn kernel_status_hides_subnet_entries() {
        let mut m = marshaller();
        let entry = m.get_kernel_status(&StatusKeys::All).expect("status");
        let StatusEntry::Map(map) = entry else {
            panic!("expected map");
        };
        assert!(map.contains_key("resolution"));
        assert!(!map.contains_key("children_on_same_vp"));
        assert!(!map.contains_key("label"));
    }

    #[test]
    fn kernel_status_round_trips_settable_keys() {
        let mut m = marshaller();
        let mut params = ParamMap::new();
        params.insert("resolution".to_string(), Value::Double(0.25));
        m.set_kernel_status(params).expect("set");
        let entry = m
            .get_kernel_status(&StatusKeys::one("resolution"))
            .expect("get");
        assert_eq!(entry, StatusEntry::Value(Value::Double(0.25)));
    }
}
