//! Purpose: Navigate and build the container hierarchy of elements.
//! Exports: `Descent`, subnet navigation, management, and printing operations on `Marshaller`.
//! Role: Traversal queries plus the current-subnet cursor of the interpreter.
//! Invariants: Property filters match by exact value equality (doubles included).
//! Invariants: Operations naming a single container reject more than one id.
#![allow(clippy::result_large_err)]

use crate::core::channel::StackChannel;
use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ElementId, ParamMap, Value};

use super::ApiResult;
use super::marshaller::Marshaller;
use super::targets::{StatusKeys, StatusParams, StatusReply, Targets};

/// How deep below a container a traversal reaches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Descent {
    /// Immediate children only.
    Children,
    /// All non-container descendants.
    Leaves,
    /// All descendants, containers included.
    Nodes,
}

impl Descent {
    fn command(self) -> &'static str {
        match self {
            Descent::Children => "GetChildren_a_D_b",
            Descent::Leaves => "GetLeaves_a_D_b",
            Descent::Nodes => "GetNodes_a_D_b",
        }
    }

    fn operation(self) -> &'static str {
        match self {
            Descent::Children => "GetChildren",
            Descent::Leaves => "GetLeaves",
            Descent::Nodes => "GetNodes",
        }
    }
}

impl<C: StackChannel> Marshaller<C> {
    pub fn get_children(
        &mut self,
        subnets: &[ElementId],
        properties: Option<&ParamMap>,
        local_only: bool,
    ) -> ApiResult<Vec<Vec<ElementId>>> {
        self.descend(Descent::Children, subnets, properties, local_only)
    }

    pub fn get_leaves(
        &mut self,
        subnets: &[ElementId],
        properties: Option<&ParamMap>,
        local_only: bool,
    ) -> ApiResult<Vec<Vec<ElementId>>> {
        self.descend(Descent::Leaves, subnets, properties, local_only)
    }

    pub fn get_nodes(
        &mut self,
        subnets: &[ElementId],
        properties: Option<&ParamMap>,
        local_only: bool,
    ) -> ApiResult<Vec<Vec<ElementId>>> {
        self.descend(Descent::Nodes, subnets, properties, local_only)
    }

    /// Per container, the descendants at `descent` whose status matches every
    /// entry of `properties` exactly.
    pub fn descend(
        &mut self,
        descent: Descent,
        subnets: &[ElementId],
        properties: Option<&ParamMap>,
        local_only: bool,
    ) -> ApiResult<Vec<Vec<ElementId>>> {
        self.guarded(descent.operation(), |m| {
            m.push(Value::ids(subnets)?)?;
            m.push(Value::Dict(properties.cloned().unwrap_or_default()))?;
            m.push(Value::Bool(local_only))?;
            m.run(descent.command())?;
            m.pop()?
                .into_array("descendants")?
                .into_iter()
                .map(|ids| ids.into_ids("descendant ids"))
                .collect()
        })
    }

    pub fn current_subnet(&mut self) -> ApiResult<ElementId> {
        self.guarded("CurrentSubnet", |m| {
            m.run("CurrentSubnet")?;
            m.pop()?.into_id("current subnet")
        })
    }

    pub fn change_subnet(&mut self, subnet: &[ElementId]) -> ApiResult<()> {
        let id = single_id("ChangeSubnet", subnet)?;
        self.guarded("ChangeSubnet", |m| {
            m.push(Value::id(id)?)?;
            m.run("ChangeSubnet_i")
        })
    }

    /// Create a subnet, label it, and make it current. Returns its id.
    pub fn begin_subnet(
        &mut self,
        label: Option<&str>,
        params: Option<ParamMap>,
    ) -> ApiResult<ElementId> {
        self.guarded("BeginSubnet", |m| {
            let subnet = m.create("subnet", 1, None)?;
            let targets = Targets::from(subnet.as_slice());
            if let Some(label) = label {
                m.set_status(&targets, StatusParams::keyed("label", Value::from(label)))?;
            }
            if let Some(params) = params {
                m.set_status(&targets, StatusParams::keyed("customdict", Value::Dict(params)))?;
            }
            m.change_subnet(&subnet)?;
            Ok(subnet[0])
        })
    }

    /// Return to the parent of the current subnet, yielding the one just left.
    pub fn end_subnet(&mut self) -> ApiResult<ElementId> {
        self.guarded("EndSubnet", |m| {
            let current = m.current_subnet()?;
            let reply = m.get_status(&Targets::from(vec![current]), &StatusKeys::one("parent"))?;
            let parent = match reply {
                StatusReply::Values(mut values) if values.len() == 1 => {
                    values.remove(0).into_id("parent")?
                }
                _ => {
                    return Err(Error::new(ErrorKind::Protocol)
                        .with_message("parent status must be a single id"));
                }
            };
            if parent == current {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("Unexpected EndSubnet(). Cannot go higher than the root node."));
            }
            m.change_subnet(&[parent])?;
            Ok(current)
        })
    }

    /// Position of `id` within its container, counted from 1.
    pub fn get_lid(&mut self, id: &[ElementId]) -> ApiResult<i64> {
        let id = single_id("GetLID", id)?;
        self.guarded("GetLID", |m| {
            m.push(Value::id(id)?)?;
            m.run("GetLID_i")?;
            m.pop()?.into_int("local id")
        })
    }

    /// Have the interpreter print the tree below `subnet` (default: the current
    /// subnet) down to `depth` levels.
    pub fn print_network(&mut self, depth: u32, subnet: Option<&[ElementId]>) -> ApiResult<()> {
        self.guarded("PrintNetwork", |m| {
            let id = match subnet {
                Some(ids) => single_id("PrintNetwork", ids)?,
                None => m.current_subnet()?,
            };
            m.push(Value::id(id)?)?;
            m.push(Value::Int(i64::from(depth)))?;
            m.run("PrintNetwork_i_i")
        })
    }

    /// Nested ids below `subnet` down to `depth` levels (0 = immediate children).
    pub fn get_network(&mut self, subnet: &[ElementId], depth: u32) -> ApiResult<Value> {
        let id = single_id("GetNetwork", subnet)?;
        self.guarded("GetNetwork", |m| {
            m.push(Value::id(id)?)?;
            m.push(Value::Int(i64::from(depth)))?;
            m.run("GetNetwork_i_i")?;
            m.pop()
        })
    }

    /// Create a grid of `model` elements inside a new container with one nesting
    /// level per dimension, and return the container id.
    pub fn layout_network(
        &mut self,
        model: &str,
        dims: &[usize],
        label: Option<&str>,
        params: Option<ParamMap>,
    ) -> ApiResult<ElementId> {
        self.guarded("LayoutNetwork", |m| {
            if dims.is_empty() || dims.contains(&0) {
                return Err(Error::new(ErrorKind::ArgumentShape)
                    .with_message("dims must be a non-empty list of positive sizes"));
            }
            let sizes = dims
                .iter()
                .map(|&d| {
                    i64::try_from(d).map(Value::Int).map_err(|_| {
                        Error::new(ErrorKind::ArgumentShape)
                            .with_message(format!("dimension {d} is too large"))
                    })
                })
                .collect::<ApiResult<Vec<_>>>()?;
            m.push(Value::literal(model))?;
            m.push(Value::Array(sizes))?;
            m.run("LayoutNetwork_l_a")?;
            let subnet = m.pop()?.into_id("layout subnet")?;
            let targets = Targets::from(vec![subnet]);
            if let Some(label) = label {
                m.set_status(&targets, StatusParams::keyed("label", Value::from(label)))?;
            }
            if let Some(params) = params {
                m.set_status(&targets, StatusParams::keyed("customdict", Value::Dict(params)))?;
            }
            Ok(subnet)
        })
    }
}

fn single_id(operation: &str, ids: &[ElementId]) -> ApiResult<ElementId> {
    match ids {
        [id] => Ok(*id),
        _ => Err(Error::new(ErrorKind::TypeMismatch)
            .with_message(format!("{operation}() expects exactly one id, got {}", ids.len()))),
    }
}

#[cfg(test)]
mod tests {
    use crate::core::channel::StackChannel;
    use crate::api::marshaller::{Marshaller, MarshallerOptions};
    use crate::api::targets::{StatusParams, Targets};
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
    fn begin_and_end_subnet_nest_creation() {
        let mut m = marshaller();
        let subnet = m.begin_subnet(Some("layer"), None).expect("begin");
        let inner = m.create("iaf_neuron", 2, None).expect("create");
        assert_eq!(m.end_subnet().expect("end"), subnet);
        assert_eq!(m.current_subnet().expect("current"), 0);

        let children = m.get_children(&[subnet], None, false).expect("children");
        assert_eq!(children, vec![inner]);
    }

    #[test]
    fn end_subnet_at_root_is_rejected() {
        let mut m = marshaller();
        let err = m.end_subnet().expect_err("root");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn leaves_skip_containers_and_nodes_include_them() {
        let mut m = marshaller();
        let outer = m.begin_subnet(None, None).expect("outer");
        let a = m.create("iaf_neuron", 1, None).expect("a");
        let inner = m.begin_subnet(None, None).expect("inner");
        let b = m.create("iaf_neuron", 1, None).expect("b");
        m.end_subnet().expect("end inner");
        m.end_subnet().expect("end outer");

        let leaves = m.get_leaves(&[outer], None, false).expect("leaves");
        assert_eq!(leaves, vec![vec![a[0], b[0]]]);
        let nodes = m.get_nodes(&[outer], None, true).expect("nodes");
        assert_eq!(nodes, vec![vec![a[0], inner, b[0]]]);
    }

    #[test]
    fn property_filter_matches_exactly() {
        let mut m = marshaller();
        let subnet = m.begin_subnet(None, None).expect("begin");
        let ids = m.create("iaf_neuron", 3, None).expect("create");
        m.set_status(
            &Targets::from(&ids[1..]),
            StatusParams::keyed("V_m", Value::Double(-55.0)),
        )
        .expect("set");
        m.end_subnet().expect("end");

        let mut props = ParamMap::new();
        props.insert("V_m".to_string(), Value::Double(-55.0));
        let matched = m.get_children(&[subnet], Some(&props), false).expect("filter");
        assert_eq!(matched, vec![ids[1..].to_vec()]);
    }

    #[test]
    fn change_subnet_requires_one_id() {
        let mut m = marshaller();
        let err = m.change_subnet(&[0, 1]).expect_err("two ids");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn layout_network_builds_nested_grid() {
        let mut m = marshaller();
        let grid = m
            .layout_network("iaf_neuron", &[2, 3], Some("grid"), None)
            .expect("layout");
        let rows = m.get_children(&[grid], None, false).expect("rows");
        assert_eq!(rows[0].len(), 2);
        let leaves = m.get_leaves(&[grid], None, false).expect("leaves");
        assert_eq!(leaves[0].len(), 6);
        let network = m.get_network(&[grid], 1).expect("network");
        let outer = network.as_array().expect("outer");
        assert_eq!(outer.len(), 2);
        assert_eq!(outer[0].as_array().expect("row").len(), 3);
    }

    #[test]
    fn oversized_layout_dimension_fails_before_any_push() {
        let mut m = marshaller();
        let err = m
            .layout_network("iaf_neuron", &[2, usize::MAX], None, None)
            .expect_err("too large");
        assert_eq!(err.kind(), ErrorKind::ArgumentShape);
        assert_eq!(m.channel().commands_executed(), 0);
    }

    #[test]
    fn local_ids_follow_position_in_container() {
        let mut m = marshaller();
        let ids = m.create("iaf_neuron", 3, None).expect("create");
        assert_eq!(m.get_lid(&ids[2..]).expect("lid"), 3);
        let err = m.get_lid(&ids).expect_err("several ids");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn print_network_defaults_to_current_subnet() {
        let mut m = marshaller();
        let subnet = m.begin_subnet(Some("layer"), None).expect("begin");
        m.create("iaf_neuron", 1, None).expect("create");
        m.print_network(1, None).expect("print");
        assert_eq!(
            m.channel_mut().take_output(),
            format!("+-[{subnet}] subnet dim=[1]\n   +-[{}] iaf_neuron\n", subnet + 1)
        );
        let err = m.print_network(1, Some(&[0, subnet])).expect_err("two ids");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(m.channel().depth(), 0);
    }
}
