//! The serialized query tree: branches carrying a combiner over
//! constraint leaves, with the responder (DAP) routing metadata the
//! node uses to plan execution.
//!
//! The tree is the wire form of [`crate::query::Query`]. It can also
//! be evaluated directly against a [`Description`], which is how the
//! crate checks that serialization preserves query semantics.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::OefError;
use crate::proto::dap;
use crate::schema::{AttributeValue, Description, Location};

pub const COMBINER_ALL: &str = "all";
pub const COMBINER_ANY: &str = "any";
pub const COMBINER_NONE: &str = "none";

pub const OPERATOR_EQ: &str = "==";
pub const OPERATOR_NE: &str = "!=";
pub const OPERATOR_LE: &str = "<=";
pub const OPERATOR_GE: &str = ">=";
pub const OPERATOR_LT: &str = "<";
pub const OPERATOR_GT: &str = ">";
pub const OPERATOR_CLOSE_TO: &str = "CLOSE_TO";
pub const OPERATOR_IN: &str = "IN";
pub const OPERATOR_NOT_IN: &str = "NOTIN";

/// Default node identifier; the server rewrites it during planning.
const DEFAULT_NODE_NAME: &str = "?";

/// A typed value carried by a constraint leaf: a scalar, a list, or
/// an inclusive range.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Location(Location),
    DataModel(dap::value_message::DataModel),
    StringList(Vec<String>),
    IntList(Vec<i64>),
    DoubleList(Vec<f64>),
    LocationList(Vec<Location>),
    StringRange(String, String),
    IntRange(i64, i64),
    DoubleRange(f64, f64),
    LocationRange(Location, Location),
}

impl QueryValue {
    /// The wire typecode naming which field of the value message
    /// carries the data.
    pub fn typecode(&self) -> &'static str {
        match self {
            QueryValue::Bool(_) => "bool",
            QueryValue::Int(_) => "int64",
            QueryValue::Double(_) => "double",
            QueryValue::String(_) => "string",
            QueryValue::Location(_) => "location",
            QueryValue::DataModel(_) => "data_model",
            QueryValue::StringList(_) => "string_list",
            QueryValue::IntList(_) => "int64_list",
            QueryValue::DoubleList(_) => "double_list",
            QueryValue::LocationList(_) => "location_list",
            QueryValue::StringRange(..) => "string_range",
            QueryValue::IntRange(..) => "int64_range",
            QueryValue::DoubleRange(..) => "double_range",
            QueryValue::LocationRange(..) => "location_range",
        }
    }

    pub(crate) fn to_pb(&self) -> dap::ValueMessage {
        let mut pb = dap::ValueMessage {
            typecode: self.typecode().to_string(),
            ..Default::default()
        };
        match self {
            QueryValue::Bool(b) => pb.b = *b,
            QueryValue::Int(i) => pb.i64 = *i,
            QueryValue::Double(d) => pb.d = *d,
            QueryValue::String(s) => pb.s = s.clone(),
            QueryValue::Location(l) => pb.l = Some(l.to_pb()),
            QueryValue::DataModel(dm) => pb.dm = Some(dm.clone()),
            QueryValue::StringList(v) => pb.v_s = v.clone(),
            QueryValue::IntList(v) => pb.v_i64 = v.clone(),
            QueryValue::DoubleList(v) => pb.v_d = v.clone(),
            QueryValue::LocationList(v) => pb.v_l = v.iter().map(|l| l.to_pb()).collect(),
            QueryValue::StringRange(a, b) => pb.v_s = vec![a.clone(), b.clone()],
            QueryValue::IntRange(a, b) => pb.v_i64 = vec![*a, *b],
            QueryValue::DoubleRange(a, b) => pb.v_d = vec![*a, *b],
            QueryValue::LocationRange(a, b) => pb.v_l = vec![a.to_pb(), b.to_pb()],
        }
        pb
    }

    pub(crate) fn from_pb(pb: &dap::ValueMessage) -> Result<Self, OefError> {
        let range_pair = |len: usize| -> Result<(), OefError> {
            if len == 2 {
                Ok(())
            } else {
                Err(OefError::Protocol(format!(
                    "range value holds {} entries instead of 2",
                    len
                )))
            }
        };
        match pb.typecode.as_str() {
            "bool" => Ok(QueryValue::Bool(pb.b)),
            "int" | "int64" => Ok(QueryValue::Int(pb.i64)),
            "int32" => Ok(QueryValue::Int(pb.i32 as i64)),
            "float" => Ok(QueryValue::Double(pb.f as f64)),
            "double" => Ok(QueryValue::Double(pb.d)),
            "string" => Ok(QueryValue::String(pb.s.clone())),
            "location" => {
                let l = pb
                    .l
                    .as_ref()
                    .ok_or_else(|| OefError::Protocol("location value is empty".to_string()))?;
                Ok(QueryValue::Location(Location::from_pb(l)?))
            }
            "data_model" => {
                let dm = pb
                    .dm
                    .as_ref()
                    .ok_or_else(|| OefError::Protocol("data model value is empty".to_string()))?;
                Ok(QueryValue::DataModel(dm.clone()))
            }
            "string_list" => Ok(QueryValue::StringList(pb.v_s.clone())),
            "int64_list" => Ok(QueryValue::IntList(pb.v_i64.clone())),
            "int32_list" => Ok(QueryValue::IntList(
                pb.v_i32.iter().map(|v| *v as i64).collect(),
            )),
            "double_list" => Ok(QueryValue::DoubleList(pb.v_d.clone())),
            "location_list" => Ok(QueryValue::LocationList(
                pb.v_l
                    .iter()
                    .map(Location::from_pb)
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            "string_range" => {
                range_pair(pb.v_s.len())?;
                Ok(QueryValue::StringRange(pb.v_s[0].clone(), pb.v_s[1].clone()))
            }
            "int64_range" => {
                range_pair(pb.v_i64.len())?;
                Ok(QueryValue::IntRange(pb.v_i64[0], pb.v_i64[1]))
            }
            "double_range" => {
                range_pair(pb.v_d.len())?;
                Ok(QueryValue::DoubleRange(pb.v_d[0], pb.v_d[1]))
            }
            "location_range" => {
                range_pair(pb.v_l.len())?;
                Ok(QueryValue::LocationRange(
                    Location::from_pb(&pb.v_l[0])?,
                    Location::from_pb(&pb.v_l[1])?,
                ))
            }
            other => Err(OefError::Protocol(format!(
                "unknown value typecode {:?}",
                other
            ))),
        }
    }
}

/// Per-responder field metadata attached to a leaf.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DapFieldCandidate {
    pub target_field_type: String,
    pub target_table_name: String,
}

/// A constraint leaf of the query tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub operator: String,
    pub query_field_type: String,
    pub query_field_value: QueryValue,
    pub target_field_name: String,
    pub target_field_type: Option<String>,
    pub target_table_name: Option<String>,
    /// Names of all responders able to answer this leaf.
    pub dap_names: BTreeSet<String>,
    /// Per-responder field info.
    pub dap_field_candidates: BTreeMap<String, DapFieldCandidate>,
    pub name: String,
    pub mementos: Vec<Vec<u8>>,
}

impl Leaf {
    pub fn new(
        operator: &str,
        query_field_value: QueryValue,
        target_field_name: impl Into<String>,
    ) -> Self {
        Self {
            operator: operator.to_string(),
            query_field_type: query_field_value.typecode().to_string(),
            query_field_value,
            target_field_name: target_field_name.into(),
            target_field_type: None,
            target_table_name: None,
            dap_names: BTreeSet::new(),
            dap_field_candidates: BTreeMap::new(),
            name: DEFAULT_NODE_NAME.to_string(),
            mementos: Vec::new(),
        }
    }

    pub fn to_pb(&self, dap_name: &str) -> dap::ConstructQueryConstraintObjectRequest {
        let candidate = self.dap_field_candidates.get(dap_name);
        dap::ConstructQueryConstraintObjectRequest {
            operator: self.operator.clone(),
            query_field_type: self.query_field_type.clone(),
            query_field_value: Some(self.query_field_value.to_pb()),
            target_field_name: self.target_field_name.clone(),
            target_field_type: candidate
                .map(|c| c.target_field_type.clone())
                .unwrap_or_default(),
            target_table_name: candidate
                .map(|c| c.target_table_name.clone())
                .unwrap_or_default(),
            dap_name: dap_name.to_string(),
            node_name: Some(self.name.clone()),
            mementos: self.mementos.clone(),
        }
    }

    pub fn from_pb(pb: &dap::ConstructQueryConstraintObjectRequest) -> Result<Self, OefError> {
        let value = pb
            .query_field_value
            .as_ref()
            .ok_or_else(|| OefError::Protocol("constraint leaf has no value".to_string()))?;
        Ok(Self {
            operator: pb.operator.clone(),
            query_field_type: pb.query_field_type.clone(),
            query_field_value: QueryValue::from_pb(value)?,
            target_field_name: pb.target_field_name.clone(),
            target_field_type: (!pb.target_field_type.is_empty())
                .then(|| pb.target_field_type.clone()),
            target_table_name: (!pb.target_table_name.is_empty())
                .then(|| pb.target_table_name.clone()),
            dap_names: BTreeSet::new(),
            dap_field_candidates: BTreeMap::new(),
            name: pb
                .node_name
                .clone()
                .unwrap_or_else(|| DEFAULT_NODE_NAME.to_string()),
            mementos: pb.mementos.clone(),
        })
    }

    /// Evaluate this leaf against a description.
    ///
    /// An absent attribute or a type mismatch is `false`, never an
    /// error; the operator then dispatches on the value.
    pub fn check(&self, description: &Description) -> bool {
        let Some(value) = description.values.get(&self.target_field_name) else {
            return false;
        };
        match self.operator.as_str() {
            OPERATOR_EQ => scalar_eq(value, &self.query_field_value) == Some(true),
            OPERATOR_NE => scalar_eq(value, &self.query_field_value) == Some(false),
            OPERATOR_LT => scalar_cmp(value, &self.query_field_value)
                .is_some_and(|o| o == std::cmp::Ordering::Less),
            OPERATOR_LE => {
                scalar_cmp(value, &self.query_field_value).is_some_and(|o| o != std::cmp::Ordering::Greater)
            }
            OPERATOR_GT => scalar_cmp(value, &self.query_field_value)
                .is_some_and(|o| o == std::cmp::Ordering::Greater),
            OPERATOR_GE => {
                scalar_cmp(value, &self.query_field_value).is_some_and(|o| o != std::cmp::Ordering::Less)
            }
            OPERATOR_IN => contains(value, &self.query_field_value) == Some(true),
            OPERATOR_NOT_IN => contains(value, &self.query_field_value) == Some(false),
            _ => false,
        }
    }
}

/// Scalar equality between a description value and a query value;
/// `None` when the types do not line up.
fn scalar_eq(value: &AttributeValue, query: &QueryValue) -> Option<bool> {
    match (value, query) {
        (AttributeValue::Bool(a), QueryValue::Bool(b)) => Some(a == b),
        (AttributeValue::Int(a), QueryValue::Int(b)) => Some(a == b),
        (AttributeValue::Float(a), QueryValue::Double(b)) => Some(a == b),
        (AttributeValue::String(a), QueryValue::String(b)) => Some(a == b),
        (AttributeValue::Location(a), QueryValue::Location(b)) => Some(a == b),
        _ => None,
    }
}

fn scalar_cmp(value: &AttributeValue, query: &QueryValue) -> Option<std::cmp::Ordering> {
    match (value, query) {
        (AttributeValue::Int(a), QueryValue::Int(b)) => Some(a.cmp(b)),
        (AttributeValue::Float(a), QueryValue::Double(b)) => a.partial_cmp(b),
        (AttributeValue::String(a), QueryValue::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

/// Membership of a description value in a query list, or within an
/// inclusive range; `None` when the types do not line up.
fn contains(value: &AttributeValue, query: &QueryValue) -> Option<bool> {
    // Nothing is a member of an empty set, whatever its type.
    match query {
        QueryValue::StringList(l) if l.is_empty() => return Some(false),
        QueryValue::IntList(l) if l.is_empty() => return Some(false),
        QueryValue::DoubleList(l) if l.is_empty() => return Some(false),
        QueryValue::LocationList(l) if l.is_empty() => return Some(false),
        _ => {}
    }
    match (value, query) {
        (AttributeValue::String(v), QueryValue::StringList(list)) => {
            Some(list.iter().any(|x| x == v))
        }
        (AttributeValue::Int(v), QueryValue::IntList(list)) => Some(list.contains(v)),
        (AttributeValue::Float(v), QueryValue::DoubleList(list)) => Some(list.contains(v)),
        (AttributeValue::Location(v), QueryValue::LocationList(list)) => Some(list.contains(v)),
        (AttributeValue::String(v), QueryValue::StringRange(lo, hi)) => {
            Some(lo.as_str() <= v.as_str() && v.as_str() <= hi.as_str())
        }
        (AttributeValue::Int(v), QueryValue::IntRange(lo, hi)) => Some(lo <= v && v <= hi),
        (AttributeValue::Float(v), QueryValue::DoubleRange(lo, hi)) => Some(lo <= v && v <= hi),
        _ => None,
    }
}

/// A child of a branch.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Branch(Branch),
    Leaf(Leaf),
}

/// An internal node of the query tree: a combiner over child branches
/// and constraint leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub combiner: String,
    pub subnodes: Vec<Branch>,
    pub leaves: Vec<Leaf>,
    pub name: String,
    pub mementos: Vec<Vec<u8>>,
    pub dap_names: BTreeSet<String>,
    pub dap_field_candidates: BTreeMap<String, DapFieldCandidate>,
}

impl Branch {
    pub fn new(combiner: &str) -> Self {
        Self {
            combiner: combiner.to_string(),
            subnodes: Vec::new(),
            leaves: Vec::new(),
            name: DEFAULT_NODE_NAME.to_string(),
            mementos: Vec::new(),
            dap_names: BTreeSet::new(),
            dap_field_candidates: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, child: Node) {
        match child {
            Node::Branch(branch) => self.subnodes.push(branch),
            Node::Leaf(leaf) => self.leaves.push(leaf),
        }
    }

    /// Recompute the responder set for this branch from its children.
    ///
    /// The set is kept only when every child names the same non-empty
    /// set; any disagreement clears it, forcing the planner downstream
    /// to re-plan. Field candidates are merged from the children and
    /// restricted to the surviving names. Routing metadata only: the
    /// semantics of [`Branch::check`] never consult it.
    pub fn merge_daps(&mut self) {
        let child_sets: Vec<&BTreeSet<String>> = self
            .subnodes
            .iter()
            .map(|n| &n.dap_names)
            .chain(self.leaves.iter().map(|l| &l.dap_names))
            .collect();

        let agreed = match child_sets.first() {
            Some(first) if !first.is_empty() => child_sets.iter().all(|s| *s == *first),
            _ => false,
        };
        if !agreed {
            self.dap_names.clear();
            self.dap_field_candidates.clear();
            return;
        }
        self.dap_names = child_sets[0].clone();

        let mut merged: BTreeMap<String, DapFieldCandidate> = BTreeMap::new();
        for candidates in self
            .subnodes
            .iter()
            .map(|n| &n.dap_field_candidates)
            .chain(self.leaves.iter().map(|l| &l.dap_field_candidates))
        {
            for (name, candidate) in candidates {
                merged.insert(name.clone(), candidate.clone());
            }
        }
        self.dap_field_candidates = merged
            .into_iter()
            .filter(|(name, _)| self.dap_names.contains(name))
            .collect();
    }

    pub fn to_pb(&self, dap_name: &str) -> dap::ConstructQueryObjectRequest {
        dap::ConstructQueryObjectRequest {
            operator: self.combiner.clone(),
            dap_names: self.dap_names.iter().cloned().collect(),
            node_name: Some(self.name.clone()),
            constraints: self.leaves.iter().map(|l| l.to_pb(dap_name)).collect(),
            children: self.subnodes.iter().map(|n| n.to_pb(dap_name)).collect(),
            mementos: self.mementos.clone(),
        }
    }

    pub fn from_pb(pb: &dap::ConstructQueryObjectRequest) -> Result<Self, OefError> {
        Ok(Self {
            combiner: pb.operator.clone(),
            subnodes: pb
                .children
                .iter()
                .map(Branch::from_pb)
                .collect::<Result<Vec<_>, _>>()?,
            leaves: pb
                .constraints
                .iter()
                .map(Leaf::from_pb)
                .collect::<Result<Vec<_>, _>>()?,
            name: pb
                .node_name
                .clone()
                .unwrap_or_else(|| DEFAULT_NODE_NAME.to_string()),
            mementos: pb.mementos.clone(),
            dap_names: pb.dap_names.iter().cloned().collect(),
            dap_field_candidates: BTreeMap::new(),
        })
    }

    /// Evaluate the subtree against a description.
    ///
    /// `all` requires every child true, `any` at least one, `none`
    /// every child false. A branch produced by a distance constraint
    /// (two `==` leaves over `<attr>.location` and `<attr>.radius`) is
    /// recognized and evaluated as the great-circle predicate it
    /// encodes.
    pub fn check(&self, description: &Description) -> bool {
        if let Some(result) = self.check_distance_pair(description) {
            return result;
        }
        let results = self
            .subnodes
            .iter()
            .map(|n| n.check(description))
            .chain(self.leaves.iter().map(|l| l.check(description)));
        match self.combiner.as_str() {
            COMBINER_ALL => results.into_iter().all(|r| r),
            COMBINER_ANY => results.into_iter().any(|r| r),
            COMBINER_NONE => results.into_iter().all(|r| !r),
            _ => false,
        }
    }

    fn check_distance_pair(&self, description: &Description) -> Option<bool> {
        if self.combiner != COMBINER_ALL || !self.subnodes.is_empty() || self.leaves.len() != 2 {
            return None;
        }
        let location_leaf = self
            .leaves
            .iter()
            .find(|l| l.target_field_name.ends_with(".location"))?;
        let radius_leaf = self
            .leaves
            .iter()
            .find(|l| l.target_field_name.ends_with(".radius"))?;
        let attr = location_leaf.target_field_name.strip_suffix(".location")?;
        if radius_leaf.target_field_name.strip_suffix(".radius")? != attr {
            return None;
        }
        let (QueryValue::Location(center), QueryValue::Double(radius)) = (
            &location_leaf.query_field_value,
            &radius_leaf.query_field_value,
        ) else {
            return None;
        };
        match description.values.get(attr) {
            Some(AttributeValue::Location(point)) => Some(center.distance(point) <= *radius),
            _ => Some(false),
        }
    }
}
