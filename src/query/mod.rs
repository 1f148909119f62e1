//! Constraint queries over data models.
//!
//! A [`Query`] is a set of constraint expressions, optionally bound
//! to a [`DataModel`]. Expressions validate at construction, evaluate
//! in memory against a [`Description`], and serialize to the wire
//! tree in [`tree`].

pub mod tree;

use crate::error::OefError;
use crate::proto::dap;
use crate::schema::{AttributeType, AttributeValue, DataModel, Description, Location};
use tree::{Branch, Leaf, Node, QueryValue};

/// The relation a single constraint imposes on an attribute.
///
/// Ordering relations and ranges are restricted to the ordered scalar
/// types (int, float, string); `Distance` holds when the attribute is
/// within `radius_km` kilometres of `center`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintType {
    Eq(AttributeValue),
    NotEq(AttributeValue),
    Lt(AttributeValue),
    LtEq(AttributeValue),
    Gt(AttributeValue),
    GtEq(AttributeValue),
    /// Inclusive at both ends.
    Range(AttributeValue, AttributeValue),
    In(Vec<AttributeValue>),
    NotIn(Vec<AttributeValue>),
    Distance { center: Location, radius_km: f64 },
}

impl ConstraintType {
    fn validate(&self) -> Result<(), OefError> {
        match self {
            ConstraintType::Eq(_) | ConstraintType::NotEq(_) | ConstraintType::Distance { .. } => {
                Ok(())
            }
            ConstraintType::Lt(v)
            | ConstraintType::LtEq(v)
            | ConstraintType::Gt(v)
            | ConstraintType::GtEq(v) => ordered_scalar(v),
            ConstraintType::Range(lo, hi) => {
                ordered_scalar(lo)?;
                ordered_scalar(hi)?;
                if lo.attribute_type() != hi.attribute_type() {
                    return Err(OefError::Validation(
                        "range ends have different types".to_string(),
                    ));
                }
                Ok(())
            }
            ConstraintType::In(values) | ConstraintType::NotIn(values) => {
                let mut types = values.iter().map(AttributeValue::attribute_type);
                if let Some(first) = types.next() {
                    if types.any(|t| t != first) {
                        return Err(OefError::Validation(
                            "membership set mixes value types".to_string(),
                        ));
                    }
                    if first == AttributeType::Bool {
                        return Err(OefError::Validation(
                            "membership over booleans is not supported".to_string(),
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    /// The attribute type this constraint applies to, or `None` when
    /// it cannot be inferred (an empty membership set).
    fn checked_type(&self) -> Option<AttributeType> {
        match self {
            ConstraintType::Eq(v)
            | ConstraintType::NotEq(v)
            | ConstraintType::Lt(v)
            | ConstraintType::LtEq(v)
            | ConstraintType::Gt(v)
            | ConstraintType::GtEq(v)
            | ConstraintType::Range(v, _) => Some(v.attribute_type()),
            ConstraintType::In(values) | ConstraintType::NotIn(values) => {
                values.first().map(AttributeValue::attribute_type)
            }
            ConstraintType::Distance { .. } => Some(AttributeType::Location),
        }
    }

    /// The operator predicate, applied to a type-checked value.
    fn holds(&self, value: &AttributeValue) -> bool {
        use std::cmp::Ordering;
        match self {
            ConstraintType::Eq(v) => value == v,
            ConstraintType::NotEq(v) => value != v,
            ConstraintType::Lt(v) => compare(value, v) == Some(Ordering::Less),
            ConstraintType::LtEq(v) => {
                matches!(compare(value, v), Some(Ordering::Less | Ordering::Equal))
            }
            ConstraintType::Gt(v) => compare(value, v) == Some(Ordering::Greater),
            ConstraintType::GtEq(v) => {
                matches!(compare(value, v), Some(Ordering::Greater | Ordering::Equal))
            }
            ConstraintType::Range(lo, hi) => {
                matches!(compare(value, lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(value, hi), Some(Ordering::Less | Ordering::Equal))
            }
            ConstraintType::In(values) => values.contains(value),
            ConstraintType::NotIn(values) => !values.contains(value),
            ConstraintType::Distance { center, radius_km } => match value {
                AttributeValue::Location(point) => center.distance(point) <= *radius_km,
                _ => false,
            },
        }
    }

    fn query_value(&self) -> Result<QueryValue, OefError> {
        match self {
            ConstraintType::Eq(v)
            | ConstraintType::NotEq(v)
            | ConstraintType::Lt(v)
            | ConstraintType::LtEq(v)
            | ConstraintType::Gt(v)
            | ConstraintType::GtEq(v) => scalar_query_value(v),
            ConstraintType::Range(lo, hi) => match (lo, hi) {
                (AttributeValue::Int(a), AttributeValue::Int(b)) => {
                    Ok(QueryValue::IntRange(*a, *b))
                }
                (AttributeValue::Float(a), AttributeValue::Float(b)) => {
                    Ok(QueryValue::DoubleRange(*a, *b))
                }
                (AttributeValue::String(a), AttributeValue::String(b)) => {
                    Ok(QueryValue::StringRange(a.clone(), b.clone()))
                }
                _ => Err(OefError::Validation(
                    "range ends are not ordered scalars".to_string(),
                )),
            },
            ConstraintType::In(values) | ConstraintType::NotIn(values) => {
                list_query_value(values)
            }
            ConstraintType::Distance { .. } => Err(OefError::Validation(
                "distance constraints serialize as a branch".to_string(),
            )),
        }
    }

    fn operator(&self) -> &'static str {
        match self {
            ConstraintType::Eq(_) => tree::OPERATOR_EQ,
            ConstraintType::NotEq(_) => tree::OPERATOR_NE,
            ConstraintType::Lt(_) => tree::OPERATOR_LT,
            ConstraintType::LtEq(_) => tree::OPERATOR_LE,
            ConstraintType::Gt(_) => tree::OPERATOR_GT,
            ConstraintType::GtEq(_) => tree::OPERATOR_GE,
            // Ranges ride the membership operator with a range-typed
            // value; the typecode disambiguates.
            ConstraintType::Range(..) => tree::OPERATOR_IN,
            ConstraintType::In(_) => tree::OPERATOR_IN,
            ConstraintType::NotIn(_) => tree::OPERATOR_NOT_IN,
            ConstraintType::Distance { .. } => tree::OPERATOR_CLOSE_TO,
        }
    }
}

fn ordered_scalar(value: &AttributeValue) -> Result<(), OefError> {
    match value.attribute_type() {
        AttributeType::Int | AttributeType::Float | AttributeType::String => Ok(()),
        other => Err(OefError::Validation(format!(
            "ordering is not defined for {:?} attributes",
            other
        ))),
    }
}

fn compare(a: &AttributeValue, b: &AttributeValue) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (AttributeValue::Int(x), AttributeValue::Int(y)) => Some(x.cmp(y)),
        (AttributeValue::Float(x), AttributeValue::Float(y)) => x.partial_cmp(y),
        (AttributeValue::String(x), AttributeValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn scalar_query_value(value: &AttributeValue) -> Result<QueryValue, OefError> {
    Ok(match value {
        AttributeValue::Bool(b) => QueryValue::Bool(*b),
        AttributeValue::Int(i) => QueryValue::Int(*i),
        AttributeValue::Float(d) => QueryValue::Double(*d),
        AttributeValue::String(s) => QueryValue::String(s.clone()),
        AttributeValue::Location(l) => QueryValue::Location(*l),
    })
}

fn list_query_value(values: &[AttributeValue]) -> Result<QueryValue, OefError> {
    match values.first() {
        None | Some(AttributeValue::String(_)) => Ok(QueryValue::StringList(
            values
                .iter()
                .filter_map(|v| match v {
                    AttributeValue::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        )),
        Some(AttributeValue::Int(_)) => Ok(QueryValue::IntList(
            values
                .iter()
                .filter_map(|v| match v {
                    AttributeValue::Int(i) => Some(*i),
                    _ => None,
                })
                .collect(),
        )),
        Some(AttributeValue::Float(_)) => Ok(QueryValue::DoubleList(
            values
                .iter()
                .filter_map(|v| match v {
                    AttributeValue::Float(d) => Some(*d),
                    _ => None,
                })
                .collect(),
        )),
        Some(AttributeValue::Location(_)) => Ok(QueryValue::LocationList(
            values
                .iter()
                .filter_map(|v| match v {
                    AttributeValue::Location(l) => Some(*l),
                    _ => None,
                })
                .collect(),
        )),
        Some(AttributeValue::Bool(_)) => Err(OefError::Validation(
            "membership over booleans is not supported".to_string(),
        )),
    }
}

/// A constraint over a named attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub attribute_name: String,
    pub constraint: ConstraintType,
}

impl Constraint {
    pub fn new(attribute_name: impl Into<String>, constraint: ConstraintType) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            constraint,
        }
    }

    /// Whether a description satisfies this constraint. An absent
    /// attribute, or one of the wrong runtime type, never does.
    pub fn check(&self, description: &Description) -> bool {
        let Some(value) = description.values.get(&self.attribute_name) else {
            return false;
        };
        if let Some(expected) = self.constraint.checked_type() {
            if value.attribute_type() != expected {
                return false;
            }
        }
        self.constraint.holds(value)
    }

    fn to_node(&self) -> Result<Node, OefError> {
        if let ConstraintType::Distance { center, radius_km } = &self.constraint {
            // A distance constraint fans out into a pair of leaves the
            // planner matches against the attribute's location and the
            // search radius.
            let mut branch = Branch::new(tree::COMBINER_ALL);
            branch.add(Node::Leaf(Leaf::new(
                tree::OPERATOR_EQ,
                QueryValue::Location(*center),
                format!("{}.location", self.attribute_name),
            )));
            branch.add(Node::Leaf(Leaf::new(
                tree::OPERATOR_EQ,
                QueryValue::Double(*radius_km),
                format!("{}.radius", self.attribute_name),
            )));
            branch.merge_daps();
            return Ok(Node::Branch(branch));
        }
        Ok(Node::Leaf(Leaf::new(
            self.constraint.operator(),
            self.constraint.query_value()?,
            self.attribute_name.clone(),
        )))
    }
}

/// A constraint expression: a single constraint or a boolean
/// combination of expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintExpr {
    And(Vec<ConstraintExpr>),
    Or(Vec<ConstraintExpr>),
    Not(Box<ConstraintExpr>),
    Constraint(Constraint),
}

impl ConstraintExpr {
    /// All children must hold. Requires at least two children.
    pub fn and(children: Vec<ConstraintExpr>) -> Result<Self, OefError> {
        let expr = ConstraintExpr::And(children);
        expr.validate()?;
        Ok(expr)
    }

    /// At least one child must hold. Requires at least two children.
    pub fn or(children: Vec<ConstraintExpr>) -> Result<Self, OefError> {
        let expr = ConstraintExpr::Or(children);
        expr.validate()?;
        Ok(expr)
    }

    pub fn not(child: ConstraintExpr) -> Self {
        ConstraintExpr::Not(Box::new(child))
    }

    pub fn constraint(
        attribute_name: impl Into<String>,
        constraint: ConstraintType,
    ) -> Result<Self, OefError> {
        let expr = ConstraintExpr::Constraint(Constraint::new(attribute_name, constraint));
        expr.validate()?;
        Ok(expr)
    }

    fn validate(&self) -> Result<(), OefError> {
        match self {
            ConstraintExpr::And(children) | ConstraintExpr::Or(children) => {
                if children.len() < 2 {
                    return Err(OefError::Validation(
                        "and/or expressions require at least two children".to_string(),
                    ));
                }
                children.iter().try_for_each(ConstraintExpr::validate)
            }
            ConstraintExpr::Not(child) => child.validate(),
            ConstraintExpr::Constraint(constraint) => constraint.constraint.validate(),
        }
    }

    fn validate_with_model(&self, model: &DataModel) -> Result<(), OefError> {
        match self {
            ConstraintExpr::And(children) | ConstraintExpr::Or(children) => children
                .iter()
                .try_for_each(|child| child.validate_with_model(model)),
            ConstraintExpr::Not(child) => child.validate_with_model(model),
            ConstraintExpr::Constraint(constraint) => {
                let Some(schema) = model.attribute(&constraint.attribute_name) else {
                    return Err(OefError::Validation(format!(
                        "constraint references attribute {:?} absent from data model {:?}",
                        constraint.attribute_name, model.name
                    )));
                };
                match constraint.constraint.checked_type() {
                    Some(t) if t != schema.attribute_type => Err(OefError::Validation(format!(
                        "constraint on {:?} has type {:?}, data model declares {:?}",
                        constraint.attribute_name, t, schema.attribute_type
                    ))),
                    // An uninferable constraint type is permitted.
                    _ => Ok(()),
                }
            }
        }
    }

    pub fn check(&self, description: &Description) -> bool {
        match self {
            ConstraintExpr::And(children) => children.iter().all(|c| c.check(description)),
            ConstraintExpr::Or(children) => children.iter().any(|c| c.check(description)),
            ConstraintExpr::Not(child) => !child.check(description),
            ConstraintExpr::Constraint(constraint) => constraint.check(description),
        }
    }

    fn to_node(&self) -> Result<Node, OefError> {
        match self {
            ConstraintExpr::And(children) => combine(tree::COMBINER_ALL, children),
            ConstraintExpr::Or(children) => combine(tree::COMBINER_ANY, children),
            ConstraintExpr::Not(child) => {
                combine(tree::COMBINER_NONE, std::slice::from_ref(child.as_ref()))
            }
            ConstraintExpr::Constraint(constraint) => constraint.to_node(),
        }
    }

    fn from_node(node: &Node) -> Result<Self, OefError> {
        match node {
            Node::Leaf(leaf) => Ok(ConstraintExpr::Constraint(constraint_from_leaf(leaf)?)),
            Node::Branch(branch) => Self::from_branch(branch),
        }
    }

    fn from_branch(branch: &Branch) -> Result<Self, OefError> {
        if let Some(constraint) = distance_from_branch(branch) {
            return Ok(ConstraintExpr::Constraint(constraint));
        }
        let mut children: Vec<ConstraintExpr> = Vec::new();
        for sub in &branch.subnodes {
            children.push(Self::from_branch(sub)?);
        }
        for leaf in &branch.leaves {
            children.push(ConstraintExpr::Constraint(constraint_from_leaf(leaf)?));
        }
        match branch.combiner.as_str() {
            tree::COMBINER_ALL => match children.len() {
                0 => Err(OefError::Protocol("empty branch in query tree".to_string())),
                1 => Ok(children.pop().expect("one child")),
                _ => Ok(ConstraintExpr::And(children)),
            },
            tree::COMBINER_ANY => match children.len() {
                0 => Err(OefError::Protocol("empty branch in query tree".to_string())),
                1 => Ok(children.pop().expect("one child")),
                _ => Ok(ConstraintExpr::Or(children)),
            },
            tree::COMBINER_NONE => match children.len() {
                0 => Err(OefError::Protocol("empty branch in query tree".to_string())),
                1 => Ok(ConstraintExpr::not(children.pop().expect("one child"))),
                _ => Ok(ConstraintExpr::not(ConstraintExpr::Or(children))),
            },
            other => Err(OefError::Protocol(format!(
                "unknown combiner {:?} in query tree",
                other
            ))),
        }
    }
}

fn combine(combiner: &str, children: &[ConstraintExpr]) -> Result<Node, OefError> {
    let mut branch = Branch::new(combiner);
    for child in children {
        branch.add(child.to_node()?);
    }
    branch.merge_daps();
    Ok(Node::Branch(branch))
}

fn constraint_from_leaf(leaf: &Leaf) -> Result<Constraint, OefError> {
    let scalar = |qv: &QueryValue| -> Result<AttributeValue, OefError> {
        Ok(match qv {
            QueryValue::Bool(b) => AttributeValue::Bool(*b),
            QueryValue::Int(i) => AttributeValue::Int(*i),
            QueryValue::Double(d) => AttributeValue::Float(*d),
            QueryValue::String(s) => AttributeValue::String(s.clone()),
            QueryValue::Location(l) => AttributeValue::Location(*l),
            other => {
                return Err(OefError::Protocol(format!(
                    "operator {:?} does not take a {:?} value",
                    leaf.operator,
                    other.typecode()
                )))
            }
        })
    };
    let list = |qv: &QueryValue| -> Result<Vec<AttributeValue>, OefError> {
        Ok(match qv {
            QueryValue::StringList(v) => v.iter().map(|s| AttributeValue::String(s.clone())).collect(),
            QueryValue::IntList(v) => v.iter().map(|i| AttributeValue::Int(*i)).collect(),
            QueryValue::DoubleList(v) => v.iter().map(|d| AttributeValue::Float(*d)).collect(),
            QueryValue::LocationList(v) => {
                v.iter().map(|l| AttributeValue::Location(*l)).collect()
            }
            other => {
                return Err(OefError::Protocol(format!(
                    "operator {:?} does not take a {:?} value",
                    leaf.operator,
                    other.typecode()
                )))
            }
        })
    };

    let value = &leaf.query_field_value;
    let constraint = match leaf.operator.as_str() {
        tree::OPERATOR_EQ => ConstraintType::Eq(scalar(value)?),
        tree::OPERATOR_NE => ConstraintType::NotEq(scalar(value)?),
        tree::OPERATOR_LT => ConstraintType::Lt(scalar(value)?),
        tree::OPERATOR_LE => ConstraintType::LtEq(scalar(value)?),
        tree::OPERATOR_GT => ConstraintType::Gt(scalar(value)?),
        tree::OPERATOR_GE => ConstraintType::GtEq(scalar(value)?),
        tree::OPERATOR_IN => match value {
            QueryValue::StringRange(a, b) => ConstraintType::Range(
                AttributeValue::String(a.clone()),
                AttributeValue::String(b.clone()),
            ),
            QueryValue::IntRange(a, b) => {
                ConstraintType::Range(AttributeValue::Int(*a), AttributeValue::Int(*b))
            }
            QueryValue::DoubleRange(a, b) => {
                ConstraintType::Range(AttributeValue::Float(*a), AttributeValue::Float(*b))
            }
            other => ConstraintType::In(list(other)?),
        },
        tree::OPERATOR_NOT_IN => ConstraintType::NotIn(list(value)?),
        other => {
            return Err(OefError::Protocol(format!(
                "unknown constraint operator {:?}",
                other
            )))
        }
    };
    Ok(Constraint::new(leaf.target_field_name.clone(), constraint))
}

/// Recognize the two-leaf branch a distance constraint serializes to.
fn distance_from_branch(branch: &Branch) -> Option<Constraint> {
    if branch.combiner != tree::COMBINER_ALL
        || !branch.subnodes.is_empty()
        || branch.leaves.len() != 2
    {
        return None;
    }
    let location_leaf = branch
        .leaves
        .iter()
        .find(|l| l.target_field_name.ends_with(".location"))?;
    let radius_leaf = branch
        .leaves
        .iter()
        .find(|l| l.target_field_name.ends_with(".radius"))?;
    let attr = location_leaf.target_field_name.strip_suffix(".location")?;
    if radius_leaf.target_field_name.strip_suffix(".radius")? != attr {
        return None;
    }
    let (QueryValue::Location(center), QueryValue::Double(radius_km)) = (
        &location_leaf.query_field_value,
        &radius_leaf.query_field_value,
    ) else {
        return None;
    };
    Some(Constraint::new(
        attr,
        ConstraintType::Distance {
            center: *center,
            radius_km: *radius_km,
        },
    ))
}

/// A search to be performed: one or more constraint expressions,
/// optionally bound to a data model.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub constraints: Vec<ConstraintExpr>,
    pub model: Option<DataModel>,
}

impl Query {
    /// Build a query. At least one constraint is required; when a
    /// model is supplied, every constraint must reference one of its
    /// attributes with a matching type.
    pub fn new(
        constraints: Vec<ConstraintExpr>,
        model: Option<DataModel>,
    ) -> Result<Self, OefError> {
        if constraints.is_empty() {
            return Err(OefError::Validation(
                "a query requires at least one constraint".to_string(),
            ));
        }
        for constraint in &constraints {
            constraint.validate()?;
            if let Some(model) = &model {
                constraint.validate_with_model(model)?;
            }
        }
        Ok(Self { constraints, model })
    }

    /// Whether a description satisfies every top-level constraint.
    pub fn check(&self, description: &Description) -> bool {
        self.constraints.iter().all(|c| c.check(description))
    }

    /// The wire tree: a root `all` branch over the constraints.
    pub fn to_root(&self) -> Result<Branch, OefError> {
        let mut root = Branch::new(tree::COMBINER_ALL);
        for constraint in &self.constraints {
            root.add(constraint.to_node()?);
        }
        root.merge_daps();
        Ok(root)
    }

    pub fn to_pb(&self) -> Result<dap::ConstructQueryObjectRequest, OefError> {
        Ok(self.to_root()?.to_pb(""))
    }

    /// Rebuild a query from its wire tree.
    pub fn from_pb(pb: &dap::ConstructQueryObjectRequest) -> Result<Self, OefError> {
        let root = Branch::from_pb(pb)?;
        if root.combiner != tree::COMBINER_ALL {
            return Err(OefError::Protocol(format!(
                "query root combiner is {:?}",
                root.combiner
            )));
        }
        let mut constraints = Vec::new();
        for sub in &root.subnodes {
            constraints.push(ConstraintExpr::from_branch(sub)?);
        }
        for leaf in &root.leaves {
            constraints.push(ConstraintExpr::from_node(&Node::Leaf(leaf.clone()))?);
        }
        Query::new(constraints, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn desc(entries: &[(&str, AttributeValue)]) -> Description {
        let values: BTreeMap<String, AttributeValue> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Description::new(values).unwrap()
    }

    fn title_query() -> Query {
        Query::new(
            vec![ConstraintExpr::and(vec![
                ConstraintExpr::constraint(
                    "title",
                    ConstraintType::Range("I".into(), "J".into()),
                )
                .unwrap(),
                ConstraintExpr::constraint("title", ConstraintType::NotEq("It".into())).unwrap(),
            ])
            .unwrap()],
            None,
        )
        .unwrap()
    }

    /// Books whose title sorts in ["I", "J"], except "It".
    #[test]
    fn test_range_and_not_eq() {
        let q = title_query();
        assert!(q.check(&desc(&[("title", "I, Robot".into())])));
        assert!(!q.check(&desc(&[("title", "It".into())])));
        assert!(!q.check(&desc(&[("title", "Neuromancer".into())])));
        assert!(!q.check(&desc(&[("genre", "horror".into())])));
    }

    #[test]
    fn test_single_child_and_or_fail() {
        let c = ConstraintExpr::constraint("a", ConstraintType::Eq(AttributeValue::Int(5)))
            .unwrap();
        assert!(matches!(
            ConstraintExpr::and(vec![c.clone()]),
            Err(OefError::Validation(_))
        ));
        assert!(matches!(
            ConstraintExpr::or(vec![c]),
            Err(OefError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_query_fails() {
        assert!(matches!(
            Query::new(vec![], None),
            Err(OefError::Validation(_))
        ));
    }

    #[test]
    fn test_ordering_rejects_unordered_types() {
        assert!(matches!(
            ConstraintExpr::constraint("flag", ConstraintType::Lt(AttributeValue::Bool(true))),
            Err(OefError::Validation(_))
        ));
    }

    #[test]
    fn test_query_against_model() {
        let model = DataModel::new(
            "book",
            vec![
                crate::schema::AttributeSchema::new(
                    "title",
                    AttributeType::String,
                    true,
                    None,
                ),
                crate::schema::AttributeSchema::new("year", AttributeType::Int, true, None),
            ],
            None,
        )
        .unwrap();

        let ok = Query::new(
            vec![ConstraintExpr::constraint("title", ConstraintType::Eq("It".into())).unwrap()],
            Some(model.clone()),
        );
        assert!(ok.is_ok());

        let unknown_attribute = Query::new(
            vec![ConstraintExpr::constraint("genre", ConstraintType::Eq("horror".into())).unwrap()],
            Some(model.clone()),
        );
        assert!(matches!(unknown_attribute, Err(OefError::Validation(_))));

        let wrong_type = Query::new(
            vec![
                ConstraintExpr::constraint("year", ConstraintType::Eq("1986".into())).unwrap(),
            ],
            Some(model),
        );
        assert!(matches!(wrong_type, Err(OefError::Validation(_))));
    }

    /// A distance constraint serializes to an `all` branch over a
    /// `<attr>.location` leaf and a `<attr>.radius` leaf.
    #[test]
    fn test_distance_wire_expansion() {
        let q = Query::new(
            vec![ConstraintExpr::constraint(
                "pos",
                ConstraintType::Distance {
                    center: Location::new(52.0, 0.1),
                    radius_km: 10.0,
                },
            )
            .unwrap()],
            None,
        )
        .unwrap();

        let root = q.to_root().unwrap();
        assert_eq!(root.combiner, tree::COMBINER_ALL);
        assert_eq!(root.subnodes.len(), 1);
        let pair = &root.subnodes[0];
        assert_eq!(pair.combiner, tree::COMBINER_ALL);
        assert_eq!(pair.leaves.len(), 2);

        let location = pair
            .leaves
            .iter()
            .find(|l| l.target_field_name == "pos.location")
            .expect("location leaf");
        assert_eq!(location.operator, tree::OPERATOR_EQ);
        assert_eq!(location.query_field_type, "location");

        let radius = pair
            .leaves
            .iter()
            .find(|l| l.target_field_name == "pos.radius")
            .expect("radius leaf");
        assert_eq!(radius.operator, tree::OPERATOR_EQ);
        assert_eq!(radius.query_field_type, "double");
        assert_eq!(radius.query_field_value, QueryValue::Double(10.0));
    }

    /// Serialization preserves the in-memory semantics: the wire tree
    /// evaluates every description the same way the query does.
    #[test]
    fn test_wire_tree_is_semantics_preserving() {
        let near = Location::new(52.20, 0.12);
        let queries = vec![
            title_query(),
            Query::new(
                vec![
                    ConstraintExpr::constraint("year", ConstraintType::Gt(AttributeValue::Int(1980)))
                        .unwrap(),
                    ConstraintExpr::or(vec![
                        ConstraintExpr::constraint(
                            "genre",
                            ConstraintType::In(vec!["horror".into(), "novel".into()]),
                        )
                        .unwrap(),
                        ConstraintExpr::constraint("genre", ConstraintType::Eq("comedy".into()))
                            .unwrap(),
                    ])
                    .unwrap(),
                ],
                None,
            )
            .unwrap(),
            Query::new(
                vec![ConstraintExpr::not(
                    ConstraintExpr::constraint(
                        "year",
                        ConstraintType::NotIn(vec![AttributeValue::Int(1986)]),
                    )
                    .unwrap(),
                )],
                None,
            )
            .unwrap(),
            Query::new(
                vec![ConstraintExpr::constraint(
                    "pos",
                    ConstraintType::Distance {
                        center: near,
                        radius_km: 100.0,
                    },
                )
                .unwrap()],
                None,
            )
            .unwrap(),
        ];
        let descriptions = vec![
            desc(&[
                ("title", "I, Robot".into()),
                ("year", AttributeValue::Int(1986)),
                ("genre", "horror".into()),
                ("pos", AttributeValue::Location(Location::new(52.2, 0.11))),
            ]),
            desc(&[
                ("title", "It".into()),
                ("year", AttributeValue::Int(1971)),
                ("genre", "comedy".into()),
                ("pos", AttributeValue::Location(Location::new(40.7, -74.0))),
            ]),
            desc(&[("title", "Dune".into())]),
        ];

        for query in &queries {
            let decoded_tree = tree::Branch::from_pb(&query.to_pb().unwrap()).unwrap();
            for description in &descriptions {
                assert_eq!(
                    query.check(description),
                    decoded_tree.check(description),
                    "wire tree diverged for {:?}",
                    query
                );
            }
        }
    }

    /// Queries survive the wire as queries too, not just as trees.
    #[test]
    fn test_query_round_trip() {
        let q = title_query();
        let decoded = Query::from_pb(&q.to_pb().unwrap()).unwrap();
        let samples = [
            desc(&[("title", "I, Robot".into())]),
            desc(&[("title", "It".into())]),
        ];
        for d in &samples {
            assert_eq!(q.check(d), decoded.check(d));
        }
    }
}
