//! Data models and their instances.
//!
//! A [`DataModel`] is a named, ordered set of attribute schemas; a
//! [`Description`] is an instance of one, mapping attribute names to
//! typed values. Both validate their invariants at construction and
//! convert to and from the wire form in [`crate::proto::instance`].

use std::collections::BTreeMap;

use crate::error::OefError;
use crate::proto::dap::value_message;
use crate::proto::{agent, instance};
use crate::utils::haversine;

/// A pair of latitude and longitude, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance(&self, other: &Location) -> f64 {
        haversine(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }

    pub(crate) fn to_pb(self) -> value_message::Location {
        value_message::Location {
            coordinate_system: "latlon".to_string(),
            unit: "deg".to_string(),
            v: vec![self.latitude, self.longitude],
        }
    }

    pub(crate) fn from_pb(pb: &value_message::Location) -> Result<Self, OefError> {
        if pb.coordinate_system != "latlon" || pb.v.len() < 2 {
            return Err(OefError::Protocol(format!(
                "unsupported location coordinate system {:?}",
                pb.coordinate_system
            )));
        }
        Ok(Self::new(pb.v[0], pb.v[1]))
    }
}

/// The closed set of types an attribute may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Bool,
    Int,
    Float,
    String,
    Location,
}

impl AttributeType {
    fn to_pb(self) -> value_message::attribute::Type {
        match self {
            AttributeType::Bool => value_message::attribute::Type::Bool,
            AttributeType::Int => value_message::attribute::Type::Int,
            AttributeType::Float => value_message::attribute::Type::Float,
            AttributeType::String => value_message::attribute::Type::String,
            AttributeType::Location => value_message::attribute::Type::Location,
        }
    }

    fn from_pb(pb: value_message::attribute::Type) -> Self {
        match pb {
            value_message::attribute::Type::Bool => AttributeType::Bool,
            value_message::attribute::Type::Int => AttributeType::Int,
            value_message::attribute::Type::Float => AttributeType::Float,
            value_message::attribute::Type::String => AttributeType::String,
            value_message::attribute::Type::Location => AttributeType::Location,
        }
    }
}

/// A runtime attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Location(Location),
}

impl AttributeValue {
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttributeValue::Bool(_) => AttributeType::Bool,
            AttributeValue::Int(_) => AttributeType::Int,
            AttributeValue::Float(_) => AttributeType::Float,
            AttributeValue::String(_) => AttributeType::String,
            AttributeValue::Location(_) => AttributeType::Location,
        }
    }

    pub(crate) fn to_pb(&self) -> instance::Value {
        let value = match self {
            AttributeValue::Bool(b) => instance::value::Value::B(*b),
            AttributeValue::Int(i) => instance::value::Value::I(*i),
            AttributeValue::Float(d) => instance::value::Value::D(*d),
            AttributeValue::String(s) => instance::value::Value::S(s.clone()),
            AttributeValue::Location(l) => instance::value::Value::L(l.to_pb()),
        };
        instance::Value { value: Some(value) }
    }

    pub(crate) fn from_pb(pb: &instance::Value) -> Result<Self, OefError> {
        match pb.value.as_ref() {
            Some(instance::value::Value::B(b)) => Ok(AttributeValue::Bool(*b)),
            Some(instance::value::Value::I(i)) => Ok(AttributeValue::Int(*i)),
            Some(instance::value::Value::D(d)) => Ok(AttributeValue::Float(*d)),
            Some(instance::value::Value::S(s)) => Ok(AttributeValue::String(s.clone())),
            Some(instance::value::Value::L(l)) => Ok(AttributeValue::Location(Location::from_pb(l)?)),
            None => Err(OefError::Protocol("attribute value is empty".to_string())),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<Location> for AttributeValue {
    fn from(v: Location) -> Self {
        AttributeValue::Location(v)
    }
}

/// Schema of a single attribute of a data model.
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attribute_type: AttributeType,
    pub required: bool,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(
        name: impl Into<String>,
        attribute_type: AttributeType,
        required: bool,
        description: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            required,
            description: description.map(str::to_string),
        }
    }

    pub(crate) fn to_pb(&self) -> value_message::Attribute {
        value_message::Attribute {
            name: self.name.clone(),
            r#type: self.attribute_type.to_pb() as i32,
            required: self.required,
            description: self.description.clone().unwrap_or_default(),
        }
    }

    pub(crate) fn from_pb(pb: &value_message::Attribute) -> Result<Self, OefError> {
        let ty = value_message::attribute::Type::try_from(pb.r#type)
            .map_err(|_| OefError::Protocol(format!("unknown attribute type {}", pb.r#type)))?;
        Ok(Self {
            name: pb.name.clone(),
            attribute_type: AttributeType::from_pb(ty),
            required: pb.required,
            description: (!pb.description.is_empty()).then(|| pb.description.clone()),
        })
    }
}

// Descriptions are display metadata and do not participate in schema
// equality.
impl PartialEq for AttributeSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.attribute_type == other.attribute_type
            && self.required == other.required
    }
}

/// A named schema: the attributes (sorted by name) an instance may
/// carry. Attribute names are unique.
#[derive(Debug, Clone)]
pub struct DataModel {
    pub name: String,
    pub attribute_schemas: Vec<AttributeSchema>,
    pub description: Option<String>,
}

impl DataModel {
    pub fn new(
        name: impl Into<String>,
        mut attribute_schemas: Vec<AttributeSchema>,
        description: Option<&str>,
    ) -> Result<Self, OefError> {
        attribute_schemas.sort_by(|a, b| a.name.cmp(&b.name));
        if attribute_schemas
            .windows(2)
            .any(|pair| pair[0].name == pair[1].name)
        {
            return Err(OefError::Validation(
                "duplicated attribute name in data model".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            attribute_schemas,
            description: description.map(str::to_string),
        })
    }

    /// Look up an attribute schema by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attribute_schemas
            .iter()
            .find(|schema| schema.name == name)
    }

    pub(crate) fn to_pb(&self) -> value_message::DataModel {
        value_message::DataModel {
            name: self.name.clone(),
            attributes: self.attribute_schemas.iter().map(|a| a.to_pb()).collect(),
            description: self.description.clone().unwrap_or_default(),
        }
    }

    pub(crate) fn from_pb(pb: &value_message::DataModel) -> Result<Self, OefError> {
        let attributes = pb
            .attributes
            .iter()
            .map(AttributeSchema::from_pb)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(
            pb.name.clone(),
            attributes,
            (!pb.description.is_empty()).then_some(pb.description.as_str()),
        )
    }
}

impl PartialEq for DataModel {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.attribute_schemas == other.attribute_schemas
    }
}

/// Generate the schema matching a set of attribute values: one
/// required attribute per observed value, with its inferred type.
pub fn generate_schema(
    model_name: impl Into<String>,
    values: &BTreeMap<String, AttributeValue>,
) -> DataModel {
    // Keys of a map are unique and already sorted, so construction
    // cannot violate the model invariants.
    DataModel {
        name: model_name.into(),
        attribute_schemas: values
            .iter()
            .map(|(name, value)| AttributeSchema::new(name.clone(), value.attribute_type(), true, None))
            .collect(),
        description: None,
    }
}

/// Description of an agent or a service: attribute values plus the
/// data model they instantiate.
///
/// Invariants, checked at construction: every required attribute of
/// the model is present; no value names an attribute absent from the
/// model; each value's runtime type equals its schema type.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub values: BTreeMap<String, AttributeValue>,
    pub data_model: DataModel,
}

impl Description {
    /// Build a description without an explicit model; one is
    /// synthesized from the values, marking every attribute required.
    pub fn new(values: BTreeMap<String, AttributeValue>) -> Result<Self, OefError> {
        Self::with_model_name(values, "")
    }

    /// Like [`Description::new`], naming the synthesized model.
    pub fn with_model_name(
        values: BTreeMap<String, AttributeValue>,
        model_name: &str,
    ) -> Result<Self, OefError> {
        let data_model = generate_schema(model_name, &values);
        Self::with_data_model(values, data_model)
    }

    /// Build a description checked against an explicit model.
    pub fn with_data_model(
        values: BTreeMap<String, AttributeValue>,
        data_model: DataModel,
    ) -> Result<Self, OefError> {
        let description = Self { values, data_model };
        description.check_consistency()?;
        Ok(description)
    }

    fn check_consistency(&self) -> Result<(), OefError> {
        for schema in &self.data_model.attribute_schemas {
            match self.values.get(&schema.name) {
                None if schema.required => {
                    return Err(OefError::Validation(format!(
                        "missing required attribute {:?}",
                        schema.name
                    )));
                }
                Some(value) if value.attribute_type() != schema.attribute_type => {
                    return Err(OefError::Validation(format!(
                        "attribute {:?} has incorrect type",
                        schema.name
                    )));
                }
                _ => {}
            }
        }
        for key in self.values.keys() {
            if self.data_model.attribute(key).is_none() {
                return Err(OefError::Validation(format!(
                    "attribute {:?} is not in the data model",
                    key
                )));
            }
        }
        Ok(())
    }

    pub fn to_pb(&self) -> instance::Instance {
        instance::Instance {
            model: Some(self.data_model.to_pb()),
            values: self
                .values
                .iter()
                .map(|(key, value)| instance::KeyValue {
                    key: key.clone(),
                    value: Some(value.to_pb()),
                })
                .collect(),
        }
    }

    pub fn from_pb(pb: &instance::Instance) -> Result<Self, OefError> {
        let model = pb
            .model
            .as_ref()
            .ok_or_else(|| OefError::Protocol("instance has no data model".to_string()))?;
        let data_model = DataModel::from_pb(model)?;
        let mut values = BTreeMap::new();
        for kv in &pb.values {
            let value = kv
                .value
                .as_ref()
                .ok_or_else(|| OefError::Protocol(format!("attribute {:?} has no value", kv.key)))?;
            values.insert(kv.key.clone(), AttributeValue::from_pb(value)?);
        }
        Self::with_data_model(values, data_model)
    }

    pub(crate) fn to_agent_description_pb(&self) -> agent::AgentDescription {
        agent::AgentDescription {
            description: Some(self.to_pb()),
        }
    }
}
