//! Data-model instances: the key/value form of a description together
//! with its schema.

use super::dap::value_message;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(oneof = "value::Value", tags = "1, 2, 3, 4, 5")]
    pub value: Option<value::Value>,
}

pub mod value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "1")]
        S(String),
        #[prost(bool, tag = "2")]
        B(bool),
        #[prost(int64, tag = "3")]
        I(i64),
        #[prost(double, tag = "4")]
        D(f64),
        #[prost(message, tag = "5")]
        L(super::value_message::Location),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<Value>,
}

/// A described instance: its schema and the attribute values.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Instance {
    #[prost(message, optional, tag = "1")]
    pub model: Option<value_message::DataModel>,
    #[prost(message, repeated, tag = "2")]
    pub values: Vec<KeyValue>,
}
