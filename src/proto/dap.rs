//! Typed constraint values and the structured query tree consumed by
//! directory back-ends (DAPs).

/// A typed value on the wire. `typecode` names which of the scalar,
/// list or range fields carries the data; lists and ranges reuse the
/// repeated fields (a range is exactly two entries, low then high).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValueMessage {
    #[prost(string, tag = "1")]
    pub typecode: String,
    #[prost(string, tag = "2")]
    pub s: String,
    #[prost(double, tag = "3")]
    pub d: f64,
    #[prost(float, tag = "4")]
    pub f: f32,
    #[prost(int32, tag = "5")]
    pub i32: i32,
    #[prost(int64, tag = "6")]
    pub i64: i64,
    #[prost(bool, tag = "7")]
    pub b: bool,
    #[prost(message, optional, tag = "8")]
    pub l: Option<value_message::Location>,
    #[prost(message, optional, tag = "9")]
    pub dm: Option<value_message::DataModel>,
    /// Network address, for responders that index on it.
    #[prost(string, tag = "10")]
    pub a: String,
    #[prost(string, repeated, tag = "11")]
    pub v_s: Vec<String>,
    #[prost(double, repeated, tag = "12")]
    pub v_d: Vec<f64>,
    #[prost(float, repeated, tag = "13")]
    pub v_f: Vec<f32>,
    #[prost(int32, repeated, tag = "14")]
    pub v_i32: Vec<i32>,
    #[prost(int64, repeated, tag = "15")]
    pub v_i64: Vec<i64>,
    #[prost(message, repeated, tag = "16")]
    pub v_l: Vec<value_message::Location>,
}

pub mod value_message {
    /// A coordinate in a named system; the client always writes
    /// `latlon` degrees with `v = [latitude, longitude]`.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Location {
        #[prost(string, tag = "1")]
        pub coordinate_system: String,
        #[prost(string, tag = "2")]
        pub unit: String,
        #[prost(double, repeated, tag = "3")]
        pub v: Vec<f64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Attribute {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(enumeration = "attribute::Type", tag = "2")]
        pub r#type: i32,
        #[prost(bool, tag = "3")]
        pub required: bool,
        #[prost(string, tag = "4")]
        pub description: String,
    }

    pub mod attribute {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Bool = 0,
            Int = 1,
            Float = 2,
            String = 3,
            Location = 4,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DataModel {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(message, repeated, tag = "2")]
        pub attributes: Vec<Attribute>,
        #[prost(string, tag = "3")]
        pub description: String,
    }
}

/// A constraint leaf of the query tree.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConstructQueryConstraintObjectRequest {
    #[prost(string, tag = "1")]
    pub operator: String,
    #[prost(string, tag = "2")]
    pub query_field_type: String,
    #[prost(message, optional, tag = "3")]
    pub query_field_value: Option<ValueMessage>,
    #[prost(string, tag = "4")]
    pub target_field_name: String,
    #[prost(string, tag = "5")]
    pub target_field_type: String,
    #[prost(string, tag = "6")]
    pub target_table_name: String,
    #[prost(string, tag = "7")]
    pub dap_name: String,
    #[prost(string, optional, tag = "8")]
    pub node_name: Option<String>,
    /// Opaque correlation annotations; carried, never interpreted.
    #[prost(bytes = "vec", repeated, tag = "9")]
    pub mementos: Vec<Vec<u8>>,
}

/// A branch of the query tree: a combiner over child branches and
/// constraint leaves, plus the responder names the subtree has in
/// common.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConstructQueryObjectRequest {
    /// Combiner: `all`, `any` or `none`.
    #[prost(string, tag = "1")]
    pub operator: String,
    #[prost(string, repeated, tag = "2")]
    pub dap_names: Vec<String>,
    #[prost(string, optional, tag = "3")]
    pub node_name: Option<String>,
    #[prost(message, repeated, tag = "4")]
    pub constraints: Vec<ConstructQueryConstraintObjectRequest>,
    #[prost(message, repeated, tag = "5")]
    pub children: Vec<ConstructQueryObjectRequest>,
    /// Opaque correlation annotations; carried, never interpreted.
    #[prost(bytes = "vec", repeated, tag = "6")]
    pub mementos: Vec<Vec<u8>>,
}
