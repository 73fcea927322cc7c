use serde_json::{json, Map, Value};

/// Declared argument type for a single operation parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
}

impl ParamKind {
    pub fn json_type_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
        }
    }

    /// Whether a decoded JSON value has the declared shape. Integers must be
    /// whole JSON numbers; booleans and numeric strings do not count.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.as_i64().is_some(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
}

/// Static description of one callable operation.
///
/// The advertisement sent to the model and the validation the dispatcher
/// performs are both derived from this structure, so the two can never
/// diverge.
#[derive(Clone, Copy, Debug)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ParamSpec],
}

impl OperationDescriptor {
    /// JSON-schema object advertised to the model provider.
    pub fn schema_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in self.parameters {
            properties.insert(
                param.name.to_string(),
                json!({
                    "type": param.kind.json_type_name(),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(Value::String(param.name.to_string()));
            }
        }

        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": Value::Array(required),
        })
    }
}

pub const FIND_PRODUCT: &str = "find_product";
pub const LIST_LOW_STOCK: &str = "list_low_stock";
pub const UPDATE_STOCK: &str = "update_stock";

/// The fixed operation catalog. Process-wide and immutable: three
/// operations, no registration at runtime.
static DESCRIPTORS: [OperationDescriptor; 3] = [
    OperationDescriptor {
        name: FIND_PRODUCT,
        description: "Find products in the inventory database by name.",
        parameters: &[ParamSpec {
            name: "name",
            kind: ParamKind::String,
            description: "Part of or the full product name, e.g. 'iPhone'.",
            required: true,
        }],
    },
    OperationDescriptor {
        name: LIST_LOW_STOCK,
        description: "List products that are low on stock (stock < threshold).",
        parameters: &[ParamSpec {
            name: "threshold",
            kind: ParamKind::Integer,
            description: "Stock level threshold, e.g. 3.",
            required: true,
        }],
    },
    OperationDescriptor {
        name: UPDATE_STOCK,
        description: "Adjust the stock count of a product by a delta.",
        parameters: &[
            ParamSpec {
                name: "product_id",
                kind: ParamKind::Integer,
                description: "Id of the product in the database.",
                required: true,
            },
            ParamSpec {
                name: "delta",
                kind: ParamKind::Integer,
                description: "Stock change; -2 means two units were sold.",
                required: true,
            },
        ],
    },
];

pub fn descriptors() -> &'static [OperationDescriptor] {
    &DESCRIPTORS
}

pub fn resolve(name: &str) -> Option<&'static OperationDescriptor> {
    DESCRIPTORS.iter().find(|descriptor| descriptor.name == name)
}
