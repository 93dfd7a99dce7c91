use serde_json::{json, Map, Value};

/// Typed sockets passed between nodes by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketType {
    RecraftClient,
    Image,
    Mask,
}

impl SocketType {
    pub fn as_str(self) -> &'static str {
        match self {
            SocketType::RecraftClient => "RECRAFTCLIENT",
            SocketType::Image => "IMAGE",
            SocketType::Mask => "MASK",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldKind {
    Text {
        multiline: bool,
        default: &'static str,
    },
    Int {
        default: i64,
        min: i64,
        max: i64,
        step: i64,
    },
    Float {
        default: f64,
        min: f64,
        max: f64,
        step: f64,
    },
    Choice {
        options: &'static [&'static str],
    },
    Socket(SocketType),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Host may skip evaluating the upstream value until it is needed.
    pub lazy: bool,
}

impl FieldSpec {
    pub fn check_text(&self, value: &str) -> Result<(), String> {
        match self.kind {
            FieldKind::Text { .. } => Ok(()),
            FieldKind::Choice { options } => {
                if options.iter().any(|option| *option == value) {
                    Ok(())
                } else {
                    Err(format!(
                        "Invalid value '{value}' for '{}'; expected one of: {}",
                        self.name,
                        display_options(options)
                    ))
                }
            }
            _ => Err(self.kind_mismatch("text")),
        }
    }

    pub fn check_int(&self, value: i64) -> Result<(), String> {
        match self.kind {
            FieldKind::Int { min, max, .. } => {
                if (min..=max).contains(&value) {
                    Ok(())
                } else {
                    Err(format!(
                        "Value {value} for '{}' is outside [{min}, {max}]",
                        self.name
                    ))
                }
            }
            _ => Err(self.kind_mismatch("integer")),
        }
    }

    pub fn check_float(&self, value: f64) -> Result<(), String> {
        match self.kind {
            FieldKind::Float { min, max, .. } => {
                if value.is_finite() && (min..=max).contains(&value) {
                    Ok(())
                } else {
                    Err(format!(
                        "Value {value} for '{}' is outside [{min}, {max}]",
                        self.name
                    ))
                }
            }
            _ => Err(self.kind_mismatch("float")),
        }
    }

    fn kind_mismatch(&self, requested: &str) -> String {
        format!("Field '{}' does not accept a {requested} value", self.name)
    }

    /// Renders the `(TYPE, {options})` pair the host UI consumes.
    pub fn to_json(&self) -> Value {
        let (type_tag, mut options) = match self.kind {
            FieldKind::Text { multiline, default } => {
                let mut options = Map::new();
                if multiline {
                    options.insert("multiline".to_string(), Value::Bool(true));
                }
                options.insert("default".to_string(), Value::String(default.to_string()));
                (Value::String("STRING".to_string()), options)
            }
            FieldKind::Int {
                default,
                min,
                max,
                step,
            } => (
                Value::String("INT".to_string()),
                object(json!({
                    "default": default,
                    "min": min,
                    "max": max,
                    "step": step,
                    "display": "number",
                })),
            ),
            FieldKind::Float {
                default,
                min,
                max,
                step,
            } => (
                Value::String("FLOAT".to_string()),
                object(json!({
                    "default": default,
                    "min": min,
                    "max": max,
                    "step": step,
                })),
            ),
            FieldKind::Choice { options } => (
                Value::Array(
                    options
                        .iter()
                        .map(|option| Value::String(option.to_string()))
                        .collect(),
                ),
                Map::new(),
            ),
            FieldKind::Socket(socket) => (
                Value::String(socket.as_str().to_string()),
                object(json!({ "forceInput": true })),
            ),
        };
        if self.lazy {
            options.insert("lazy".to_string(), Value::Bool(true));
        }
        if options.is_empty() {
            Value::Array(vec![type_tag])
        } else {
            Value::Array(vec![type_tag, Value::Object(options)])
        }
    }
}

/// Static description of one node: identity, inputs, and single output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeSpec {
    pub id: &'static str,
    pub display_name: &'static str,
    pub category: &'static str,
    pub function: &'static str,
    pub description: &'static str,
    pub inputs: &'static [FieldSpec],
    pub output: SocketType,
    pub output_name: &'static str,
    pub output_node: bool,
}

impl NodeSpec {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.inputs.iter().find(|field| field.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.inputs.iter().filter(|field| field.required)
    }

    pub fn optional_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.inputs.iter().filter(|field| !field.required)
    }

    /// `{"required": {...}, "optional": {...}}`, declaration order preserved.
    pub fn input_types_json(&self) -> Value {
        let mut out = Map::new();
        let required = fields_to_json(self.required_fields());
        out.insert("required".to_string(), Value::Object(required));
        let optional = fields_to_json(self.optional_fields());
        if !optional.is_empty() {
            out.insert("optional".to_string(), Value::Object(optional));
        }
        Value::Object(out)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "display_name": self.display_name,
            "category": self.category,
            "function": self.function,
            "description": self.description,
            "input_types": self.input_types_json(),
            "return_types": [self.output.as_str()],
            "return_names": [self.output_name],
            "output_node": self.output_node,
        })
    }
}

fn fields_to_json<'a>(fields: impl Iterator<Item = &'a FieldSpec>) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields {
        out.insert(field.name.to_string(), field.to_json());
    }
    out
}

fn display_options(options: &[&str]) -> String {
    options
        .iter()
        .map(|option| {
            if option.is_empty() {
                "''".to_string()
            } else {
                (*option).to_string()
            }
        })
        .collect::<Vec<String>>()
        .join(", ")
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
