//! The in-memory model of a dataset: metadata, fields, and key
//! resolution.
//!
//! A [`CubeModel`] is parsed once from the declarative model description
//! and is the single source of truth for both the schema compiler and the
//! query compiler.

pub mod field;
pub mod types;

pub use field::{
    canonical_date, Attribute, AttributeDimension, CompoundDimension, DateDimension, Field,
    Measure, Transformed,
};
pub use types::DataType;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CubeError, CubeResult};

/// Dataset metadata, deserialized from the `dataset` key of the model
/// description. `name` doubles as the physical table-name prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub default_time: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// A derived virtual sub-field of the date dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLabel {
    Year,
    YearMonth,
}

impl TimeLabel {
    /// Parse a virtual label name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "year" => Some(TimeLabel::Year),
            "yearmonth" => Some(TimeLabel::YearMonth),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TimeLabel::Year => "year",
            TimeLabel::YearMonth => "yearmonth",
        }
    }

    /// The prefix length of the canonical date that yields this label.
    pub fn prefix_len(&self) -> i64 {
        match self {
            TimeLabel::Year => 4,
            TimeLabel::YearMonth => 7,
        }
    }
}

/// A drilldown/cut/order key resolved against the model.
///
/// Composite keys (`"dimension.attribute"`) resolve in two stages:
/// dimension lookup, then attribute lookup within that dimension's
/// declared attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedKey {
    /// A column on the fact table (measure or simple dimension).
    Fact { field: String },
    /// An attribute column on a compound dimension's table.
    Attribute { dimension: String, attribute: String },
    /// A whole compound dimension (full-row grouping granularity).
    Dimension { dimension: String },
    /// A derived virtual label of the date dimension.
    TimeLabel { dimension: String, label: TimeLabel },
}

impl ResolvedKey {
    /// The dimension this key touches, if it lives on a dimension table.
    pub fn dimension(&self) -> Option<&str> {
        match self {
            ResolvedKey::Fact { .. } => None,
            ResolvedKey::Attribute { dimension, .. }
            | ResolvedKey::Dimension { dimension }
            | ResolvedKey::TimeLabel { dimension, .. } => Some(dimension),
        }
    }
}

/// The parsed field model of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeModel {
    dataset: Dataset,
    fields: BTreeMap<String, Field>,
}

impl CubeModel {
    /// Parse a model description: a mapping with required `dataset` and
    /// `mapping` keys.
    pub fn from_value(description: &Value) -> CubeResult<Self> {
        let dataset_value = description
            .get("dataset")
            .ok_or_else(|| CubeError::Model("missing 'dataset' section".into()))?;
        let dataset: Dataset = serde_json::from_value(dataset_value.clone())
            .map_err(|e| CubeError::Model(format!("invalid 'dataset' section: {e}")))?;
        if dataset.name.is_empty() {
            return Err(CubeError::Model("dataset name must not be empty".into()));
        }

        let mapping = description
            .get("mapping")
            .and_then(|m| m.as_object())
            .ok_or_else(|| CubeError::Model("missing 'mapping' section".into()))?;

        let mut fields = BTreeMap::new();
        for (name, spec) in mapping {
            let field = parse_field(name, spec)?;
            fields.insert(name.clone(), field);
        }
        if fields.is_empty() {
            return Err(CubeError::Model("mapping declares no fields".into()));
        }

        let model = CubeModel { dataset, fields };
        model.check_columns()?;
        Ok(model)
    }

    /// Reject models whose fields would collide on physical columns.
    fn check_columns(&self) -> CubeResult<()> {
        let mut seen = BTreeMap::new();
        seen.insert("id".to_string(), "entry key".to_string());
        for field in self.fields.values() {
            let column = field.fact_column();
            if let Some(other) = seen.insert(column.clone(), field.name().to_string()) {
                return Err(CubeError::Model(format!(
                    "fields '{}' and '{}' both map to fact column '{}'",
                    other,
                    field.name(),
                    column
                )));
            }
        }
        Ok(())
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// All fields, in name order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> CubeResult<&Field> {
        self.fields
            .get(name)
            .ok_or_else(|| CubeError::UnknownField(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Only the compound dimensions (the date dimension included).
    pub fn compounds(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().filter(|f| f.is_compound())
    }

    /// Dimensions suitable for faceted browsing.
    pub fn facet_dimensions(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .values()
            .filter(|f| matches!(f, Field::Compound(c) if c.facet))
    }

    /// The dimension virtual time labels resolve against: the one named
    /// by `dataset.default_time`, or the sole date dimension.
    pub fn default_time_dimension(&self) -> Option<&Field> {
        if let Some(name) = &self.dataset.default_time {
            return match self.fields.get(name) {
                Some(field @ Field::Date(_)) => Some(field),
                _ => None,
            };
        }
        let mut dates = self.fields.values().filter(|f| matches!(f, Field::Date(_)));
        match (dates.next(), dates.next()) {
            (Some(field), None) => Some(field),
            _ => None,
        }
    }

    /// Resolve a drilldown/cut/order key.
    pub fn resolve_key(&self, key: &str) -> CubeResult<ResolvedKey> {
        if let Some(label) = TimeLabel::parse(key) {
            let dimension = self
                .default_time_dimension()
                .ok_or_else(|| CubeError::UnknownField(key.to_string()))?;
            return Ok(ResolvedKey::TimeLabel {
                dimension: dimension.name().to_string(),
                label,
            });
        }

        if let Some((dimension, attribute)) = key.split_once('.') {
            return match self.field(dimension)? {
                Field::Compound(c) => {
                    if c.attributes.contains_key(attribute) {
                        Ok(ResolvedKey::Attribute {
                            dimension: dimension.to_string(),
                            attribute: attribute.to_string(),
                        })
                    } else {
                        Err(CubeError::UnknownField(key.to_string()))
                    }
                }
                Field::Date(_) => {
                    if let Some(label) = TimeLabel::parse(attribute) {
                        Ok(ResolvedKey::TimeLabel {
                            dimension: dimension.to_string(),
                            label,
                        })
                    } else if attribute == "date" {
                        Ok(ResolvedKey::Attribute {
                            dimension: dimension.to_string(),
                            attribute: attribute.to_string(),
                        })
                    } else {
                        Err(CubeError::UnknownField(key.to_string()))
                    }
                }
                _ => Err(CubeError::UnknownField(key.to_string())),
            };
        }

        match self.field(key)? {
            Field::Measure(_) | Field::Attribute(_) => Ok(ResolvedKey::Fact {
                field: key.to_string(),
            }),
            Field::Compound(_) | Field::Date(_) => Ok(ResolvedKey::Dimension {
                dimension: key.to_string(),
            }),
        }
    }
}

/// Parse one mapping entry into a field.
fn parse_field(name: &str, spec: &Value) -> CubeResult<Field> {
    if name.is_empty() || name.contains('.') {
        return Err(CubeError::Model(format!("invalid field name '{name}'")));
    }
    let spec = spec
        .as_object()
        .ok_or_else(|| CubeError::Model(format!("field '{name}' must be a mapping")))?;
    let type_tag = spec
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| CubeError::Model(format!("field '{name}' has no 'type' tag")))?;
    let label = spec
        .get("label")
        .and_then(|l| l.as_str())
        .map(String::from);

    match type_tag {
        "measure" => Ok(Field::Measure(Measure {
            name: name.to_string(),
            label,
        })),

        "date" => Ok(Field::Date(DateDimension {
            name: name.to_string(),
            label,
        })),

        // A `value` mapping that declares attributes is a compound
        // dimension in disguise.
        "value" | "attribute" => {
            if spec.contains_key("attributes") {
                parse_compound(name, label, spec)
            } else {
                let data_type = parse_data_type(name, spec)?.unwrap_or(DataType::String);
                Ok(Field::Attribute(AttributeDimension {
                    name: name.to_string(),
                    label,
                    data_type,
                }))
            }
        }

        "compound" | "entity" | "classifier" => parse_compound(name, label, spec),

        other => Err(CubeError::Model(format!(
            "field '{name}' has unknown type '{other}'"
        ))),
    }
}

fn parse_compound(
    name: &str,
    label: Option<String>,
    spec: &serde_json::Map<String, Value>,
) -> CubeResult<Field> {
    let attribute_specs = spec
        .get("attributes")
        .and_then(|a| a.as_object())
        .ok_or_else(|| {
            CubeError::Model(format!(
                "compound dimension '{name}' declares no attributes"
            ))
        })?;
    if attribute_specs.is_empty() {
        return Err(CubeError::Model(format!(
            "compound dimension '{name}' declares no attributes"
        )));
    }

    let mut attributes = BTreeMap::new();
    for (attr_name, attr_spec) in attribute_specs {
        if attr_name.is_empty() || attr_name.contains('.') || attr_name == "id" {
            return Err(CubeError::Model(format!(
                "invalid attribute name '{attr_name}' on dimension '{name}'"
            )));
        }
        let attr_spec = attr_spec.as_object();
        let label = attr_spec
            .and_then(|s| s.get("label"))
            .and_then(|l| l.as_str())
            .map(String::from);
        let data_type = attr_spec
            .and_then(|s| s.get("datatype"))
            .and_then(|d| d.as_str())
            .map(|d| {
                DataType::parse(d).ok_or_else(|| {
                    CubeError::Model(format!(
                        "attribute '{name}.{attr_name}' has unknown datatype '{d}'"
                    ))
                })
            })
            .transpose()?
            .unwrap_or(DataType::String);
        attributes.insert(
            attr_name.clone(),
            Attribute {
                name: attr_name.clone(),
                label,
                data_type,
            },
        );
    }

    let facet = spec.get("facet").and_then(|f| f.as_bool()).unwrap_or(false);
    Ok(Field::Compound(CompoundDimension {
        name: name.to_string(),
        label,
        attributes,
        facet,
    }))
}

fn parse_data_type(
    name: &str,
    spec: &serde_json::Map<String, Value>,
) -> CubeResult<Option<DataType>> {
    spec.get("datatype")
        .and_then(|d| d.as_str())
        .map(|d| {
            DataType::parse(d).ok_or_else(|| {
                CubeError::Model(format!("field '{name}' has unknown datatype '{d}'"))
            })
        })
        .transpose()
}
