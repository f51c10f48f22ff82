//! Field variants: measures and the dimension family.
//!
//! A field knows its physical column(s) on the star schema and how to
//! turn a raw input value into its stored representation. The variant set
//! is closed; dispatch is an exhaustive match, not runtime duck-typing.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::error::{CubeError, CubeResult};
use crate::hash::member_hash;
use crate::model::types::DataType;

/// A named attribute of a compound dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub label: Option<String>,
    pub data_type: DataType,
}

/// A numeric, summable fact-table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub name: String,
    pub label: Option<String>,
}

/// A simple dimension stored directly as a fact-table column.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDimension {
    pub name: String,
    pub label: Option<String>,
    pub data_type: DataType,
}

/// A dimension with named attributes and its own table, keyed by the
/// content hash of the attribute values.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundDimension {
    pub name: String,
    pub label: Option<String>,
    pub attributes: BTreeMap<String, Attribute>,
    pub facet: bool,
}

/// The date/time dimension: a compound dimension storing one canonical
/// ISO-8601 `date` attribute. The `year` and `yearmonth` sub-fields are
/// virtual, derived from `date` at query time.
#[derive(Debug, Clone, PartialEq)]
pub struct DateDimension {
    pub name: String,
    pub label: Option<String>,
}

static DATE_ATTRIBUTES: Lazy<BTreeMap<String, Attribute>> = Lazy::new(|| {
    let mut attributes = BTreeMap::new();
    attributes.insert(
        "date".to_string(),
        Attribute {
            name: "date".to_string(),
            label: Some("Date".to_string()),
            data_type: DataType::Date,
        },
    );
    attributes
});

/// The result of transforming one raw input value for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    /// Columns to write straight onto the fact table.
    Fact(Vec<(String, Value)>),
    /// A dimension member to resolve or create, and the foreign-key
    /// column it yields on the fact table.
    Member {
        dimension: String,
        fact_column: String,
        key: String,
        attributes: Vec<(String, Value)>,
    },
}

/// A field of the cube: a measure or one of the dimension variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Measure(Measure),
    Attribute(AttributeDimension),
    Compound(CompoundDimension),
    Date(DateDimension),
}

impl Field {
    pub fn name(&self) -> &str {
        match self {
            Field::Measure(m) => &m.name,
            Field::Attribute(a) => &a.name,
            Field::Compound(c) => &c.name,
            Field::Date(d) => &d.name,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Field::Measure(m) => m.label.as_deref(),
            Field::Attribute(a) => a.label.as_deref(),
            Field::Compound(c) => c.label.as_deref(),
            Field::Date(d) => d.label.as_deref(),
        }
    }

    /// Every field but a measure is a dimension.
    pub fn is_dimension(&self) -> bool {
        !matches!(self, Field::Measure(_))
    }

    /// Whether this field owns a separate dimension table.
    pub fn is_compound(&self) -> bool {
        matches!(self, Field::Compound(_) | Field::Date(_))
    }

    /// The column this field occupies on the fact table: the field name
    /// for fact-resident fields, `<name>_id` for compound dimensions.
    pub fn fact_column(&self) -> String {
        match self {
            Field::Measure(m) => m.name.clone(),
            Field::Attribute(a) => a.name.clone(),
            Field::Compound(c) => format!("{}_id", c.name),
            Field::Date(d) => format!("{}_id", d.name),
        }
    }

    /// The data type of the fact-table column.
    pub fn fact_column_type(&self) -> DataType {
        match self {
            Field::Measure(_) => DataType::Float,
            Field::Attribute(a) => a.data_type,
            Field::Compound(_) | Field::Date(_) => DataType::Id,
        }
    }

    /// The declared attributes, for compound dimensions.
    pub fn attributes(&self) -> Option<&BTreeMap<String, Attribute>> {
        match self {
            Field::Compound(c) => Some(&c.attributes),
            Field::Date(_) => Some(&DATE_ATTRIBUTES),
            _ => None,
        }
    }

    /// Transform one raw input value into its stored representation.
    ///
    /// Compound variants hash their attribute values into the member key;
    /// the caller resolves or creates the member row.
    pub fn transform_input(&self, raw: &Value) -> CubeResult<Transformed> {
        match self {
            Field::Measure(m) => {
                let number = parse_numeric(raw).ok_or_else(|| {
                    CubeError::load(&m.name, format!("expected a numeric value, got {raw}"))
                })?;
                Ok(Transformed::Fact(vec![(m.name.clone(), json!(number))]))
            }

            Field::Attribute(a) => {
                require_scalar(&a.name, raw)?;
                Ok(Transformed::Fact(vec![(a.name.clone(), raw.clone())]))
            }

            Field::Compound(c) => {
                let mapping = raw.as_object().ok_or_else(|| {
                    CubeError::load(&c.name, format!("expected an attribute mapping, got {raw}"))
                })?;
                let mut attributes = Vec::with_capacity(c.attributes.len());
                for attr in c.attributes.keys() {
                    let value = mapping.get(attr).cloned().unwrap_or(Value::Null);
                    require_scalar(&format!("{}.{}", c.name, attr), &value)?;
                    attributes.push((attr.clone(), value));
                }
                let key = member_hash(attributes.iter().map(|(k, v)| (k.as_str(), v)));
                Ok(Transformed::Member {
                    dimension: c.name.clone(),
                    fact_column: self.fact_column(),
                    key,
                    attributes,
                })
            }

            Field::Date(d) => {
                let date = canonical_date(raw)
                    .ok_or_else(|| CubeError::load(&d.name, format!("unparseable date {raw}")))?;
                let attributes = vec![("date".to_string(), json!(date))];
                let key = member_hash(attributes.iter().map(|(k, v)| (k.as_str(), v)));
                Ok(Transformed::Member {
                    dimension: d.name.clone(),
                    fact_column: self.fact_column(),
                    key,
                    attributes,
                })
            }
        }
    }
}

fn parse_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn require_scalar(field: &str, value: &Value) -> CubeResult<()> {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
        other => Err(CubeError::load(
            field,
            format!("expected a scalar value, got {other}"),
        )),
    }
}

/// Canonicalize a raw date input to `YYYY-MM-DD`.
///
/// Accepts a full or year/year-month ISO string, a bare year number, or a
/// mapping with `date` or `year`/`month`/`day` parts (missing month and
/// day default to 1).
pub fn canonical_date(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => canonical_date_str(s.trim()),
        Value::Number(n) => n.as_i64().and_then(|year| format_date(year, 1, 1)),
        Value::Object(map) => {
            if let Some(date) = map.get("date") {
                return canonical_date(date);
            }
            let year = part_as_i64(map.get("year")?)?;
            let month = map.get("month").map_or(Some(1), part_as_i64)?;
            let day = map.get("day").map_or(Some(1), part_as_i64)?;
            format_date(year, month, day)
        }
        _ => None,
    }
}

fn canonical_date_str(s: &str) -> Option<String> {
    let mut parts = s.splitn(3, '-');
    let year = parts.next()?.parse::<i64>().ok()?;
    let month = parts.next().map_or(Some(1), |p| p.parse::<i64>().ok())?;
    let day = parts.next().map_or(Some(1), |p| p.parse::<i64>().ok())?;
    format_date(year, month, day)
}

fn part_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn format_date(year: i64, month: i64, day: i64) -> Option<String> {
    if !(1..=9999).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(format!("{year:04}-{month:02}-{day:02}"))
}
