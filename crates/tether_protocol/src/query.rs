//! Structural query records.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{required, required_text};
use tether_codec::{Object, Value};

/// Largest `limit` or `skip` a query record can carry.
const MAX_COUNT: u64 = i64::MAX as u64;

fn count_value(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// A predicate operator applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Field equals the value.
    Eq(Value),
    /// Field differs from the value.
    Ne(Value),
    /// Field is less than the value.
    Lt(Value),
    /// Field is less than or equal to the value.
    Lte(Value),
    /// Field is greater than the value.
    Gt(Value),
    /// Field is greater than or equal to the value.
    Gte(Value),
    /// Field equals one of the values.
    In(Vec<Value>),
    /// Field equals none of the values.
    NotIn(Vec<Value>),
    /// Field modulo `divisor` equals `remainder`.
    Mod {
        /// Divisor.
        divisor: i64,
        /// Expected remainder.
        remainder: i64,
    },
    /// Field matches a regular expression.
    Regex {
        /// Pattern source.
        pattern: String,
        /// Flags such as `i`, forwarded verbatim.
        flags: String,
    },
    /// A raw server-side expression, forwarded verbatim.
    Raw(String),
}

impl Selector {
    /// Returns the wire operator name.
    pub fn op_name(&self) -> &'static str {
        match self {
            Selector::Eq(_) => "eq",
            Selector::Ne(_) => "ne",
            Selector::Lt(_) => "lt",
            Selector::Lte(_) => "lte",
            Selector::Gt(_) => "gt",
            Selector::Gte(_) => "gte",
            Selector::In(_) => "in",
            Selector::NotIn(_) => "nin",
            Selector::Mod { .. } => "mod",
            Selector::Regex { .. } => "regex",
            Selector::Raw(_) => "raw",
        }
    }
}

/// A selector bound to a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Field the selector applies to.
    pub field: String,
    /// The operator and operand.
    pub selector: Selector,
}

impl Predicate {
    fn to_value(&self) -> Value {
        let mut record = Object::from([
            ("field".to_string(), Value::from(self.field.as_str())),
            ("op".to_string(), Value::from(self.selector.op_name())),
        ]);
        let mut put = |key: &str, value: Value| {
            record.insert(key.to_string(), value);
        };
        match &self.selector {
            Selector::Eq(v)
            | Selector::Ne(v)
            | Selector::Lt(v)
            | Selector::Lte(v)
            | Selector::Gt(v)
            | Selector::Gte(v) => put("value", v.clone()),
            Selector::In(vs) | Selector::NotIn(vs) => put("value", Value::Array(vs.clone())),
            Selector::Mod { divisor, remainder } => {
                put("divisor", Value::Integer(*divisor));
                put("remainder", Value::Integer(*remainder));
            }
            Selector::Regex { pattern, flags } => {
                put("pattern", Value::from(pattern.as_str()));
                put("flags", Value::from(flags.as_str()));
            }
            Selector::Raw(expression) => put("value", Value::from(expression.as_str())),
        }
        Value::Object(record)
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let record = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid("selector", "object", value.type_name()))?;
        let op = required_text(record, "op")?;
        let operand = || required(record, "value").cloned();
        let list = || -> ProtocolResult<Vec<Value>> {
            let v = required(record, "value")?;
            v.as_array()
                .map(<[Value]>::to_vec)
                .ok_or_else(|| ProtocolError::invalid("value", "array", v.type_name()))
        };
        let integer = |name: &str| -> ProtocolResult<i64> {
            let v = required(record, name)?;
            v.as_integer()
                .ok_or_else(|| ProtocolError::invalid(name, "integer", v.type_name()))
        };

        let selector = match op {
            "eq" => Selector::Eq(operand()?),
            "ne" => Selector::Ne(operand()?),
            "lt" => Selector::Lt(operand()?),
            "lte" => Selector::Lte(operand()?),
            "gt" => Selector::Gt(operand()?),
            "gte" => Selector::Gte(operand()?),
            "in" => Selector::In(list()?),
            "nin" => Selector::NotIn(list()?),
            "mod" => Selector::Mod {
                divisor: integer("divisor")?,
                remainder: integer("remainder")?,
            },
            "regex" => Selector::Regex {
                pattern: required_text(record, "pattern")?.to_string(),
                flags: required_text(record, "flags")?.to_string(),
            },
            "raw" => Selector::Raw(required_text(record, "value")?.to_string()),
            other => return Err(ProtocolError::UnknownOperator(other.to_string())),
        };

        Ok(Self {
            field: required_text(record, "field")?.to_string(),
            selector,
        })
    }
}

/// Sort order for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// A sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDirective {
    /// Field to sort by.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

/// A query over one named collection.
///
/// The client never interprets a query; it serializes it with
/// [`Query::to_value`] and forwards the record to `runQuery`.
///
/// # Example
///
/// ```
/// use tether_protocol::{Query, SortDirection};
///
/// let query = Query::new("users")
///     .gte("age", 18)
///     .is_in("plan", vec!["pro".into(), "team".into()])
///     .with_sort("age", SortDirection::Descending)
///     .with_limit(10);
///
/// assert_eq!(Query::from_value(&query.to_value()).unwrap(), query);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    predicates: Vec<Predicate>,
    sort: Vec<SortDirective>,
    limit: Option<u64>,
    skip: Option<u64>,
}

impl Query {
    /// Creates an empty query over `collection`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            predicates: Vec::new(),
            sort: Vec::new(),
            limit: None,
            skip: None,
        }
    }

    /// Appends a predicate.
    #[must_use]
    pub fn push(mut self, field: impl Into<String>, selector: Selector) -> Self {
        self.predicates.push(Predicate {
            field: field.into(),
            selector,
        });
        self
    }

    /// Field equals `value`.
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, Selector::Eq(value.into()))
    }

    /// Field differs from `value`.
    #[must_use]
    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, Selector::Ne(value.into()))
    }

    /// Field is less than `value`.
    #[must_use]
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, Selector::Lt(value.into()))
    }

    /// Field is at most `value`.
    #[must_use]
    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, Selector::Lte(value.into()))
    }

    /// Field is greater than `value`.
    #[must_use]
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, Selector::Gt(value.into()))
    }

    /// Field is at least `value`.
    #[must_use]
    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, Selector::Gte(value.into()))
    }

    /// Field is one of `values`.
    #[must_use]
    pub fn is_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(field, Selector::In(values))
    }

    /// Field is none of `values`.
    #[must_use]
    pub fn not_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(field, Selector::NotIn(values))
    }

    /// Field modulo `divisor` equals `remainder`.
    #[must_use]
    pub fn modulo(self, field: impl Into<String>, divisor: i64, remainder: i64) -> Self {
        self.push(field, Selector::Mod { divisor, remainder })
    }

    /// Field matches `pattern`.
    #[must_use]
    pub fn matches(
        self,
        field: impl Into<String>,
        pattern: impl Into<String>,
        flags: impl Into<String>,
    ) -> Self {
        self.push(
            field,
            Selector::Regex {
                pattern: pattern.into(),
                flags: flags.into(),
            },
        )
    }

    /// Attaches a raw expression to `field`.
    #[must_use]
    pub fn raw(self, field: impl Into<String>, expression: impl Into<String>) -> Self {
        self.push(field, Selector::Raw(expression.into()))
    }

    /// Appends a sort key.
    #[must_use]
    pub fn with_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortDirective {
            field: field.into(),
            direction,
        });
        self
    }

    /// Caps the number of results. Values above `i64::MAX` saturate.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit.min(MAX_COUNT));
        self
    }

    /// Skips the first `skip` results. Values above `i64::MAX` saturate.
    #[must_use]
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip.min(MAX_COUNT));
        self
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the predicates in order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns the sort keys in order.
    pub fn sort(&self) -> &[SortDirective] {
        &self.sort
    }

    /// Returns the result cap.
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Returns the number of results to skip.
    pub fn skip(&self) -> Option<u64> {
        self.skip
    }

    /// Serializes to a plain record.
    ///
    /// ```text
    /// { collection, selectors: [{field, op, ...}], sort: [{field, direction}], limit?, skip? }
    /// ```
    pub fn to_value(&self) -> Value {
        let mut record = Object::from([
            ("collection".to_string(), Value::from(self.collection.as_str())),
            (
                "selectors".to_string(),
                Value::Array(self.predicates.iter().map(Predicate::to_value).collect()),
            ),
            (
                "sort".to_string(),
                Value::Array(
                    self.sort
                        .iter()
                        .map(|s| {
                            Value::object([
                                ("field", Value::from(s.field.as_str())),
                                ("direction", Value::from(s.direction.as_str())),
                            ])
                        })
                        .collect(),
                ),
            ),
        ]);
        if let Some(limit) = self.limit {
            record.insert("limit".into(), Value::Integer(count_value(limit)));
        }
        if let Some(skip) = self.skip {
            record.insert("skip".into(), Value::Integer(count_value(skip)));
        }
        Value::Object(record)
    }

    /// Reads a record produced by [`Query::to_value`].
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let record = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid("query", "object", value.type_name()))?;

        let count = |name: &str| -> ProtocolResult<Option<u64>> {
            match record.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => v
                    .as_integer()
                    .and_then(|n| u64::try_from(n).ok())
                    .map(Some)
                    .ok_or_else(|| ProtocolError::invalid(name, "count", v.type_name())),
            }
        };

        let predicates = array_field(record, "selectors")?
            .iter()
            .map(Predicate::from_value)
            .collect::<ProtocolResult<Vec<_>>>()?;

        let sort = array_field(record, "sort")?
            .iter()
            .map(|v| {
                let entry = v
                    .as_object()
                    .ok_or_else(|| ProtocolError::invalid("sort", "object", v.type_name()))?;
                let direction = match required_text(entry, "direction")? {
                    "asc" => SortDirection::Ascending,
                    "desc" => SortDirection::Descending,
                    other => return Err(ProtocolError::UnknownOperator(other.to_string())),
                };
                Ok(SortDirective {
                    field: required_text(entry, "field")?.to_string(),
                    direction,
                })
            })
            .collect::<ProtocolResult<Vec<_>>>()?;

        Ok(Self {
            collection: required_text(record, "collection")?.to_string(),
            predicates,
            sort,
            limit: count("limit")?,
            skip: count("skip")?,
        })
    }
}

fn array_field<'a>(record: &'a Object, name: &str) -> ProtocolResult<&'a [Value]> {
    match record.get(name) {
        None => Ok(&[]),
        Some(v) => v
            .as_array()
            .ok_or_else(|| ProtocolError::invalid(name, "array", v.type_name())),
    }
}
