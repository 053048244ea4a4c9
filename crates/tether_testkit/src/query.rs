//! A small evaluator for structural queries over in-memory documents.

use crate::error::{ServiceError, ServiceResult};
use std::cmp::Ordering;
use tether_codec::{Object, Value};
use tether_protocol::{Predicate, Query, Selector, SortDirection};

/// Runs `query` over `documents`.
///
/// Predicates are conjunctive. Sort directives apply in order, then `skip`
/// and `limit`. Documents missing a sort field order first.
///
/// # Errors
///
/// Regex and raw selectors are not supported and fail with
/// `InvalidRequest`, as does a zero divisor.
pub fn evaluate(query: &Query, documents: &[Object]) -> ServiceResult<Vec<Object>> {
    let mut matched = Vec::new();
    for document in documents {
        if matches_all(query.predicates(), document)? {
            matched.push(document.clone());
        }
    }

    matched.sort_by(|a, b| {
        for directive in query.sort() {
            let ordering = compare_optional(a.get(&directive.field), b.get(&directive.field));
            let ordering = match directive.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    let skip = query.skip().map_or(0, |s| usize::try_from(s).unwrap_or(usize::MAX));
    let limit = query.limit().map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    Ok(matched.into_iter().skip(skip).take(limit).collect())
}

fn matches_all(predicates: &[Predicate], document: &Object) -> ServiceResult<bool> {
    for predicate in predicates {
        if !matches(predicate, document.get(&predicate.field))? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches(predicate: &Predicate, field: Option<&Value>) -> ServiceResult<bool> {
    let ordered = |value: &Value, accept: fn(Ordering) -> bool| {
        field
            .and_then(|f| compare(f, value))
            .is_some_and(accept)
    };

    Ok(match &predicate.selector {
        Selector::Eq(value) => field.is_some_and(|f| equals(f, value)),
        Selector::Ne(value) => !field.is_some_and(|f| equals(f, value)),
        Selector::Lt(value) => ordered(value, Ordering::is_lt),
        Selector::Lte(value) => ordered(value, Ordering::is_le),
        Selector::Gt(value) => ordered(value, Ordering::is_gt),
        Selector::Gte(value) => ordered(value, Ordering::is_ge),
        Selector::In(values) => field.is_some_and(|f| values.iter().any(|v| equals(f, v))),
        Selector::NotIn(values) => !field.is_some_and(|f| values.iter().any(|v| equals(f, v))),
        Selector::Mod { divisor, remainder } => {
            if *divisor == 0 {
                return Err(ServiceError::InvalidRequest(format!(
                    "modulo by zero on {}",
                    predicate.field
                )));
            }
            field
                .and_then(Value::as_integer)
                .is_some_and(|n| n.checked_rem_euclid(*divisor) == Some(*remainder))
        }
        Selector::Regex { .. } | Selector::Raw(_) => {
            return Err(ServiceError::InvalidRequest(format!(
                "unsupported operator {}",
                predicate.selector.op_name()
            )))
        }
    })
}

/// Equality with integers and floats compared numerically.
fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            compare(a, b) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}

/// Orders two values of comparable kinds.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            a.as_number()?.partial_cmp(&b.as_number()?)
        }
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Vec<Object> {
        [("Ada", 36, "uk"), ("Grace", 85, "us"), ("Alan", 41, "uk"), ("Edsger", 72, "nl")]
            .into_iter()
            .map(|(name, age, country)| {
                Object::from([
                    ("name".to_string(), Value::from(name)),
                    ("age".to_string(), Value::from(age)),
                    ("country".to_string(), Value::from(country)),
                ])
            })
            .collect()
    }

    fn names(result: &[Object]) -> Vec<&str> {
        result
            .iter()
            .filter_map(|d| d.get("name").and_then(Value::as_text))
            .collect()
    }

    #[test]
    fn filters_are_conjunctive() {
        let query = Query::new("people").eq("country", "uk").gt("age", 40);
        let result = evaluate(&query, &people()).unwrap();
        assert_eq!(names(&result), ["Alan"]);
    }

    #[test]
    fn numbers_compare_across_kinds() {
        let query = Query::new("people").lte("age", 41.0);
        let result = evaluate(&query, &people()).unwrap();
        assert_eq!(names(&result), ["Ada", "Alan"]);
    }

    #[test]
    fn membership_and_modulo() {
        let query = Query::new("people").not_in("country", vec!["uk".into()]);
        assert_eq!(names(&evaluate(&query, &people()).unwrap()), ["Grace", "Edsger"]);

        let query = Query::new("people").modulo("age", 2, 0);
        assert_eq!(names(&evaluate(&query, &people()).unwrap()), ["Ada", "Edsger"]);
    }

    #[test]
    fn modulo_overflow_does_not_match() {
        let documents: Vec<Object> = [("min", i64::MIN), ("seven", 7)]
            .into_iter()
            .map(|(name, n)| {
                Object::from([
                    ("name".to_string(), Value::from(name)),
                    ("n".to_string(), Value::Integer(n)),
                ])
            })
            .collect();
        let query = Query::new("numbers").modulo("n", -1, 0);
        assert_eq!(names(&evaluate(&query, &documents).unwrap()), ["seven"]);
    }

    #[test]
    fn sort_skip_limit() {
        let query = Query::new("people")
            .with_sort("age", SortDirection::Descending)
            .with_skip(1)
            .with_limit(2);
        let result = evaluate(&query, &people()).unwrap();
        assert_eq!(names(&result), ["Edsger", "Alan"]);
    }

    #[test]
    fn missing_field_never_equals() {
        let query = Query::new("people").eq("email", Value::Null);
        assert!(evaluate(&query, &people()).unwrap().is_empty());

        let query = Query::new("people").ne("email", "x");
        assert_eq!(evaluate(&query, &people()).unwrap().len(), 4);
    }

    #[test]
    fn regex_is_unsupported() {
        let query = Query::new("people").matches("name", "^A", "");
        assert!(matches!(
            evaluate(&query, &people()),
            Err(ServiceError::InvalidRequest(_))
        ));
    }
}
