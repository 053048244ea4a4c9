//! Property-based test generators using proptest.
//!
//! Provides strategies for user edits and the values they carry.

use proptest::prelude::*;
use tether_client::{ClientResult, UserHandle};
use tether_codec::Value;

/// Strategy for field names drawn from a small pool, so edits collide.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["name", "score", "tags", "level", "note"]).prop_map(String::from)
}

/// Strategy for scalar values: null, bools, small integers and short text.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::Integer),
        "[a-z]{0,8}".prop_map(Value::Text),
    ]
}

/// One edit made through a [`UserHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Assign a field.
    Set(String, Value),
    /// Remove a field.
    Unset(String),
    /// Add to a numeric field.
    Increment(String, i64),
    /// Push onto an array field.
    Append(String, Value),
    /// Remove matching elements from an array field.
    Remove(String, Value),
}

impl Edit {
    /// Returns the field the edit targets.
    pub fn field(&self) -> &str {
        match self {
            Edit::Set(field, _)
            | Edit::Unset(field)
            | Edit::Increment(field, _)
            | Edit::Append(field, _)
            | Edit::Remove(field, _) => field,
        }
    }

    /// Applies the edit through `user`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChange` if the edit does not fit the field's
    /// current value.
    pub fn apply(&self, user: &mut UserHandle<'_>) -> ClientResult<()> {
        match self {
            Edit::Set(field, value) => {
                user.set(field, value.clone());
                Ok(())
            }
            Edit::Unset(field) => {
                user.unset(field);
                Ok(())
            }
            Edit::Increment(field, by) => user.increment(field, *by),
            Edit::Append(field, value) => user.append(field, value.clone()),
            Edit::Remove(field, value) => user.remove(field, value.clone()),
        }
    }
}

/// Strategy for a single edit.
pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (field_name_strategy(), scalar_value_strategy())
            .prop_map(|(field, value)| Edit::Set(field, value)),
        1 => field_name_strategy().prop_map(Edit::Unset),
        2 => (field_name_strategy(), -50i64..50)
            .prop_map(|(field, by)| Edit::Increment(field, by)),
        2 => (field_name_strategy(), scalar_value_strategy())
            .prop_map(|(field, value)| Edit::Append(field, value)),
        1 => (field_name_strategy(), scalar_value_strategy())
            .prop_map(|(field, value)| Edit::Remove(field, value)),
    ]
}

/// Strategy for a sequence of edits.
pub fn edit_sequence_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(edit_strategy(), min..max)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Few cases, for tests that drive a full client per case.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn fields_come_from_pool(edit in edit_strategy()) {
            prop_assert!(["name", "score", "tags", "level", "note"].contains(&edit.field()));
        }

        #[test]
        fn scalars_are_not_containers(value in scalar_value_strategy()) {
            prop_assert!(!matches!(value, Value::Array(_) | Value::Object(_)));
        }
    }
}
