//! Custom functions and queries.

use super::{parse_value, print_value, CommandResult};
use tether_client::{Client, Object, Query, SortDirection, Value};

/// Calls the custom function `name`.
pub async fn run(client: &Client, name: &str, params: Option<&str>) -> CommandResult {
    let params = match params.map(parse_value) {
        None => Object::new(),
        Some(Value::Object(params)) => params,
        Some(other) => {
            return Err(format!("Parameters must be a JSON object, got {}", other.type_name()).into())
        }
    };
    let result = client.run(name, params).await?;
    print_value(&result)
}

/// Arguments of the `query` command.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    /// Collection name.
    pub collection: String,
    /// `FIELD=JSON` equality filters.
    pub filters: Vec<String>,
    /// Sort field, `-` prefixed for descending.
    pub sort: Option<String>,
    /// Result limit.
    pub limit: Option<u64>,
    /// Results to skip.
    pub skip: Option<u64>,
}

impl QueryArgs {
    /// Builds the query record.
    pub fn build(&self) -> Result<Query, String> {
        let mut query = Query::new(self.collection.as_str());
        for filter in &self.filters {
            let (field, value) = filter
                .split_once('=')
                .ok_or_else(|| format!("Filter {filter:?} is not FIELD=JSON"))?;
            query = query.eq(field, parse_value(value));
        }
        if let Some(sort) = &self.sort {
            query = match sort.strip_prefix('-') {
                Some(field) => query.with_sort(field, SortDirection::Descending),
                None => query.with_sort(sort.as_str(), SortDirection::Ascending),
            };
        }
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        if let Some(skip) = self.skip {
            query = query.with_skip(skip);
        }
        Ok(query)
    }
}

/// Runs a query and prints the result.
pub async fn query(client: &Client, args: &QueryArgs) -> CommandResult {
    let query = args.build()?;
    let result = client.run_query(&query).await?;
    print_value(&result)
}
