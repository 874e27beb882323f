use diesel::prelude::*;
use schemars::JsonSchema;
use serde::Serialize;

/// Row id of the one counter this service keeps.
pub const COUNTER_ID: i32 = 1;

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::counter)]
pub struct Counter {
    pub id: i32,
    pub count: i64,
}

/// Body returned by both counter endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct CounterResponse {
    pub count: i64,
    pub message: String,
}

impl CounterResponse {
    pub fn current(count: i64) -> CounterResponse {
        CounterResponse { count, message: String::from("Current count retrieved") }
    }

    pub fn incremented(count: i64) -> CounterResponse {
        CounterResponse { count, message: String::from("Counter incremented") }
    }
}
