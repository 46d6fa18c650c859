//! Built-in battery, grouped the way the report lists it.

mod alloc;
mod base;
mod call;
mod jump;
mod misc;

use crate::registry::TestRegistry;

pub fn register_all(registry: &mut TestRegistry) {
    base::register(registry);
    jump::register(registry);
    alloc::register(registry);
    call::register(registry);
    misc::register(registry);
}

/// `{a, b, c}` as the report prints arrays.
pub(crate) fn braces<T: std::fmt::Display>(values: &[T]) -> String {
    let items: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("{{{}}}", items.join(", "))
}
