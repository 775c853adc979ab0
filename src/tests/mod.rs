//! Cross-module scenarios and shared test helpers.

pub(crate) mod helpers;
