#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod calendar;
pub mod classifier;
pub mod commands;
pub mod delivery;
pub mod entities;
pub mod processors;
pub mod rules;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
