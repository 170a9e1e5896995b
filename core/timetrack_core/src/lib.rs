//! Focus time tracking: sampling, attribution and the local query API.

pub mod activity;
pub mod aggregate;
pub mod api;
pub mod classify;
pub mod day;
pub mod display;
pub mod governor;
pub mod inspect;
pub mod store;
pub mod tracker;
