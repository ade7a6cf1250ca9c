//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the gateway API.

pub mod bots;
pub mod health;
pub mod internal;
pub mod webhooks;
