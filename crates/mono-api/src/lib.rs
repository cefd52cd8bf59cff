//! HTTP surface of the mono service: configuration, response envelope,
//! request context middleware and the resource routes.

pub mod config;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod telemetry;
