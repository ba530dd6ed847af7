//! Storeguard - Login Throttling and Promo Code Service
//!
//! This crate protects a storefront's login endpoint with a fixed-window
//! attempt limiter and validates, redeems and administers discount codes.
//! Both concerns are exposed over gRPC.

pub mod clock;
pub mod config;
pub mod error;
pub mod grpc;
pub mod promo;
pub mod ratelimit;
pub mod telemetry;
