//! API exposure for the GraphQL server
//!
//! Each exposure consumes a [`GraphQLServer`](crate::server::GraphQLServer)
//! and produces a Router for its protocol.

pub mod http;

pub use http::{GraphQLExposure, HttpGraphQLServer};
