//! Client for the KSL Cars classifieds proxy API.
//!
//! Build a [`FilterSet`], hand it to [`search::search`] together with a
//! [`ProxyApi`] implementation (normally [`ProxyClient`]) and pull
//! [`VehicleListing`]s from the returned stream.

pub mod catalog;
pub mod config;
pub mod error;
pub mod filters;
pub mod gateway;
pub mod listing;
pub mod routes;
pub mod search;

pub use error::{KslError, Result};
pub use filters::{FilterField, FilterSet, FilterValue, SortOrder, semicolonize};
pub use gateway::{ProxyApi, ProxyClient, RetryPolicy};
pub use listing::VehicleListing;
pub use search::{SearchOptions, search, search_all};
