//! # Provider Clients
//!
//! One client per external data provider, all implementing the
//! [`ProviderClient`] capability: consent URL, token exchange/refresh,
//! resource discovery, and paged report fetching. The set of providers is
//! a closed union ([`Provider`]); dispatch happens through the
//! [`registry::ProviderRegistry`].

pub mod ga4;
pub mod google;
pub mod gsc;
pub mod registry;
pub mod trait_;

pub use registry::{ProviderRegistry, RegistryError};
pub use trait_::{
    AuthorizeParams, DateRange, DiscoveredResource, Ga4MetricRow, GscMetricRow, MetricPage,
    MetricRow, PageCursor, Provider, ProviderClient, ProviderError, ProviderMetadata, TokenGrant,
};
