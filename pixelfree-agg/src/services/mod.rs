//! Service modules for photo aggregation
//!
//! Leaves first: upstream client → status normalizer → account resolver →
//! aggregation engine → query dispatcher. The token provider feeds bearer
//! tokens to everything that talks to the instance.

pub mod account_resolver;
pub mod aggregation_engine;
pub mod query_dispatcher;
pub mod status_normalizer;
pub mod token_provider;
pub mod upstream_client;

pub use account_resolver::{
    normalize_handle, AccountResolver, BatchResolution, HandleFailure, ResolutionCache,
    ResolutionError,
};
pub use aggregation_engine::{AggregationEngine, AggregationError};
pub use query_dispatcher::{
    DispatchError, DispatchOutcome, QueryDispatcher, QueryRequest, QueryResponse, TargetError,
};
pub use status_normalizer::{records_from_timeline, to_photo_records};
pub use token_provider::{
    AccessTokenProvider, AuthError, FileTokenProvider, OAuthCredentials, StaticTokenProvider,
    TokenSet,
};
pub use upstream_client::{PixelfedApi, PixelfedClient, UpstreamError, UpstreamResponse};
