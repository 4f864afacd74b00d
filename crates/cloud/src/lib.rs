//! # s2cuts cloud
//!
//! Remote data access for s2cuts: STAC catalog search, OAuth2 client
//! credentials, Cloud Optimized GeoTIFF reads over HTTP Range requests and
//! the Sentinel Hub Process API.
//!
//! COG reads fetch only the tiles intersecting the requested window,
//! concurrently, and decode uncompressed, DEFLATE and LZW tiles with or
//! without the horizontal predictor.

pub mod auth;
pub mod cog_reader;
pub mod decompress;
pub mod error;
pub mod geotiff_keys;
pub mod http;
pub mod ifd;
pub mod process_api;
pub mod stac_client;
pub mod stac_models;
pub mod tile_index;

pub use auth::{BearerToken, ClientCredentials, CloudAuth, NoAuth};
pub use cog_reader::{CogMetadata, CogReader, CogReaderOptions};
pub use error::{CloudError, Result};
pub use http::HttpClient;
pub use process_api::{ProcessClient, ProcessRequest};
pub use stac_client::{StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacAsset, StacItem, StacItemCollection, StacSearchParams};
pub use tile_index::PixelWindow;
