//! The tile and administration server.

mod requests;
mod routes;
mod sessions;

pub use requests::{parse_flatfile_request, parse_map_query, FlatFileRequest, MapQuery, RequestError};
pub use routes::{router, serve, AppState};
pub use sessions::GlobeSessions;
