/*!
Parsers for the endpoints the ftrack event server depends on: the ftrack
server itself, the event store and the directories holding event plugins.
*/

pub mod error;
pub mod event_paths;
pub mod server_url;
pub mod store_address;

pub use error::EndpointError;
pub use event_paths::EventPaths;
pub use server_url::{FTRACK_DOMAIN, ServerUrl};
pub use store_address::{DEFAULT_STORE_PORT, StoreAddress};
