pub mod filename;
pub mod http_client;
pub mod secret;
