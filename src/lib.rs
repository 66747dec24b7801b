pub mod bulk;
pub mod config;
pub mod labels;
pub mod resolver;
pub mod security;
pub mod server;
pub mod store;
