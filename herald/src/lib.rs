//! Herald: relay one notification event to every configured service.
//!
//! Configuration comes from the environment ([`config::AppConfig`]), channel
//! adapters live in [`channels`], inbound events are normalized by
//! [`payload`], and [`service::NotificationService`] applies the skip rules
//! before handing the request to the [`fanout`] dispatcher.

pub mod channels;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod payload;
pub mod service;
pub mod utils;

pub use error::{Error, Result};
