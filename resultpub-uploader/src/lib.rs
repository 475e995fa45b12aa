//! Publishing of CI result files to object storage.
//!
//! [`backend::from_config`] builds a [`resultpub_common::ResultUploader`] for
//! the configured provider on top of one of the [`store`] transports.

pub mod backend;
pub mod store;
