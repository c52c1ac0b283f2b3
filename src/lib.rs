//! Client library for the Standard Cortical Observer Web API.
//!
//! The SCO Web API is a HATEOAS-style JSON API that manages neuroscience
//! research resources: anatomy subjects, stimulus image groups, experiments
//! and predictive model runs. This crate wraps the API in typed resource
//! handles and maintains a local disk cache for the tar archives that back
//! subjects and image groups, so repeated access to the same resource does
//! not re-download its data.

pub mod archive;
pub mod cache;
pub mod client;
pub mod error;
pub mod experiment;
pub mod image_group;
pub mod resource;
pub mod rest;
pub mod run;
pub mod store;
pub mod subject;
pub mod transport;

pub use client::{ClientOptions, DEFAULT_API_URL, ScoClient};
pub use error::ScoError;
