//! Client for the subset of the Jenkins REST API used to list and stop running builds.

pub mod cause;
pub mod client;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod server;
pub mod types;

pub use client::JenkinsClient;
pub use config::JenkinsConfig;
pub use errors::JenkinsError;
pub use server::CiServer;
