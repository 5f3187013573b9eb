//! # cloudkit
//!
//! Provider client interfaces for cluster infrastructure.
//!
//! This crate provides:
//! - Client traits for identity ([`IamApi`]), compute ([`ComputeApi`]) and
//!   DNS ([`DnsApi`]) APIs
//! - Error classification shared by every provider (not found, throttled,
//!   conflict, ...)
//! - Retry with exponential backoff for transient failures
//! - Lazy marker-based pagination
//! - [`MemoryCloud`], an in-memory provider persisted to a JSON state file
//!
//! ## Example
//!
//! ```no_run
//! use cloudkit::{CreateRole, IamApi, MemoryCloud, Tags};
//!
//! let cloud = MemoryCloud::open("cloud.json").expect("Failed to load state");
//!
//! let role = cloud
//!     .create_role(&CreateRole {
//!         name: "masters.example.com".into(),
//!         assume_role_policy: "{}".into(),
//!         permissions_boundary: None,
//!         tags: Tags::new(),
//!     })
//!     .expect("Failed to create role");
//! println!("created {}", role.arn);
//! ```
//!
//! ## Retry Logic
//!
//! Throttling and network errors are retried with exponential backoff.
//! Configure retry behavior with [`RetryConfig`].
//!
//! ```no_run
//! use cloudkit::{IamApi, MemoryCloud, RetryConfig, retry};
//! use std::time::Duration;
//!
//! let cloud = MemoryCloud::new();
//! let config = RetryConfig::new(3, Duration::from_millis(200), 2.0);
//!
//! let role = retry::with_retry(&config, Some(&retry::LogCallback), || {
//!     cloud.get_role("nodes.example.com")
//! });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compute;
pub mod dns;
pub mod error;
pub mod iam;
pub mod memory;
pub mod pager;
pub mod ports;
pub mod retry;
pub mod types;

pub use compute::{ComputeApi, InstanceTemplate};
pub use dns::{DnsApi, RecordSet, RecordType};
pub use error::{Error, ErrorCategory, Result};
pub use iam::{AttachedPolicy, CreateRole, IamApi, Role};
pub use memory::{CloudState, MemoryCloud};
pub use pager::{Page, Pager};
pub use types::{RetryConfig, Tags};
