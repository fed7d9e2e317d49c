//! Core types for dcscale.
//!
//! This crate provides the foundational types shared by the authenticator and
//! the lifecycle controller:
//!
//! - **Identifiers**: `SdcId` for data collector nodes, `JobId` for jobs
//! - **Labels**: `LabelSet`, the ordered label list assigned to a node
//!
//! # Example
//!
//! ```
//! use dcscale_core::{LabelSet, SdcId};
//!
//! let sdc_id: SdcId = "6f2f0c1e-sdc".parse().unwrap();
//! let labels = LabelSet::parse_csv("west,batch").unwrap();
//!
//! assert_eq!(sdc_id.as_str(), "6f2f0c1e-sdc");
//! assert_eq!(labels.as_slice(), ["west", "batch"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod labels;

pub use ids::{IdError, JobId, SdcId};
pub use labels::LabelSet;
