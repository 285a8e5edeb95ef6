//! Connectivity validator core primitives.
//!
//! Pure, I/O-free building blocks shared by the gateway binary:
//!
//! - [`subject`] - `X-Forwarded-Client-Cert` subject extraction and DN parsing
//! - [`policy`] - the four client authorization policies
//! - [`route`] - ordered path-prefix route table

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod policy;
pub mod route;
pub mod subject;

pub use policy::Policy;
pub use route::{RouteDestination, RouteError, RoutePrefixes, RouteTable};
pub use subject::{ParsedSubject, extract_subjects, parse_subject, parse_subjects};
