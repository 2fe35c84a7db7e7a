//! EST operation implementations.
//!
//! This module contains the transport-independent logic behind each
//! endpoint. The HTTP wiring lives in [`crate::server`].

pub mod cacerts;
pub mod enroll;
pub mod inspect;

pub use cacerts::build_certs_only_bundle;
pub use enroll::{verify_csr, Enroller, SerialNumberPolicy, DEFAULT_VALIDITY};
pub use inspect::{inspect, inspect_session, InspectionStatus, TlsInspection, TlsSession};
