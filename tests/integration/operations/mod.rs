//! Endpoint integration tests

mod cacerts_test;
mod enroll_test;
mod inspect_test;
