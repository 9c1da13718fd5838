#![deny(
    asm_sub_register,
    deprecated,
    missing_abi,
    unsafe_code,
    unused_macros,
    unused_must_use,
    unused_unsafe
)]
#![deny(clippy::from_over_into, clippy::needless_question_mark)]
#![cfg_attr(
    not(debug_assertions),
    deny(unused_imports, unused_mut, unused_variables,)
)]

//! Common components of Reel, the chunked video ingest service.
//!
//! This crate contains everything shared between replicas and tooling:
//! the wire types of the HTTP API, the upload identifier, and the
//! session record that lives in the shared session store.

pub mod api;
pub mod error;
pub mod file_id;
pub mod file_name;
pub mod session;
pub mod testing;
