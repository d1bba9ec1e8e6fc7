//! Guest memory checks

pub mod gpa;

pub use gpa::{translate_vring_addr, DirectMapAllowList, Provenance, TranslatedAddress};
