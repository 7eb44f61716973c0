//! The crypto module contains all of our cryptographic primitives for key
//! generation, hashing, signing, and turning signatures into text that can be
//! posted in public.

pub mod armor;
pub mod base;
pub mod sign;
