//! Shared test fixtures for unit, functional, integration and proptest targets.

#![allow(dead_code)]

pub mod fixtures;
