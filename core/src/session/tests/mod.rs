//! Controller and session tests against a scripted service

mod helpers;
mod run_tests;
