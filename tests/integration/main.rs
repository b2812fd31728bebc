//! Integration test suite entry point.

mod executor_tests;
mod fixture;
mod lock_tests;
mod manager_tests;
mod parser_props;
