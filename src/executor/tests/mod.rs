mod helpers;

mod basic_tests;
mod closure_tests;
mod error_tests;
