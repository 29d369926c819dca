//! Command line parsing tests

mod args_tests;
