//! Redis module tests

mod resp_parser_tests;
