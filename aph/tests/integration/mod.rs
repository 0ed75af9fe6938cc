mod command_tests;
mod config_tests;
