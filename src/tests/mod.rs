mod fallback_tests;
mod memory_tests;
mod usage_tests;
