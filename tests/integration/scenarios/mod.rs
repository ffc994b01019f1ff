mod fetch_tests;
mod lifecycle_tests;
