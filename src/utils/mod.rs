#[allow(dead_code)]
pub mod backoff;

#[allow(dead_code)]
pub mod file_io;

#[allow(dead_code)]
pub mod time;

#[cfg(test)]
mod utils_test;
