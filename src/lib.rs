pub mod cmd;
pub mod combiner;
pub mod config;
pub mod publish;
pub mod source;
pub mod splitter;
pub mod tracing;

#[cfg(test)]
mod testing;
