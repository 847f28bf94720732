pub mod cli;
pub mod config;
pub mod emitter;
pub mod generator;
pub mod node;
pub mod parser;
pub mod processor;

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
