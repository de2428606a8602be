pub mod archive;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod mapper;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod stats;
pub mod viz;
