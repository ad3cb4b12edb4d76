//! `fab3` answers Ethereum JSON-RPC by reading and writing a ledger that
//! hosts the EVM chaincode.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod eth;
pub mod filters;
pub mod net;
pub mod server;
pub mod types;

pub use config::{
    Config,
    ConfigError,
    NetworkProfile,
    ValidatedConfig,
};
pub use error::{
    Fab3Error,
    Result,
};
pub use eth::EthService;
pub use filters::FilterRegistry;
pub use server::{
    Fab3Server,
    Gateway,
    serve,
};
