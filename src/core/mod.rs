// Core modules implementing values, shape normalization, encoding, and error modeling.
pub mod broadcast;
pub mod channel;
pub mod connection;
pub mod error;
pub mod guard;
pub mod value;
