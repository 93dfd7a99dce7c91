//! Recraft image API client, tensor codec, and the host node adapters
//! built on top of them.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod nodes;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{extract_image_url, Operation, RecraftClient, RequestParams};
pub use codec::{ImageTensor, MaskTensor};
pub use config::{Credential, RecraftConfig};
pub use error::{recraft_error, RecraftError};
pub use nodes::{
    default_node_registry, node_inputs, run_node, Node, NodeContext, NodeInputs, NodeOutput,
    NodeValue, Registry,
};
pub use transport::{HttpTransport, Transport};
