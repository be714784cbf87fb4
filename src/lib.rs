//! # Examples
//! GET through the local Tor daemon, following redirects:
//! ```no_run
//! use torilate::*;
//!
//! fn main() -> Result<(), Error> {
//!     let client = Client::new();
//!     let opts = RequestOptions::get("http://httpbin.org/redirect/3").follow_redirects(10);
//!
//!     let resp = client.perform(&opts)?;
//!     println!("{} ({} bytes)", resp.status_code(), resp.bytes_received());
//!     println!("{}", String::from_utf8_lossy(resp.body()));
//!     Ok(())
//! }
//! ```
//!
//! POST through a SOCKS4 proxy somewhere else:
//! ```no_run
//! use torilate::*;
//!
//! fn main() -> Result<(), Error> {
//!     let client = Client::new()
//!         .proxy("127.0.0.1:9150".parse().unwrap())
//!         .user_id("anonymous");
//!     let opts = RequestOptions::post("example.com/submit", r#"{"key":"value"}"#)
//!         .header("Content-Type: application/json");
//!
//!     let resp = client.perform(&opts)?;
//!     println!("{}", resp.text());
//!     Ok(())
//! }
//! ```

pub mod consts;
pub use consts::{Error, ErrorKind, ResultExt};
mod address;
pub use address::{classify_address, AddrKind, Address};
pub mod http;
pub use http::{HttpResponse, Method};
pub mod net;
mod redirect;
pub use redirect::{find_location, next_method, next_target, Client, RequestOptions};
pub mod socks4;
pub mod uri;
pub mod util;
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
